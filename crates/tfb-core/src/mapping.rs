//! Persisted bot → topic routing table.
//!
//! The table is plain data ([`MappingTable`]); [`MappingStore`] wraps it with a
//! single-writer lock and the JSON file it is persisted to. Every mutation goes
//! through one mutate-then-persist path that restores the previous table if the
//! write fails, so memory and disk never diverge.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use crate::{
    config::LegacyMapping,
    domain::TopicId,
    matcher::{self, BotIdentity, Resolution},
};

const LEGACY_DESCRIPTION: &str = "Legacy mapping loaded from environment";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("@{username} is already mapped to topic {topic_id}")]
    AlreadyMapped { username: String, topic_id: TopicId },

    #[error("no mapping found for @{username}")]
    NotFound { username: String },

    #[error("invalid bot username: {0:?}")]
    InvalidUsername(String),

    #[error("unknown setting: {key}")]
    UnknownSetting { key: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("failed to persist mappings: {0}")]
    Persistence(String),
}

/// Strip leading `@` and case-fold a bot username.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

pub fn default_description(username: &str, topic_id: TopicId) -> String {
    format!("Forward messages from @{username} to topic {topic_id}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotMapping {
    #[serde(rename = "source_bot_username")]
    pub username: String,
    #[serde(rename = "target_topic_id")]
    pub topic_id: TopicId,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub forward_all_unknown_bots: bool,
    pub default_topic_id: Option<TopicId>,
    pub log_unknown_bots: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            forward_all_unknown_bots: false,
            default_topic_id: None,
            log_unknown_bots: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingKey {
    ForwardAllUnknownBots,
    DefaultTopicId,
    LogUnknownBots,
}

impl SettingKey {
    pub const ALL: [SettingKey; 3] = [
        SettingKey::ForwardAllUnknownBots,
        SettingKey::DefaultTopicId,
        SettingKey::LogUnknownBots,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::ForwardAllUnknownBots => "forward_all_unknown_bots",
            SettingKey::DefaultTopicId => "default_topic_id",
            SettingKey::LogUnknownBots => "log_unknown_bots",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or(StoreError::UnknownSetting { key })
    }
}

impl Settings {
    /// Current value of `key`, rendered the way the file stores it.
    pub fn display_value(&self, key: SettingKey) -> String {
        match key {
            SettingKey::ForwardAllUnknownBots => self.forward_all_unknown_bots.to_string(),
            SettingKey::DefaultTopicId => self
                .default_topic_id
                .map(|t| t.to_string())
                .unwrap_or_else(|| "null".to_string()),
            SettingKey::LogUnknownBots => self.log_unknown_bots.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub old_value: String,
    pub new_value: String,
}

/// Result of an upsert: whether the username was new or already mapped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upsert {
    Inserted(BotMapping),
    Updated {
        previous: BotMapping,
        current: BotMapping,
    },
}

/// Ordered routing table plus settings.
///
/// Insertion order is preserved; the display-name fallback in the matcher
/// scans in this order and the first hit wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingTable {
    mappings: Vec<BotMapping>,
    settings: Settings,
}

impl MappingTable {
    pub fn new(settings: Settings) -> Self {
        Self {
            mappings: Vec::new(),
            settings,
        }
    }

    /// Build a table from raw entries, normalizing keys. When two entries
    /// normalize to the same username the first one is kept.
    pub fn from_parts(entries: impl IntoIterator<Item = BotMapping>, settings: Settings) -> Self {
        let mut table = Self::new(settings);
        for mut entry in entries {
            entry.username = normalize_username(&entry.username);
            if entry.username.is_empty() {
                warn!("skipping mapping with empty username");
                continue;
            }
            if table.position(&entry.username).is_some() {
                warn!(username = %entry.username, "duplicate mapping in file; keeping the first");
                continue;
            }
            table.mappings.push(entry);
        }
        table
    }

    pub fn mappings(&self) -> &[BotMapping] {
        &self.mappings
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn get(&self, username: &str) -> Option<&BotMapping> {
        let key = normalize_username(username);
        self.position(&key).map(|i| &self.mappings[i])
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.mappings.iter().position(|m| m.username == key)
    }

    /// Insert a new mapping; an existing key is rejected rather than overwritten.
    pub fn add(
        &mut self,
        username: &str,
        topic_id: TopicId,
        description: Option<&str>,
    ) -> Result<BotMapping, StoreError> {
        let key = valid_key(username)?;
        if let Some(existing) = self.position(&key).map(|i| &self.mappings[i]) {
            return Err(StoreError::AlreadyMapped {
                username: key,
                topic_id: existing.topic_id,
            });
        }
        let mapping = new_mapping(key, topic_id, description);
        self.mappings.push(mapping.clone());
        Ok(mapping)
    }

    /// Change the topic of an existing mapping. `None` keeps the description.
    /// Returns the mapping as it was before the change.
    pub fn update(
        &mut self,
        username: &str,
        topic_id: TopicId,
        description: Option<&str>,
    ) -> Result<BotMapping, StoreError> {
        let key = normalize_username(username);
        let Some(idx) = self.position(&key) else {
            return Err(StoreError::NotFound { username: key });
        };
        let entry = &mut self.mappings[idx];
        let previous = entry.clone();
        entry.topic_id = topic_id;
        if let Some(d) = description {
            entry.description = d.to_string();
        }
        Ok(previous)
    }

    /// Insert or replace. A missing description becomes the generated default,
    /// also when replacing.
    pub fn upsert(
        &mut self,
        username: &str,
        topic_id: TopicId,
        description: Option<&str>,
    ) -> Result<Upsert, StoreError> {
        let key = valid_key(username)?;
        let mapping = new_mapping(key, topic_id, description);
        match self.position(&mapping.username) {
            Some(idx) => {
                let previous = std::mem::replace(&mut self.mappings[idx], mapping.clone());
                Ok(Upsert::Updated {
                    previous,
                    current: mapping,
                })
            }
            None => {
                self.mappings.push(mapping.clone());
                Ok(Upsert::Inserted(mapping))
            }
        }
    }

    pub fn remove(&mut self, username: &str) -> Result<BotMapping, StoreError> {
        let key = normalize_username(username);
        match self.position(&key) {
            Some(idx) => Ok(self.mappings.remove(idx)),
            None => Err(StoreError::NotFound { username: key }),
        }
    }

    pub fn update_setting(&mut self, key: &str, value: &str) -> Result<SettingChange, StoreError> {
        let key: SettingKey = key.parse()?;
        let old_value = self.settings.display_value(key);
        let mut next = self.settings.clone();

        match key {
            SettingKey::ForwardAllUnknownBots => {
                next.forward_all_unknown_bots = parse_bool(key, value)?;
            }
            SettingKey::LogUnknownBots => {
                next.log_unknown_bots = parse_bool(key, value)?;
            }
            SettingKey::DefaultTopicId => {
                next.default_topic_id = parse_optional_topic(key, value)?;
            }
        }

        let couples_default = matches!(
            key,
            SettingKey::ForwardAllUnknownBots | SettingKey::DefaultTopicId
        );
        if couples_default && next.forward_all_unknown_bots && next.default_topic_id.is_none() {
            return Err(StoreError::InvalidSetting {
                key: key.to_string(),
                reason: "forward_all_unknown_bots requires default_topic_id".to_string(),
            });
        }

        self.settings = next;
        Ok(SettingChange {
            key,
            old_value,
            new_value: self.settings.display_value(key),
        })
    }

    /// Fold the environment-supplied mapping in. Persisted entries always win.
    pub fn merge_legacy(&mut self, legacy: &LegacyMapping) -> bool {
        let key = normalize_username(&legacy.username);
        if key.is_empty() || self.position(&key).is_some() {
            return false;
        }
        self.mappings.push(BotMapping {
            username: key,
            topic_id: legacy.topic_id,
            description: LEGACY_DESCRIPTION.to_string(),
        });
        true
    }
}

fn valid_key(username: &str) -> Result<String, StoreError> {
    let key = normalize_username(username);
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(StoreError::InvalidUsername(username.to_string()));
    }
    Ok(key)
}

fn new_mapping(username: String, topic_id: TopicId, description: Option<&str>) -> BotMapping {
    let description = match description.map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => default_description(&username, topic_id),
    };
    BotMapping {
        username,
        topic_id,
        description,
    }
}

fn parse_bool(key: SettingKey, value: &str) -> Result<bool, StoreError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(StoreError::InvalidSetting {
            key: key.to_string(),
            reason: format!("expected true or false, got {other:?}"),
        }),
    }
}

fn parse_optional_topic(key: SettingKey, value: &str) -> Result<Option<TopicId>, StoreError> {
    let v = value.trim();
    if v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    v.parse::<i32>()
        .map(|id| Some(TopicId(id)))
        .map_err(|_| StoreError::InvalidSetting {
            key: key.to_string(),
            reason: format!("expected a topic id or none, got {v:?}"),
        })
}

// ============== Persistence ==============

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingFile {
    #[serde(default)]
    bot_mappings: Vec<BotMapping>,
    #[serde(default)]
    settings: Settings,
}

/// Read the persisted table. A missing or unparsable file yields an empty
/// table with default settings.
pub fn load_table(path: &Path) -> MappingTable {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "mapping file not found; starting with an empty table");
            return MappingTable::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "mapping file unreadable; starting with an empty table");
            return MappingTable::default();
        }
    };

    match serde_json::from_str::<MappingFile>(&txt) {
        Ok(file) => MappingTable::from_parts(file.bot_mappings, file.settings),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "mapping file is corrupt; starting with an empty table");
            MappingTable::default()
        }
    }
}

/// Write the full table through a sibling temp file renamed over the target.
pub fn save_table(path: &Path, table: &MappingTable) -> Result<(), StoreError> {
    let file = MappingFile {
        bot_mappings: table.mappings.clone(),
        settings: table.settings.clone(),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| StoreError::Persistence(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::Persistence(e.to_string()))?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| StoreError::Persistence(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Persistence(e.to_string())
    })
}

// ============== Store service ==============

/// Shared handle to the routing table and its backing file.
///
/// Routing reads take the read lock; mutations hold the write lock across
/// validate → mutate → persist (→ rollback), so no reader observes a
/// half-applied change.
pub struct MappingStore {
    path: PathBuf,
    table: RwLock<MappingTable>,
}

impl MappingStore {
    /// Load the persisted table (failing open) and merge the legacy mapping.
    pub fn load(path: impl Into<PathBuf>, legacy: Option<&LegacyMapping>) -> Self {
        let path = path.into();
        let mut table = load_table(&path);

        if let Some(legacy) = legacy {
            if table.merge_legacy(legacy) {
                info!(username = %normalize_username(&legacy.username), topic_id = %legacy.topic_id, "merged legacy mapping from environment");
            }
        }

        info!(count = table.len(), "bot mappings loaded");
        for m in table.mappings() {
            info!("  @{} -> topic {} ({})", m.username, m.topic_id, m.description);
        }

        Self::with_table(path, table)
    }

    pub fn with_table(path: impl Into<PathBuf>, table: MappingTable) -> Self {
        Self {
            path: path.into(),
            table: RwLock::new(table),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, MappingTable> {
        self.table.read().await
    }

    pub async fn snapshot(&self) -> MappingTable {
        self.table.read().await.clone()
    }

    pub async fn resolve(&self, bot: &BotIdentity) -> Option<Resolution> {
        let table = self.table.read().await;
        matcher::resolve(&table, bot)
    }

    /// Persist the current table as-is.
    pub async fn save(&self) -> Result<(), StoreError> {
        let table = self.table.read().await;
        save_table(&self.path, &table)
    }

    pub async fn add(
        &self,
        username: &str,
        topic_id: TopicId,
        description: Option<&str>,
    ) -> Result<BotMapping, StoreError> {
        self.mutate(|t| t.add(username, topic_id, description))
            .await
    }

    pub async fn update(
        &self,
        username: &str,
        topic_id: TopicId,
        description: Option<&str>,
    ) -> Result<BotMapping, StoreError> {
        self.mutate(|t| t.update(username, topic_id, description))
            .await
    }

    pub async fn set(
        &self,
        username: &str,
        topic_id: TopicId,
        description: Option<&str>,
    ) -> Result<Upsert, StoreError> {
        self.mutate(|t| t.upsert(username, topic_id, description))
            .await
    }

    pub async fn remove(&self, username: &str) -> Result<BotMapping, StoreError> {
        self.mutate(|t| t.remove(username)).await
    }

    pub async fn update_setting(&self, key: &str, value: &str) -> Result<SettingChange, StoreError> {
        self.mutate(|t| t.update_setting(key, value)).await
    }

    async fn mutate<T>(
        &self,
        op: impl FnOnce(&mut MappingTable) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut table = self.table.write().await;
        let before = table.clone();

        let out = match op(&mut table) {
            Ok(out) => out,
            Err(e) => {
                *table = before;
                return Err(e);
            }
        };

        if let Err(e) = save_table(&self.path, &table) {
            warn!(path = %self.path.display(), error = %e, "persist failed; rolling back in-memory change");
            *table = before;
            return Err(e);
        }

        Ok(out)
    }
}
