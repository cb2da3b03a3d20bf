//! Bot identity → topic resolution.
//!
//! Order, first hit wins:
//! 1. exact (normalized) username
//! 2. substring overlap between a mapped username and the display name,
//!    scanning mappings in insertion order
//! 3. the default topic, when unknown bots are forwarded
//!
//! Step 2 is deliberately loose: similarly named bots can collide.

use crate::{
    domain::TopicId,
    mapping::{normalize_username, MappingTable},
};

/// Who sent a message, as far as routing is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub username: Option<String>,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchReason {
    Username,
    DisplayName { mapped_username: String },
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub topic_id: TopicId,
    pub reason: MatchReason,
}

pub fn resolve(table: &MappingTable, bot: &BotIdentity) -> Option<Resolution> {
    if let Some(m) = bot.username.as_deref().and_then(|u| table.get(u)) {
        return Some(Resolution {
            topic_id: m.topic_id,
            reason: MatchReason::Username,
        });
    }

    let name = bot.display_name.to_lowercase();
    if let Some(m) = table
        .mappings()
        .iter()
        .find(|m| name.contains(m.username.as_str()) || m.username.contains(name.as_str()))
    {
        return Some(Resolution {
            topic_id: m.topic_id,
            reason: MatchReason::DisplayName {
                mapped_username: m.username.clone(),
            },
        });
    }

    let settings = table.settings();
    if settings.forward_all_unknown_bots {
        return settings.default_topic_id.map(|topic_id| Resolution {
            topic_id,
            reason: MatchReason::Fallback,
        });
    }

    None
}

pub fn resolve_topic(table: &MappingTable, bot: &BotIdentity) -> Option<TopicId> {
    resolve(table, bot).map(|r| r.topic_id)
}

/// Normalized username for log lines (`N/A` when the bot has none).
pub fn display_username(bot: &BotIdentity) -> String {
    bot.username
        .as_deref()
        .map(normalize_username)
        .unwrap_or_else(|| "N/A".to_string())
}
