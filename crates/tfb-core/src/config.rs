use std::{env, path::PathBuf};

use tracing::warn;

use crate::{
    domain::{ChatId, TopicId},
    errors::Error,
    Result,
};

pub const DEFAULT_MAPPING_FILE: &str = "bot_mapping.json";

/// Single username/topic pair supplied through the environment.
///
/// Older deployments configured exactly one source bot this way; it is merged
/// into the mapping table at load time unless the table already maps it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyMapping {
    pub username: String,
    pub topic_id: TopicId,
}

/// Typed configuration for the forwarder.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub group_chat_id: ChatId,
    pub mapping_file: PathBuf,
    pub legacy_mapping: Option<LegacyMapping>,
}

impl Config {
    /// Load from the process environment, seeded from `.env` when present.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(env_str)
    }

    /// Build from any variable lookup; `load` passes the process environment.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = required_bot_token(var("BOT_TOKEN"))?;
        let group_chat_id = parse_group_chat_id(var("GROUP_CHAT_ID"))?;

        let mapping_file = var("MAPPING_FILE")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE));

        let legacy_mapping = parse_legacy(var("SOURCE_BOT_USERNAME"), var("TARGET_TOPIC_ID"));

        Ok(Self {
            bot_token,
            group_chat_id,
            mapping_file,
            legacy_mapping,
        })
    }
}

/// Only the bot token, for tools that never touch the managed chat.
pub fn load_bot_token() -> Result<String> {
    let _ = dotenvy::dotenv();
    required_bot_token(env_str("BOT_TOKEN"))
}

fn required_bot_token(raw: Option<String>) -> Result<String> {
    raw.and_then(non_empty).ok_or_else(|| {
        Error::Config("BOT_TOKEN environment variable is required".to_string())
    })
}

fn parse_group_chat_id(raw: Option<String>) -> Result<ChatId> {
    let Some(raw) = raw.and_then(non_empty) else {
        return Err(Error::Config(
            "GROUP_CHAT_ID environment variable is required".to_string(),
        ));
    };
    match raw.trim().parse::<i64>() {
        Ok(id) if id != 0 => Ok(ChatId(id)),
        _ => Err(Error::Config(format!(
            "GROUP_CHAT_ID must be a non-zero integer, got {raw:?}"
        ))),
    }
}

fn parse_legacy(username: Option<String>, topic: Option<String>) -> Option<LegacyMapping> {
    let username = username.and_then(non_empty)?;
    let Some(raw_topic) = topic.and_then(non_empty) else {
        warn!(%username, "SOURCE_BOT_USERNAME is set without TARGET_TOPIC_ID; ignoring");
        return None;
    };

    match raw_topic.trim().parse::<i32>() {
        Ok(0) => {
            warn!("TARGET_TOPIC_ID is 0; ignoring legacy mapping");
            None
        }
        Ok(id) => Some(LegacyMapping {
            username: username.trim().to_string(),
            topic_id: TopicId(id),
        }),
        Err(_) => {
            warn!(value = %raw_topic, "TARGET_TOPIC_ID is not an integer; ignoring legacy mapping");
            None
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn missing_required_values_are_config_errors() {
        let cases: &[&[(&str, &str)]] = &[
            &[("GROUP_CHAT_ID", "-1001")],
            &[("BOT_TOKEN", "  "), ("GROUP_CHAT_ID", "-1001")],
            &[("BOT_TOKEN", "123:abc")],
            &[("BOT_TOKEN", "123:abc"), ("GROUP_CHAT_ID", "0")],
            &[("BOT_TOKEN", "123:abc"), ("GROUP_CHAT_ID", "group")],
        ];
        for vars in cases {
            assert!(
                matches!(Config::from_lookup(lookup(vars)), Err(Error::Config(_))),
                "{vars:?}"
            );
        }
    }

    #[test]
    fn builds_config_with_defaults() {
        let cfg = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("GROUP_CHAT_ID", " -1001 "),
        ]))
        .unwrap();
        assert_eq!(cfg.bot_token, "123:abc");
        assert_eq!(cfg.group_chat_id, ChatId(-1001));
        assert_eq!(cfg.mapping_file, PathBuf::from(DEFAULT_MAPPING_FILE));
        assert_eq!(cfg.legacy_mapping, None);

        let cfg = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("GROUP_CHAT_ID", "-1001"),
            ("MAPPING_FILE", "/var/lib/tfb/map.json"),
            ("SOURCE_BOT_USERNAME", "@news_bot"),
            ("TARGET_TOPIC_ID", "7"),
        ]))
        .unwrap();
        assert_eq!(cfg.mapping_file, PathBuf::from("/var/lib/tfb/map.json"));
        assert_eq!(cfg.legacy_mapping.unwrap().topic_id, TopicId(7));
    }

    #[test]
    fn legacy_requires_both_values() {
        assert_eq!(parse_legacy(None, s("5")), None);
        assert_eq!(parse_legacy(s("@news_bot"), None), None);
        assert_eq!(parse_legacy(s("  "), s("5")), None);
    }

    #[test]
    fn legacy_ignores_zero_and_garbage_topics() {
        assert_eq!(parse_legacy(s("news_bot"), s("0")), None);
        assert_eq!(parse_legacy(s("news_bot"), s("abc")), None);
    }

    #[test]
    fn legacy_parses_pair() {
        assert_eq!(
            parse_legacy(s(" @News_Bot "), s(" 42 ")),
            Some(LegacyMapping {
                username: "@News_Bot".to_string(),
                topic_id: TopicId(42),
            })
        );
    }
}
