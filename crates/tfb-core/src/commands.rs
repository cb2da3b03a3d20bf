//! Admin commands issued inside the managed chat.
//!
//! Each invocation is independent. Commands from any other chat are ignored,
//! mutating commands require the sender to be a chat administrator or the
//! creator, and every failure is turned into a reply at this boundary.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChatId, TopicId},
    formatting::escape_html,
    mapping::{MappingStore, MappingTable, SettingKey, StoreError, Upsert},
    messaging::{
        port::MessagingPort,
        types::{CommandInvocation, Destination},
    },
    Result,
};

const GENERIC_FAILURE: &str = "❌ An error occurred while processing the command.";
const PERMISSION_DENIED: &str = "❌ Only chat administrators can use this command.";
const SAVE_FAILED: &str = "❌ Failed to save the mapping file.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Set,
    List,
    Remove,
    Help,
    Settings,
    Setting,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "set" => Some(CommandKind::Set),
            "list" => Some(CommandKind::List),
            "remove" => Some(CommandKind::Remove),
            "help" => Some(CommandKind::Help),
            "settings" => Some(CommandKind::Settings),
            "setting" => Some(CommandKind::Setting),
            _ => None,
        }
    }

    pub fn requires_admin(self) -> bool {
        matches!(
            self,
            CommandKind::Set | CommandKind::Remove | CommandKind::Setting
        )
    }
}

/// Split `/cmd@botname arg1 arg2` into the lower-cased command name and its
/// whitespace-separated arguments.
pub fn parse_command(text: &str) -> (String, Vec<&str>) {
    let mut parts = text.split_whitespace();
    let first = parts.next().unwrap_or("");

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, parts.collect())
}

pub struct CommandProcessor {
    chat_id: ChatId,
    store: Arc<MappingStore>,
    messenger: Arc<dyn MessagingPort>,
}

impl CommandProcessor {
    pub fn new(chat_id: ChatId, store: Arc<MappingStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            chat_id,
            store,
            messenger,
        }
    }

    pub async fn handle(&self, cmd: &CommandInvocation) {
        if cmd.chat_id != self.chat_id {
            debug!(chat_id = %cmd.chat_id, "ignoring command from another chat");
            return;
        }

        let (name, args) = parse_command(&cmd.text);
        let Some(kind) = CommandKind::from_name(&name) else {
            debug!(command = %name, "ignoring unknown command");
            return;
        };

        let reply = match self.execute(kind, &args, cmd).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(command = %name, error = %e, "command failed");
                GENERIC_FAILURE.to_string()
            }
        };

        let dest = Destination::reply(cmd.chat_id, cmd.thread_id, cmd.message_id);
        if let Err(e) = self.messenger.send_html(dest, &reply).await {
            error!(command = %name, error = %e, "failed to send command reply");
        }
    }

    async fn execute(
        &self,
        kind: CommandKind,
        args: &[&str],
        cmd: &CommandInvocation,
    ) -> Result<String> {
        if kind.requires_admin() && !self.sender_is_admin(cmd).await? {
            warn!(
                user = ?cmd.sender.as_ref().map(|s| s.user_id),
                ?kind,
                "non-admin tried a mutating command"
            );
            return Ok(PERMISSION_DENIED.to_string());
        }

        match kind {
            CommandKind::Help => Ok(help_text()),
            CommandKind::List => {
                let table = self.store.read().await;
                Ok(render_list(&table))
            }
            CommandKind::Settings => {
                let table = self.store.read().await;
                Ok(render_settings(&table))
            }
            CommandKind::Set => self.set(args).await,
            CommandKind::Remove => self.remove(args).await,
            CommandKind::Setting => self.setting(args).await,
        }
    }

    async fn sender_is_admin(&self, cmd: &CommandInvocation) -> Result<bool> {
        let Some(sender) = cmd.sender.as_ref() else {
            return Ok(false);
        };
        let role = self
            .messenger
            .member_role(self.chat_id, sender.user_id)
            .await?;
        Ok(role.is_admin())
    }

    async fn set(&self, args: &[&str]) -> Result<String> {
        if args.len() < 2 {
            return Ok("❌ Usage: <code>/set @bot_username topic_id [description]</code>\n\
Example: <code>/set @news_bot 123 News bot</code>"
                .to_string());
        }
        let Ok(topic) = args[1].parse::<i32>() else {
            return Ok("❌ Topic id must be a number.".to_string());
        };
        let description = (args.len() > 2).then(|| args[2..].join(" "));

        let outcome = match self
            .store
            .set(args[0], TopicId(topic), description.as_deref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Ok(store_error_reply(e)),
        };

        Ok(match outcome {
            Upsert::Inserted(m) => {
                info!(username = %m.username, topic_id = %m.topic_id, "mapping added");
                format!(
                    "✅ New bot mapping added!\n@{} → topic {}\nDescription: {}",
                    escape_html(&m.username),
                    m.topic_id,
                    escape_html(&m.description)
                )
            }
            Upsert::Updated { previous, current } => {
                info!(
                    username = %current.username,
                    from = %previous.topic_id,
                    to = %current.topic_id,
                    "mapping updated"
                );
                format!(
                    "✅ Bot mapping updated!\n@{}: topic {} → {}\nDescription: {}",
                    escape_html(&current.username),
                    previous.topic_id,
                    current.topic_id,
                    escape_html(&current.description)
                )
            }
        })
    }

    async fn remove(&self, args: &[&str]) -> Result<String> {
        if args.len() != 1 {
            return Ok("❌ Usage: <code>/remove @bot_username</code>\n\
Example: <code>/remove @news_bot</code>"
                .to_string());
        }

        match self.store.remove(args[0]).await {
            Ok(m) => {
                info!(username = %m.username, topic_id = %m.topic_id, "mapping removed");
                Ok(format!(
                    "✅ Mapping for @{} removed.\n(topic {})",
                    escape_html(&m.username),
                    m.topic_id
                ))
            }
            Err(e) => Ok(store_error_reply(e)),
        }
    }

    async fn setting(&self, args: &[&str]) -> Result<String> {
        if args.len() != 2 {
            return Ok("❌ Usage: <code>/setting key value</code>\n\
Keys: <code>forward_all_unknown_bots</code>, <code>default_topic_id</code>, <code>log_unknown_bots</code>"
                .to_string());
        }

        match self.store.update_setting(args[0], args[1]).await {
            Ok(change) => {
                info!(key = %change.key, from = %change.old_value, to = %change.new_value, "setting updated");
                Ok(format!(
                    "✅ {}: {} → {}",
                    change.key, change.old_value, change.new_value
                ))
            }
            Err(e) => Ok(store_error_reply(e)),
        }
    }
}

/// Expected store outcomes become user-facing replies.
fn store_error_reply(e: StoreError) -> String {
    match &e {
        StoreError::NotFound { username } => {
            format!("❌ No mapping found for @{}.", escape_html(username))
        }
        StoreError::AlreadyMapped { username, topic_id } => format!(
            "⚠️ @{} is already mapped to topic {topic_id}.",
            escape_html(username)
        ),
        StoreError::InvalidUsername(raw) => {
            format!("❌ Invalid bot username: {}", escape_html(raw))
        }
        StoreError::UnknownSetting { key } => format!("❌ Unknown setting: {}", escape_html(key)),
        StoreError::InvalidSetting { key, reason } => {
            format!("❌ Invalid value for {}: {}", escape_html(key), escape_html(reason))
        }
        StoreError::Persistence(detail) => {
            error!(error = %detail, "mapping file write failed");
            SAVE_FAILED.to_string()
        }
    }
}

pub fn render_list(table: &MappingTable) -> String {
    if table.is_empty() {
        return "📝 No bot mappings configured.".to_string();
    }

    let mut out = String::from("📋 <b>Current bot mappings:</b>\n\n");
    for (i, m) in table.mappings().iter().enumerate() {
        out.push_str(&format!(
            "{}. @{} → topic {}\n",
            i + 1,
            escape_html(&m.username),
            m.topic_id
        ));
        if !m.description.is_empty() {
            out.push_str(&format!("   📝 {}\n", escape_html(&m.description)));
        }
        out.push('\n');
    }

    let settings = table.settings();
    let fallback = match (settings.forward_all_unknown_bots, settings.default_topic_id) {
        (true, Some(t)) => format!("unknown bots → topic {t}"),
        _ => "unknown bots are not forwarded".to_string(),
    };
    out.push_str(&format!("⚙️ Fallback: {fallback}\n\n"));

    out.push_str("💡 <b>Usage:</b>\n");
    out.push_str("• <code>/set @bot_username topic_id [description]</code> - add or update a mapping\n");
    out.push_str("• <code>/remove @bot_username</code> - remove a mapping\n");
    out.push_str("• <code>/list</code> - list mappings");
    out
}

pub fn render_settings(table: &MappingTable) -> String {
    let settings = table.settings();
    let mut out = String::from("⚙️ <b>Settings:</b>\n");
    for key in SettingKey::ALL {
        out.push_str(&format!(
            "• <code>{}</code>: {}\n",
            key,
            settings.display_value(key)
        ));
    }
    out.push_str("\nChange with <code>/setting key value</code> (admins only).");
    out
}

pub fn help_text() -> String {
    "🤖 <b>Topic forwarder bot</b>\n\n\
<b>Commands:</b>\n\
• <code>/set @bot_username topic_id [description]</code> - add or update a bot mapping\n\
• <code>/list</code> - show current mappings\n\
• <code>/remove @bot_username</code> - delete a bot mapping\n\
• <code>/settings</code> - show fallback and logging settings\n\
• <code>/setting key value</code> - change a setting\n\
• <code>/help</code> - show this help\n\n\
<b>Examples:</b>\n\
• <code>/set @news_bot 123 News bot</code>\n\
• <code>/set @weather_bot 456</code>\n\
• <code>/remove @news_bot</code>\n\n\
<b>How it works:</b>\n\
1. A mapped bot posts in the main chat\n\
2. The message is copied into its topic\n\n\
<b>Permissions:</b> only administrators can change mappings or settings."
        .to_string()
}
