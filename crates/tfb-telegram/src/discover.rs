//! One-shot helper that lists the chats a bot has recently seen, to find the
//! managed group's id.

use std::collections::HashSet;

use teloxide::{
    prelude::*,
    types::{Chat, UpdateKind},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeenChat {
    pub id: i64,
    pub kind: &'static str,
    pub title: Option<String>,
    pub topic_id: Option<i32>,
    pub sender: Option<String>,
}

impl SeenChat {
    pub fn is_supergroup(&self) -> bool {
        self.kind == "supergroup"
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Chat id:   {}\nChat type: {}\nTitle:     {}\n",
            self.id,
            self.kind,
            self.title.as_deref().unwrap_or("N/A")
        );
        if let Some(topic) = self.topic_id {
            out.push_str(&format!("Topic id:  {topic}\n"));
        }
        if let Some(sender) = &self.sender {
            out.push_str(&format!("Sender:    {sender}\n"));
        }
        if self.is_supergroup() {
            out.push_str(&format!("✅ This looks like the group chat: GROUP_CHAT_ID={}\n", self.id));
        }
        out
    }
}

/// Distinct chats in update order. Only message updates are considered.
pub fn seen_chats(updates: &[Update]) -> Vec<SeenChat> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for update in updates {
        let UpdateKind::Message(msg) = &update.kind else {
            continue;
        };
        if !seen.insert(msg.chat.id.0) {
            continue;
        }
        out.push(SeenChat {
            id: msg.chat.id.0,
            kind: chat_kind(&msg.chat),
            title: msg.chat.title().map(str::to_string),
            topic_id: msg.thread_id,
            sender: msg.from().map(|u| {
                format!(
                    "@{} ({}){}",
                    u.username.as_deref().unwrap_or("N/A"),
                    u.first_name,
                    if u.is_bot { " [bot]" } else { "" }
                )
            }),
        });
    }
    out
}

fn chat_kind(chat: &Chat) -> &'static str {
    if chat.is_supergroup() {
        "supergroup"
    } else if chat.is_group() {
        "group"
    } else if chat.is_channel() {
        "channel"
    } else if chat.is_private() {
        "private"
    } else {
        "unknown"
    }
}

pub async fn run_discovery(token: String, limit: u8) -> anyhow::Result<()> {
    let bot = Bot::new(token);
    let updates = bot.get_updates().limit(limit).await?;
    let chats = seen_chats(&updates);

    if chats.is_empty() {
        println!("No recent messages found.");
        println!();
        println!("Next steps:");
        println!("1. Add the bot to your group");
        println!("2. Post any message in the group");
        println!("3. Run this command again");
        return Ok(());
    }

    println!("Chats seen in the last {} updates:", updates.len());
    println!("{}", "-".repeat(50));
    for chat in &chats {
        println!("{}", chat.render());
    }
    println!("Tips:");
    println!("- Group chat ids are negative (e.g. -1001234567890)");
    println!("- Forum groups are of type 'supergroup'");

    Ok(())
}
