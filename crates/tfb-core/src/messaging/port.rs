use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{Destination, MemberRole, OutboundPayload, TextFormat},
    Result,
};

/// Outbound capability the core needs from a messenger.
///
/// `send` is keyed by chat, optional thread and payload; `member_role` backs
/// the admin check for mutating commands.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send(&self, dest: Destination, payload: OutboundPayload) -> Result<MessageRef>;

    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberRole>;

    async fn send_html(&self, dest: Destination, html: &str) -> Result<MessageRef> {
        self.send(
            dest,
            OutboundPayload::Text {
                text: html.to_string(),
                format: TextFormat::Html,
            },
        )
        .await
    }
}
