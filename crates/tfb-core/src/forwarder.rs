//! Re-emits a message's content into a topic of the managed chat.

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    domain::{ChatId, MessageRef, TopicId},
    formatting::{has_formatting, render_entities_html},
    messaging::{
        port::MessagingPort,
        types::{ContentKind, Destination, InboundMessage, OutboundPayload, TextFormat},
    },
    Result,
};

pub struct Forwarder {
    chat_id: ChatId,
    messenger: Arc<dyn MessagingPort>,
}

impl Forwarder {
    pub fn new(chat_id: ChatId, messenger: Arc<dyn MessagingPort>) -> Self {
        Self { chat_id, messenger }
    }

    /// Send one outbound message for `msg` into `topic_id`.
    ///
    /// Send failures are logged and swallowed; there is no retry.
    pub async fn forward(&self, msg: &InboundMessage, topic_id: TopicId) -> Option<MessageRef> {
        match self.try_forward(msg, topic_id).await {
            Ok(sent) => {
                info!(topic_id = %topic_id, kind = msg.content.label(), "message forwarded to topic");
                Some(sent)
            }
            Err(e) => {
                error!(topic_id = %topic_id, kind = msg.content.label(), error = %e, "failed to forward message");
                None
            }
        }
    }

    async fn try_forward(&self, msg: &InboundMessage, topic_id: TopicId) -> Result<MessageRef> {
        let payload = payload_for(msg);
        self.messenger
            .send(Destination::topic(self.chat_id, topic_id), payload)
            .await
    }
}

/// Pick the re-emission strategy for a message. Exactly one per content kind.
pub fn payload_for(msg: &InboundMessage) -> OutboundPayload {
    match &msg.content {
        ContentKind::Text { text, entities } => {
            if has_formatting(entities) {
                OutboundPayload::Text {
                    text: render_entities_html(text, entities),
                    format: TextFormat::Html,
                }
            } else {
                OutboundPayload::Text {
                    text: text.clone(),
                    format: TextFormat::Plain,
                }
            }
        }
        ContentKind::Photo { variants, caption } => {
            // Largest area wins; on ties the later (Telegram lists ascending) one.
            match variants
                .iter()
                .max_by_key(|v| u64::from(v.width) * u64::from(v.height))
            {
                Some(best) => OutboundPayload::Photo {
                    file_id: best.file_id.clone(),
                    caption: caption.clone(),
                },
                None => native_forward(msg),
            }
        }
        ContentKind::Document { file_id, caption } => OutboundPayload::Document {
            file_id: file_id.clone(),
            caption: caption.clone(),
        },
        ContentKind::Video { file_id, caption } => OutboundPayload::Video {
            file_id: file_id.clone(),
            caption: caption.clone(),
        },
        ContentKind::Voice { file_id, caption } => OutboundPayload::Voice {
            file_id: file_id.clone(),
            caption: caption.clone(),
        },
        ContentKind::Sticker { file_id } => OutboundPayload::Sticker {
            file_id: file_id.clone(),
        },
        ContentKind::Generic => native_forward(msg),
    }
}

fn native_forward(msg: &InboundMessage) -> OutboundPayload {
    OutboundPayload::Forward {
        from_chat: msg.chat_id,
        message_id: msg.message_id,
    }
}
