use crate::{
    domain::{ChatId, MessageId, TopicId, UserId},
    matcher::BotIdentity,
};

/// Inbound update, already stripped of transport details.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(CommandInvocation),
    Message(InboundMessage),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub user_id: UserId,
    pub is_bot: bool,
    pub username: Option<String>,
    pub display_name: String,
}

impl Sender {
    pub fn identity(&self) -> BotIdentity {
        BotIdentity {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// A `/command ...` text message.
#[derive(Clone, Debug)]
pub struct CommandInvocation {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub thread_id: Option<TopicId>,
    pub sender: Option<Sender>,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// `None` for the chat's root thread.
    pub thread_id: Option<TopicId>,
    pub sender: Option<Sender>,
    pub content: ContentKind,
}

/// Closed set of content kinds the forwarder knows how to re-emit.
/// Anything else is `Generic` and goes out as a native forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Text {
        text: String,
        entities: Vec<TextEntity>,
    },
    Photo {
        variants: Vec<PhotoVariant>,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Sticker {
        file_id: String,
    },
    Generic,
}

impl ContentKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Text { .. } => "text",
            ContentKind::Photo { .. } => "photo",
            ContentKind::Document { .. } => "document",
            ContentKind::Video { .. } => "video",
            ContentKind::Voice { .. } => "voice",
            ContentKind::Sticker { .. } => "sticker",
            ContentKind::Generic => "other",
        }
    }

    /// Short description for log lines.
    pub fn preview(&self) -> String {
        match self {
            ContentKind::Text { text, .. } => text.chars().take(50).collect(),
            _ => "Media message".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoVariant {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

/// Formatting span over message text. Offsets and lengths are in UTF-16 code units.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    TextLink { url: String },
    /// Entities with no visual style (mentions, hashtags, plain urls...).
    Plain,
}

impl EntityKind {
    pub fn is_formatting(&self) -> bool {
        !matches!(self, EntityKind::Plain)
    }
}

/// Where an outbound message goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Destination {
    pub chat_id: ChatId,
    pub thread_id: Option<TopicId>,
    pub reply_to: Option<MessageId>,
}

impl Destination {
    pub fn topic(chat_id: ChatId, topic_id: TopicId) -> Self {
        Self {
            chat_id,
            thread_id: Some(topic_id),
            reply_to: None,
        }
    }

    pub fn reply(chat_id: ChatId, thread_id: Option<TopicId>, message_id: MessageId) -> Self {
        Self {
            chat_id,
            thread_id,
            reply_to: Some(message_id),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundPayload {
    Text {
        text: String,
        format: TextFormat,
    },
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Sticker {
        file_id: String,
    },
    /// Native forward; keeps the original attribution.
    Forward {
        from_chat: ChatId,
        message_id: MessageId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberRole {
    pub fn is_admin(self) -> bool {
        matches!(self, MemberRole::Creator | MemberRole::Administrator)
    }
}
