//! teloxide `Message` → core inbound model.

use teloxide::types::{Message, MessageEntity, MessageEntityKind, User};

use tfb_core::{
    domain::{ChatId, MessageId, TopicId, UserId},
    messaging::types::{
        CommandInvocation, ContentKind, EntityKind, InboundMessage, IncomingUpdate, PhotoVariant,
        Sender, TextEntity,
    },
};

pub fn to_update(msg: &Message) -> IncomingUpdate {
    let chat_id = ChatId(msg.chat.id.0);
    let message_id = MessageId(msg.id.0);
    let thread_id = msg.thread_id.map(TopicId);
    let sender = msg.from().map(to_sender);

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return IncomingUpdate::Command(CommandInvocation {
                chat_id,
                message_id,
                thread_id,
                sender,
                text: text.to_string(),
            });
        }
    }

    IncomingUpdate::Message(InboundMessage {
        chat_id,
        message_id,
        thread_id,
        sender,
        content: content_of(msg),
    })
}

fn to_sender(user: &User) -> Sender {
    Sender {
        user_id: UserId(user.id.0),
        is_bot: user.is_bot,
        username: user.username.clone(),
        display_name: user.first_name.clone(),
    }
}

fn content_of(msg: &Message) -> ContentKind {
    let caption = msg.caption().map(str::to_string);

    if let Some(text) = msg.text() {
        return ContentKind::Text {
            text: text.to_string(),
            entities: msg
                .entities()
                .unwrap_or_default()
                .iter()
                .map(to_entity)
                .collect(),
        };
    }
    if let Some(sizes) = msg.photo() {
        return ContentKind::Photo {
            variants: sizes
                .iter()
                .map(|p| PhotoVariant {
                    file_id: p.file.id.clone(),
                    width: p.width,
                    height: p.height,
                })
                .collect(),
            caption,
        };
    }
    if let Some(doc) = msg.document() {
        return ContentKind::Document {
            file_id: doc.file.id.clone(),
            caption,
        };
    }
    if let Some(video) = msg.video() {
        return ContentKind::Video {
            file_id: video.file.id.clone(),
            caption,
        };
    }
    if let Some(voice) = msg.voice() {
        return ContentKind::Voice {
            file_id: voice.file.id.clone(),
            caption,
        };
    }
    if let Some(sticker) = msg.sticker() {
        return ContentKind::Sticker {
            file_id: sticker.file.id.clone(),
        };
    }
    ContentKind::Generic
}

fn to_entity(e: &MessageEntity) -> TextEntity {
    let kind = match &e.kind {
        MessageEntityKind::Bold => EntityKind::Bold,
        MessageEntityKind::Italic => EntityKind::Italic,
        MessageEntityKind::Underline => EntityKind::Underline,
        MessageEntityKind::Strikethrough => EntityKind::Strikethrough,
        MessageEntityKind::Spoiler => EntityKind::Spoiler,
        MessageEntityKind::Code => EntityKind::Code,
        MessageEntityKind::Pre { language } => EntityKind::Pre {
            language: language.clone(),
        },
        MessageEntityKind::TextLink { url } => EntityKind::TextLink {
            url: url.to_string(),
        },
        _ => EntityKind::Plain,
    };
    TextEntity {
        kind,
        offset: e.offset,
        length: e.length,
    }
}
