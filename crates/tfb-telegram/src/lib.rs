//! Telegram adapter (teloxide).
//!
//! This crate implements the `tfb-core` MessagingPort over the Telegram Bot API
//! and drives the core ingestor from a long-polling dispatcher.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, InputFile, ParseMode},
};

pub mod convert;
pub mod discover;
pub mod router;

use tfb_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Destination, MemberRole, OutboundPayload, TextFormat},
    },
    Result,
};

/// Applies the thread and reply-to of a [`Destination`] to a send request.
///
/// Some teloxide payloads (e.g. `SendSticker`) take the reply-to id as a raw
/// `i32` rather than a `MessageId`; pass a converter as the third argument.
macro_rules! addressed {
    ($req:expr, $dest:expr) => {
        addressed!($req, $dest, TelegramMessenger::tg_msg_id)
    };
    ($req:expr, $dest:expr, $reply_id:expr) => {{
        let mut req = $req;
        if let Some(topic) = $dest.thread_id {
            req = req.message_thread_id(topic.0);
        }
        if let Some(reply_to) = $dest.reply_to {
            req = req.reply_to_message_id($reply_id(reply_to));
        }
        req
    }};
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send(&self, dest: Destination, payload: OutboundPayload) -> Result<MessageRef> {
        let chat = Self::tg_chat(dest.chat_id);

        let sent = match payload {
            OutboundPayload::Text { text, format } => {
                let mut req = addressed!(self.bot.send_message(chat, text), dest);
                if format == TextFormat::Html {
                    req = req.parse_mode(ParseMode::Html);
                }
                req.await
            }
            OutboundPayload::Photo { file_id, caption } => {
                let mut req = addressed!(self.bot.send_photo(chat, InputFile::file_id(file_id)), dest);
                if let Some(c) = caption {
                    req = req.caption(c);
                }
                req.await
            }
            OutboundPayload::Document { file_id, caption } => {
                let mut req =
                    addressed!(self.bot.send_document(chat, InputFile::file_id(file_id)), dest);
                if let Some(c) = caption {
                    req = req.caption(c);
                }
                req.await
            }
            OutboundPayload::Video { file_id, caption } => {
                let mut req = addressed!(self.bot.send_video(chat, InputFile::file_id(file_id)), dest);
                if let Some(c) = caption {
                    req = req.caption(c);
                }
                req.await
            }
            OutboundPayload::Voice { file_id, caption } => {
                let mut req = addressed!(self.bot.send_voice(chat, InputFile::file_id(file_id)), dest);
                if let Some(c) = caption {
                    req = req.caption(c);
                }
                req.await
            }
            OutboundPayload::Sticker { file_id } => {
                addressed!(
                    self.bot.send_sticker(chat, InputFile::file_id(file_id)),
                    dest,
                    |m: MessageId| m.0
                )
                .await
            }
            OutboundPayload::Forward {
                from_chat,
                message_id,
            } => {
                let mut req = self.bot.forward_message(
                    chat,
                    Self::tg_chat(from_chat),
                    Self::tg_msg_id(message_id),
                );
                if let Some(topic) = dest.thread_id {
                    req = req.message_thread_id(topic.0);
                }
                req.await
            }
        }
        .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id: dest.chat_id,
            message_id: MessageId(sent.id.0),
        })
    }

    async fn member_role(&self, chat_id: ChatId, user_id: UserId) -> Result<MemberRole> {
        let member = self
            .bot
            .get_chat_member(Self::tg_chat(chat_id), teloxide::types::UserId(user_id.0))
            .await
            .map_err(Self::map_err)?;

        Ok(match member.kind {
            ChatMemberKind::Owner(_) => MemberRole::Creator,
            ChatMemberKind::Administrator(_) => MemberRole::Administrator,
            ChatMemberKind::Member => MemberRole::Member,
            ChatMemberKind::Restricted(_) => MemberRole::Restricted,
            ChatMemberKind::Left => MemberRole::Left,
            ChatMemberKind::Banned(_) => MemberRole::Banned,
        })
    }
}
