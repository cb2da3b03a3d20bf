//! Inbound update loop: commands go to the command processor, bot messages in
//! the managed chat's root thread go through matcher → forwarder.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{
    commands::CommandProcessor,
    domain::{ChatId, TopicId},
    forwarder::Forwarder,
    mapping::MappingStore,
    matcher::{self, display_username, MatchReason},
    messaging::{
        port::MessagingPort,
        types::{InboundMessage, IncomingUpdate},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    OtherChat,
    InTopic,
    NotBot,
}

/// What happened to one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routing {
    Skipped(SkipReason),
    /// No topic resolved; `logged` tells whether the bot was reported.
    Unmatched { logged: bool },
    Forwarded { topic_id: TopicId, delivered: bool },
}

pub struct Ingestor {
    chat_id: ChatId,
    store: Arc<MappingStore>,
    commands: CommandProcessor,
    forwarder: Forwarder,
}

impl Ingestor {
    pub fn new(chat_id: ChatId, store: Arc<MappingStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            chat_id,
            commands: CommandProcessor::new(chat_id, store.clone(), messenger.clone()),
            forwarder: Forwarder::new(chat_id, messenger),
            store,
        }
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    /// Process updates one at a time until every sender is dropped.
    ///
    /// Updates already queued when the senders go away are still processed,
    /// so a command mid-persist always finishes.
    pub async fn run(&self, mut updates: mpsc::Receiver<IncomingUpdate>) {
        while let Some(update) = updates.recv().await {
            self.handle(update).await;
        }
        debug!("update stream closed");
    }

    pub async fn handle(&self, update: IncomingUpdate) {
        match update {
            IncomingUpdate::Command(cmd) => self.commands.handle(&cmd).await,
            IncomingUpdate::Message(msg) => {
                self.route(&msg).await;
            }
        }
    }

    pub async fn route(&self, msg: &InboundMessage) -> Routing {
        if msg.chat_id != self.chat_id {
            return Routing::Skipped(SkipReason::OtherChat);
        }
        // Messages already inside a topic are never re-routed.
        if msg.thread_id.is_some() {
            return Routing::Skipped(SkipReason::InTopic);
        }
        let Some(sender) = msg.sender.as_ref().filter(|s| s.is_bot) else {
            return Routing::Skipped(SkipReason::NotBot);
        };

        let identity = sender.identity();
        let (resolution, log_unknown) = {
            let table = self.store.read().await;
            (
                matcher::resolve(&table, &identity),
                table.settings().log_unknown_bots,
            )
        };

        let Some(resolution) = resolution else {
            if log_unknown {
                info!(
                    username = %display_username(&identity),
                    name = %identity.display_name,
                    "message from unmapped bot"
                );
            }
            return Routing::Unmatched {
                logged: log_unknown,
            };
        };

        let via = match &resolution.reason {
            MatchReason::Username => "username".to_string(),
            MatchReason::DisplayName { mapped_username } => {
                format!("display name ~ @{mapped_username}")
            }
            MatchReason::Fallback => "default topic".to_string(),
        };
        info!(
            username = %display_username(&identity),
            topic_id = %resolution.topic_id,
            %via,
            preview = %msg.content.preview(),
            "bot message detected"
        );

        let delivered = self
            .forwarder
            .forward(msg, resolution.topic_id)
            .await
            .is_some();

        Routing::Forwarded {
            topic_id: resolution.topic_id,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageId, UserId};
    use crate::mapping::{load_table, MappingTable, Settings};
    use crate::messaging::types::{
        CommandInvocation, ContentKind, Destination, OutboundPayload, PhotoVariant, Sender,
        TextFormat,
    };
    use crate::testing::FakeMessenger;

    const CHAT: ChatId = ChatId(-1001);
    const ADMIN: u64 = 1;

    struct Harness {
        _dir: tempfile::TempDir,
        path: std::path::PathBuf,
        messenger: Arc<FakeMessenger>,
        ingestor: Ingestor,
    }

    fn harness_with(table: MappingTable) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_mapping.json");
        let store = Arc::new(MappingStore::with_table(&path, table));
        let messenger = Arc::new(FakeMessenger::with_admins(&[ADMIN]));
        let ingestor = Ingestor::new(CHAT, store, messenger.clone());
        Harness {
            _dir: dir,
            path,
            messenger,
            ingestor,
        }
    }

    fn bot_sender(username: &str, name: &str) -> Sender {
        Sender {
            user_id: UserId(500),
            is_bot: true,
            username: Some(username.to_string()),
            display_name: name.to_string(),
        }
    }

    fn text_from(sender: Sender, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: CHAT,
            message_id: MessageId(77),
            thread_id: None,
            sender: Some(sender),
            content: ContentKind::Text {
                text: text.to_string(),
                entities: vec![],
            },
        }
    }

    fn admin_command(text: &str) -> IncomingUpdate {
        IncomingUpdate::Command(CommandInvocation {
            chat_id: CHAT,
            message_id: MessageId(1),
            thread_id: None,
            sender: Some(Sender {
                user_id: UserId(ADMIN),
                is_bot: false,
                username: Some("admin".to_string()),
                display_name: "Admin".to_string(),
            }),
            text: text.to_string(),
        })
    }

    #[tokio::test]
    async fn unmapped_bot_is_not_forwarded() {
        let h = harness_with(MappingTable::default());
        let r = h
            .ingestor
            .route(&text_from(bot_sender("news_bot", "News"), "hi"))
            .await;
        assert_eq!(r, Routing::Unmatched { logged: true });
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn unmapped_bot_is_not_reported_when_logging_is_off() {
        let h = harness_with(MappingTable::new(Settings {
            log_unknown_bots: false,
            ..Settings::default()
        }));
        let r = h
            .ingestor
            .route(&text_from(bot_sender("news_bot", "News"), "hi"))
            .await;
        assert_eq!(r, Routing::Unmatched { logged: false });
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn set_then_forward_then_remove() {
        let h = harness_with(MappingTable::default());
        let news = || text_from(bot_sender("news_bot", "News"), "hi");

        h.ingestor.handle(admin_command("/set @news_bot 123 News")).await;
        let persisted = load_table(&h.path);
        let m = persisted.get("news_bot").unwrap();
        assert_eq!((m.topic_id, m.description.as_str()), (TopicId(123), "News"));
        h.messenger.clear();

        let r = h.ingestor.route(&news()).await;
        assert_eq!(
            r,
            Routing::Forwarded {
                topic_id: TopicId(123),
                delivered: true
            }
        );
        assert_eq!(
            h.messenger.sent(),
            vec![(
                Destination::topic(CHAT, TopicId(123)),
                OutboundPayload::Text {
                    text: "hi".to_string(),
                    format: TextFormat::Plain
                }
            )]
        );

        h.ingestor.handle(admin_command("/remove @news_bot")).await;
        assert!(load_table(&h.path).is_empty());
        assert_eq!(
            h.ingestor.route(&news()).await,
            Routing::Unmatched { logged: true }
        );
    }

    #[tokio::test]
    async fn unknown_bot_photo_goes_to_default_topic() {
        let h = harness_with(MappingTable::new(Settings {
            forward_all_unknown_bots: true,
            default_topic_id: Some(TopicId(99)),
            log_unknown_bots: true,
        }));
        let msg = InboundMessage {
            content: ContentKind::Photo {
                variants: vec![
                    PhotoVariant {
                        file_id: "small".to_string(),
                        width: 90,
                        height: 60,
                    },
                    PhotoVariant {
                        file_id: "big".to_string(),
                        width: 1280,
                        height: 853,
                    },
                ],
                caption: Some("look".to_string()),
            },
            ..text_from(bot_sender("random_bot", "Random"), "")
        };

        let r = h.ingestor.route(&msg).await;
        assert_eq!(
            r,
            Routing::Forwarded {
                topic_id: TopicId(99),
                delivered: true
            }
        );
        assert_eq!(
            h.messenger.sent()[0].1,
            OutboundPayload::Photo {
                file_id: "big".to_string(),
                caption: Some("look".to_string())
            }
        );
    }

    #[tokio::test]
    async fn messages_inside_a_topic_are_never_rerouted() {
        let mut table = MappingTable::default();
        table.add("news_bot", TopicId(123), None).unwrap();
        let h = harness_with(table);

        let msg = InboundMessage {
            thread_id: Some(TopicId(5)),
            ..text_from(bot_sender("news_bot", "News"), "hi")
        };
        assert_eq!(
            h.ingestor.route(&msg).await,
            Routing::Skipped(SkipReason::InTopic)
        );
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn filters_chat_and_sender_kind() {
        let mut table = MappingTable::default();
        table.add("news_bot", TopicId(123), None).unwrap();
        let h = harness_with(table);

        let elsewhere = InboundMessage {
            chat_id: ChatId(42),
            ..text_from(bot_sender("news_bot", "News"), "hi")
        };
        assert_eq!(
            h.ingestor.route(&elsewhere).await,
            Routing::Skipped(SkipReason::OtherChat)
        );

        let mut human = bot_sender("news_bot", "News");
        human.is_bot = false;
        assert_eq!(
            h.ingestor.route(&text_from(human, "hi")).await,
            Routing::Skipped(SkipReason::NotBot)
        );

        let anonymous = InboundMessage {
            sender: None,
            ..text_from(bot_sender("news_bot", "News"), "hi")
        };
        assert_eq!(
            h.ingestor.route(&anonymous).await,
            Routing::Skipped(SkipReason::NotBot)
        );
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_keeps_loop_alive() {
        let mut table = MappingTable::default();
        table.add("news_bot", TopicId(123), None).unwrap();
        let h = harness_with(table);
        h.messenger.fail_sends(true);

        let r = h
            .ingestor
            .route(&text_from(bot_sender("news_bot", "News"), "hi"))
            .await;
        assert_eq!(
            r,
            Routing::Forwarded {
                topic_id: TopicId(123),
                delivered: false
            }
        );
    }

    #[tokio::test]
    async fn run_drains_queue_in_order() {
        let h = harness_with(MappingTable::default());
        let (tx, rx) = mpsc::channel(8);

        tx.send(admin_command("/set @news_bot 123")).await.unwrap();
        tx.send(IncomingUpdate::Message(text_from(
            bot_sender("news_bot", "News"),
            "first",
        )))
        .await
        .unwrap();
        drop(tx);

        h.ingestor.run(rx).await;

        let sent = h.messenger.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, Destination::topic(CHAT, TopicId(123)));
    }
}
