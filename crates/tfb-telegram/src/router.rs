use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::mpsc;
use tracing::{info, warn};

use tfb_core::{
    config::Config,
    ingest::Ingestor,
    mapping::MappingStore,
    messaging::{port::MessagingPort, types::IncomingUpdate},
};

use crate::{convert, TelegramMessenger};

/// Pending updates between the dispatcher and the ingestor.
const UPDATE_QUEUE: usize = 256;

const COMMANDS: &[&str] = &[
    "/set @bot_username <topic_id> [description]",
    "/list",
    "/remove @bot_username",
    "/settings",
    "/setting <key> <value>",
    "/help",
];

#[derive(Clone)]
pub struct AppState {
    pub updates: mpsc::Sender<IncomingUpdate>,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(bot = %me.username(), "tfb started"),
        Err(e) => warn!(error = %e, "tfb started; could not fetch bot identity"),
    }
    info!(
        chat_id = %cfg.group_chat_id,
        mapping_file = %cfg.mapping_file.display(),
        "managing group chat"
    );

    let store = Arc::new(MappingStore::load(
        &cfg.mapping_file,
        cfg.legacy_mapping.as_ref(),
    ));
    let count = store.read().await.len();
    if count == 0 {
        warn!("no bot mappings configured; add one with /set @bot_username <topic_id>");
    } else {
        info!(count, "bot mappings active");
    }
    for cmd in COMMANDS {
        info!("available command: {cmd}");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let ingestor = Ingestor::new(cfg.group_chat_id, store, messenger);

    // One consumer keeps store mutations and forwards strictly ordered.
    let (tx, rx) = mpsc::channel(UPDATE_QUEUE);
    let consumer = tokio::spawn(async move { ingestor.run(rx).await });

    let state = Arc::new(AppState { updates: tx });
    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // The dispatcher (and with it the last sender) is gone; let the consumer
    // finish whatever is still queued.
    info!("shutting down; draining pending updates");
    consumer.await?;
    info!("tfb stopped");

    Ok(())
}

async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if state.updates.send(convert::to_update(&msg)).await.is_err() {
        warn!(message_id = msg.id.0, "update dropped: ingestor is gone");
    }
    Ok(())
}
