use std::sync::Arc;

use clap::{Parser, Subcommand};

use tfb_core::config::{load_bot_token, Config};

/// Routes messages from other bots into forum topics of one Telegram group.
#[derive(Parser)]
#[command(name = "tfb", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the forwarder (default).
    Run,
    /// List chats from recent updates to find the group chat id.
    Discover {
        /// Number of recent updates to inspect.
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100))]
        limit: u8,
    },
}

#[tokio::main]
async fn main() -> Result<(), tfb_core::Error> {
    let cli = Cli::parse();
    tfb_core::logging::init("tfb")?;

    match cli.command.unwrap_or(Cmd::Run) {
        Cmd::Run => {
            let cfg = Arc::new(Config::load()?);
            tfb_telegram::router::run_polling(cfg)
                .await
                .map_err(|e| tfb_core::Error::External(format!("telegram bot failed: {e}")))?;
        }
        Cmd::Discover { limit } => {
            let token = load_bot_token()?;
            tfb_telegram::discover::run_discovery(token, limit)
                .await
                .map_err(|e| tfb_core::Error::External(format!("discovery failed: {e}")))?;
        }
    }

    Ok(())
}
