use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::prelude::*;

use sivebot::bot::{schema, BotState, Services};
use sivebot::config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sivebot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading {config_path}: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("sivebot.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting sivebot...");
    info!("Loaded config from {config_path}");
    if config.allowed_chats.is_empty() {
        info!("Answering in every chat");
    } else {
        info!("Allowed chats: {:?}", config.allowed_chats);
    }
    info!(
        "Moderation: {} (threshold {}, flagging {:?})",
        config.moderation.model.name, config.moderation.threshold, config.moderation.flag_labels
    );

    let bot = Bot::new(&config.telegram_bot_token);

    let services = Services::from_config(&config);
    services.sessions().spawn_sweeper();

    let state = Arc::new(BotState::new(config, services, bot.clone()));
    state.telegram.register_commands().await;

    info!("✅ Bot is ready! Models will load on first use.");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
