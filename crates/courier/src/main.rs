//! Courier - a Telegram bot that sends email through your own mailbox.

mod config;
mod logging;
mod telegram;

use anyhow::{Context as _, Result};
use courier_core::{
    Bot, BotSettings, ChatSink, Context, Dispatcher, SmtpTransport, SqliteStore,
};
use std::sync::Arc;
use tracing::{error, info};

use config::Settings;
use telegram::{TelegramChannel, TelegramClient};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;
    logging::init(&settings.log_file)?;

    if let Err(err) = run(settings).await {
        error!(error = format!("{err:#}"), "fatal error");
        return Err(err);
    }
    Ok(())
}

async fn run(settings: Settings) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting Courier");
    info!(?settings, "loaded settings");

    if let Some(parent) = settings.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let database = settings.database_path.to_string_lossy();
    let store = SqliteStore::new(&database)
        .await
        .with_context(|| format!("opening database {database}"))?;
    info!(path = %database, "database ready");

    let context = Context::new(
        Arc::new(store),
        settings.encryption_key.clone(),
        Arc::new(SmtpTransport::new()),
    )
    .await
    .context("loading encryption key")?;

    let channel = Arc::new(TelegramChannel::new(TelegramClient::new(
        &settings.api_url,
        &settings.bot_token,
    )));
    let sink: Arc<dyn ChatSink> = channel.clone();
    let bot = Arc::new(Bot::new(
        &context,
        sink,
        BotSettings {
            admins: settings.admin_ids.clone(),
            log_file: Some(settings.log_file.clone()),
        },
    ));
    let dispatcher = Dispatcher::new(bot);

    tokio::select! {
        () = channel.run(&dispatcher) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for Ctrl-C")?;
            info!("shutting down");
        }
    }
    Ok(())
}
