//! relaybot CLI entry point.

use relaybot::BotEvent;
use relaybot::agent::{Bot, Engine};
use relaybot::config::BotConfig;
use relaybot::llm::OpenAiBackend;
use relaybot::messaging::{Messaging as _, TwitchAdapter};
use relaybot::settings::SettingsStore;

use anyhow::Context as _;
use clap::Parser;
use tokio::sync::broadcast;

use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Twitch chat bot that relays messages to an OpenAI-compatible model")]
struct Cli {
    /// Path to config file (defaults to <config dir>/relaybot/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Do not reload the config file when it changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = relaybot::logging::init_tracing(cli.debug, cli.log_dir.as_deref())?;

    let config_path = cli
        .config
        .or_else(|| BotConfig::default_path().filter(|path| path.exists()));

    let settings = Arc::new(
        SettingsStore::load(config_path.as_deref()).context("failed to load configuration")?,
    );
    let config = settings.current();
    config
        .require_credentials()
        .context("configuration is incomplete")?;

    tracing::info!(
        path = ?config_path,
        model = %config.model.model_name,
        api_style = ?config.model.api_style,
        channels = ?config.twitch.channels,
        "configuration loaded"
    );

    let backend = Arc::new(
        OpenAiBackend::new(&config.model).context("failed to initialize model backend")?,
    );
    let engine = Engine::new(settings.clone(), backend).context("failed to initialize engine")?;

    let oauth_token = config
        .twitch
        .oauth_token
        .clone()
        .context("TWITCH_AUTH is not set")?;
    let transport = Arc::new(TwitchAdapter::new(
        config.twitch.username.clone(),
        oauth_token,
        config.twitch.channels.clone(),
    ));
    let inbound = transport
        .start()
        .await
        .context("failed to start twitch adapter")?;

    let (event_tx, event_rx) = broadcast::channel(64);

    let _watcher = match (&config_path, cli.no_watch) {
        (Some(_), false) => match settings.watch(event_tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                tracing::warn!(%error, "config hot reload disabled");
                None
            }
        },
        _ => None,
    };

    let notifications = tokio::spawn(log_notifications(event_rx));
    let bot_loop = tokio::spawn(Bot::new(engine, transport.clone(), event_tx).run(inbound));

    tracing::info!("relaybot started");

    tokio::select! {
        result = bot_loop => match result {
            Ok(Ok(())) => tracing::info!("bot loop ended"),
            Ok(Err(error)) => tracing::error!(%error, "bot loop failed"),
            Err(error) => tracing::error!(%error, "bot loop task failed"),
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    settings.cancel_in_flight();
    if let Err(error) = transport.shutdown().await {
        tracing::warn!(%error, "twitch adapter shutdown failed");
    }
    notifications.abort();

    tracing::info!("relaybot stopped");
    Ok(())
}

/// Stand-in consumer for the notification channel. TTS and UI collaborators
/// subscribe to the same channel.
async fn log_notifications(mut events: broadcast::Receiver<BotEvent>) {
    loop {
        match events.recv().await {
            Ok(BotEvent::TtsRequested { channel, user, .. }) => {
                tracing::debug!(%channel, %user, "tts requested");
            }
            Ok(BotEvent::ReplySent { channel, text }) => {
                tracing::debug!(%channel, chars = text.chars().count(), "reply sent");
            }
            Ok(BotEvent::ConfigReloaded) => tracing::info!("configuration reloaded"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notification consumer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
