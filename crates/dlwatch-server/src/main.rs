// src/main.rs
// Process bootstrap: load configuration, construct the shared capability
// bundle (spec §9 "singletons... pass a single immutable bundle through the
// bot application's shared data"), spawn the monitor and reconciler loops,
// and run the chat-update dispatcher until a shutdown signal arrives.

mod cli;

use clap::Parser;
use cli::Cli;
use dlwatch::bot;
use dlwatch::chat::TelegramClient;
use dlwatch::config::{AppConfig, apply_env_overrides};
use dlwatch::cursors::PageCursorRegistry;
use dlwatch::db::HistoryPool;
use dlwatch::engine::Aria2Client;
use dlwatch::handlers::AppState;
use dlwatch::monitor::TaskMonitor;
use dlwatch::monitor::registry::MonitorRegistry;
use dlwatch::notify::NotificationReconciler;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Configuration error, engine-unreachable at startup, or history-store
/// init failure (spec §6 "Exit codes").
const EXIT_STARTUP_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Secrets usually live outside the TOML file; `.env` in the working
    // directory is a best-effort convenience, never required.
    let _ = dotenvy::dotenv();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => apply_env_overrides(config),
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    init_logging(&config.logging.level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("missing telegram bot token (config telegram.bot_token or TELEGRAM_BOT_TOKEN)"))?;

    let engine: Arc<dyn dlwatch::engine::EngineClient> = Arc::new(Aria2Client::new(
        &config.aria2.host,
        config.aria2.port,
        config.aria2.secret.clone(),
    ));

    // Fail fast if the engine is unreachable at startup (spec §6 exit codes).
    engine
        .global_stats()
        .await
        .map_err(|e| anyhow::anyhow!("download engine unreachable at startup: {e}"))?;

    let history = Arc::new(
        HistoryPool::open(std::path::Path::new(&config.database.path))
            .await
            .map_err(|e| anyhow::anyhow!("failed to initialize history store: {e}"))?,
    );

    let telegram = Arc::new(TelegramClient::new(bot_token, config.telegram.api_base_url.clone()));
    let chat: Arc<dyn dlwatch::chat::ChatClient> = telegram.clone();

    let monitor_registry = Arc::new(MonitorRegistry::new());
    let cursors = Arc::new(PageCursorRegistry::new());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let monitor = TaskMonitor::new(
        engine.clone(),
        chat.clone(),
        history.clone(),
        monitor_registry.clone(),
        Duration::from_secs(config.monitor.interval_secs),
        config.monitor.max_history,
        shutdown_rx.clone(),
    );

    let reconciler = NotificationReconciler::new(
        chat.clone(),
        history.clone(),
        config.telegram.notify_users.clone(),
        config.notification.enabled,
        Duration::from_secs(config.notification.interval_secs),
        shutdown_rx.clone(),
    );

    let state = Arc::new(AppState::new(
        engine,
        chat,
        history,
        cursors,
        monitor_registry,
        config.telegram.authorized_users.clone(),
        config.pagination.items_per_page,
    ));

    let monitor_handle = tokio::spawn(monitor.run());
    let reconciler_handle = tokio::spawn(reconciler.run());
    let dispatcher_handle = tokio::spawn(bot::run_polling(telegram, state, shutdown_rx));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining loops");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(monitor_handle, reconciler_handle, dispatcher_handle);
    tracing::info!("clean shutdown");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
