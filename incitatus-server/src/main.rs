//! Incitatus Server
//!
//! Discord bot for an Albion Online guild: event attendance, loot splits,
//! member registration and roster announcements.

mod bot;
mod commands;
mod config;
mod discord;
mod log_mirror;
mod server;
mod shutdown;
mod state;

use bot::{Bot, resolve_guild};
use clap::Parser;
use config::{ConfigLoader, Overrides, get_discord_token, get_port_override};
use discord::{DiscordRest, Gateway};
use incitatus_core::BotContext;
use incitatus_core::framework::StoragePaths;
use incitatus_sdk::client::GameDataClient;
use server::{build_router, run_server};
use shutdown::shutdown_signal;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "incitatus.log";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Incitatus - Albion Online guild bot
#[derive(Parser, Debug)]
#[command(name = "incitatus")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(short, long, env = "INCITATUS_SETTINGS", default_value = "./incitatus.toml")]
    settings: PathBuf,

    /// Override the liveness listen address (e.g., 0.0.0.0:10000)
    #[arg(short, long, env = "INCITATUS_LISTEN")]
    listen: Option<SocketAddr>,

    /// Override the directory holding the JSON documents
    #[arg(long, env = "INCITATUS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let mirror_rx = init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting incitatus v{}", env!("CARGO_PKG_VERSION"));

    let token = get_discord_token().map_err(|e| {
        tracing::error!("DISCORD_TOKEN environment variable not set");
        e
    })?;

    // Load settings
    let loader = ConfigLoader::new(
        &args.settings,
        Overrides {
            listen: args.listen,
            data_dir: args.data_dir,
            port: get_port_override(),
        },
    );
    let settings = loader.load().map_err(|e| {
        tracing::error!("Failed to load settings: {}", e);
        e
    })?;
    tracing::info!("Settings loaded from {:?}", args.settings);

    std::fs::create_dir_all(&settings.data_dir)?;
    let paths = StoragePaths::in_dir(&settings.data_dir);

    let rest = Arc::new(DiscordRest::new(settings.discord.api_base.clone(), &token));
    let guild = resolve_guild(&rest, settings.discord.guild_id).await?;

    let game_data = Arc::new(
        GameDataClient::new(
            settings.game_data.base_url.clone(),
            settings.game_data.guild_id.clone(),
        )
        .with_timeouts(
            settings.game_data.roster_timeout,
            settings.game_data.search_timeout,
        ),
    );

    let ctx = BotContext::open(guild, &paths, rest.clone(), game_data, settings.bot.clone())
        .await
        .map_err(|e| {
            tracing::error!("Failed to open persisted documents: {}", e);
            e
        })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new();

    tokio::spawn(log_mirror::run_log_mirror(
        mirror_rx,
        ctx.config.clone(),
        ctx.platform.clone(),
        shutdown_rx.clone(),
    ));

    let bot = Arc::new(Bot::new(
        ctx.clone(),
        rest.clone(),
        state.clone(),
        shutdown_rx.clone(),
    ));
    let gateway = Gateway::new(
        settings.discord.gateway_url.clone(),
        token,
        bot,
        state.clone(),
    );
    let mut gateway_task = tokio::spawn(gateway.run(shutdown_rx.clone()));

    tracing::info!("Starting liveness server on {}", settings.listen);
    let mut server_task = tokio::spawn(run_server(
        build_router(state),
        settings.listen,
        shutdown_rx,
    ));

    let mut failure = None;
    let (mut gateway_done, mut server_done) = (false, false);
    tokio::select! {
        _ = shutdown_signal() => {}
        joined = &mut gateway_task => {
            gateway_done = true;
            failure = task_failure("gateway", joined);
        }
        joined = &mut server_task => {
            server_done = true;
            failure = task_failure("liveness server", joined);
        }
    }

    // Signal the background tasks to stop
    if shutdown_tx.send(true).is_err() {
        tracing::debug!("All background tasks already stopped");
    }
    if !gateway_done {
        drain("gateway", gateway_task).await;
    }
    if !server_done {
        drain("liveness server", server_task).await;
    }

    tracing::info!("Flushing persisted documents...");
    ctx.flush().await?;
    tracing::info!("Shutdown complete");

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// An error for a background task that ended before shutdown was requested.
fn task_failure<E>(name: &str, joined: Result<Result<(), E>, JoinError>) -> Option<anyhow::Error>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match joined {
        Ok(Ok(())) => {
            tracing::warn!("{} stopped unexpectedly", name);
            None
        }
        Ok(Err(e)) => {
            tracing::error!("{} failed: {}", name, e);
            Some(e.into())
        }
        Err(e) => {
            tracing::error!("{} task panicked: {}", name, e);
            Some(e.into())
        }
    }
}

/// Wait a bounded time for a task that was told to stop.
async fn drain<T>(name: &str, task: tokio::task::JoinHandle<T>) {
    if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
        tracing::warn!("{} did not stop within {:?}", name, SHUTDOWN_GRACE);
    }
}

/// Initialize the tracing subscriber: console, `incitatus.log`, and the
/// bot-log mirror. Returns the mirror's queue.
fn init_tracing() -> mpsc::UnboundedReceiver<String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,tokio_tungstenite=warn"));

    let (file_layer, file_error) = match std::fs::File::create(LOG_FILE) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };
    let (mirror_layer, mirror_rx) = log_mirror::bot_log_layer();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .with(mirror_layer)
        .init();

    if let Some(e) = file_error {
        tracing::warn!("Could not open {}: {}", LOG_FILE, e);
    }
    mirror_rx
}
