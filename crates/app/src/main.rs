//! Ofisu - office room graphs mirrored into Discord guilds
//!
//! Every guild the bot is in gets a category of room channels built from the
//! installed office, and members walk between rooms with chat commands.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ofisu_core::{open_store, OfficeRegistry};
use ofisu_net::{DiscordClient, Gateway, Platform};

mod cli;
mod command;
mod controller;
mod error;
mod manager;
mod state;

use cli::{Cli, Command, DiscordManagerArgs};
use manager::ControllerManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::DiscordManager(args) => run_discord_manager(args).await,
    }
}

async fn run_discord_manager(args: DiscordManagerArgs) -> anyhow::Result<()> {
    tracing::info!("Starting Ofisu discord manager");

    let offices = OfficeRegistry::load(&args.offices)
        .with_context(|| format!("loading offices from {}", args.offices.display()))?;
    tracing::info!(offices = offices.len(), "Offices loaded");

    let store = open_store(&args.store_url).context("opening key-value store")?;

    let client = DiscordClient::new(
        args.discord_token.clone(),
        Duration::from_secs(args.http_timeout_secs),
    )
    .context("building Discord client")?;
    let bot = client
        .current_user()
        .await
        .context("identifying bot user")?;
    tracing::info!(user_id = %bot.id, username = %bot.username, "Connected");

    let platform: Arc<dyn Platform> = Arc::new(client);
    let manager = Arc::new(ControllerManager::new(
        platform,
        store,
        Arc::new(offices),
        bot,
        Duration::from_secs(args.sync_timeout_secs),
    ));

    let (gateway, mut events) = Gateway::new(args.discord_token);
    let (stop_gateway, gateway_shutdown) = broadcast::channel(1);
    let mut gateway_task = tokio::spawn(gateway.run(gateway_shutdown));

    let mut ticker = interval(Duration::from_millis(args.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    if let Err(e) = manager.tick().await {
                        tracing::warn!(error = %e, "Tick finished with errors");
                    }
                });
            }
            Some(event) = events.recv() => {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.handle_event(event).await });
            }
            finished = &mut gateway_task => {
                return match finished {
                    Ok(Ok(())) => Err(anyhow!("gateway session ended")),
                    Ok(Err(e)) => Err(e).context("gateway session failed"),
                    Err(e) => Err(e).context("gateway task failed"),
                };
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    let _ = stop_gateway.send(());
    if let Err(e) = gateway_task.await {
        tracing::warn!(error = %e, "Gateway task failed during shutdown");
    }
    tracing::info!(guilds = manager.guild_ids().await.len(), "Stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
