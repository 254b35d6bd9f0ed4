use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, info};

mod api;
mod config;
mod store;
mod sync;

use api::{PortalClient, PortalSource};
use config::Config;
use store::CacheStore;
use sync::{LeaderboardSync, LeaderboardUpdate, NotificationSync};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let store = CacheStore::open(&config.cache_path)?;
    info!("Cache opened: {}", config.cache_path);

    let client: Arc<dyn PortalSource> = Arc::new(PortalClient::new(
        &config.api_url,
        config.auth_token.as_deref(),
        config.http_timeout(),
    )?);
    info!("Portal client ready: {}", config.api_url);

    let leaderboard = LeaderboardSync::new(
        Arc::clone(&client),
        store.clone(),
        config.leaderboard_interval(),
    );
    let notifications = NotificationSync::new(Arc::clone(&client), config.notification_delays());

    // Console subscribers; kept until shutdown.
    let standings = leaderboard.subscribe(|update| match update {
        LeaderboardUpdate::Fresh { data } => {
            for (rank, team) in data.iter().enumerate() {
                info!("  #{} {}: {} pts", rank + 1, team.team_name, team.points);
            }
        }
        LeaderboardUpdate::Unchanged => {
            debug!("Leaderboard unchanged");
        }
    });
    let notices = notifications.subscribe(|payload| {
        if let Some(notification) = payload {
            info!("Notification: {}", notification);
        }
    });

    leaderboard.start();
    notifications.start();
    info!(
        "Polling (leaderboard running={}, notifications running={})",
        leaderboard.is_running(),
        notifications.is_running()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    standings.unsubscribe();
    notices.unsubscribe();
    leaderboard.stop();
    notifications.stop();
    info!(
        "Last accepted watermark: {} ({} teams cached)",
        leaderboard.watermark(),
        leaderboard.snapshot().map_or(0, |s| s.len())
    );

    Ok(())
}
