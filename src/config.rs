use clap::Parser;
use std::time::Duration;

use crate::sync::NotificationDelays;

/// CTF portal live-sync daemon
#[derive(Parser, Debug, Clone)]
#[command(name = "portal-sync", version, about)]
pub struct Config {
    /// Portal API base URL
    #[arg(
        long,
        env = "PORTAL_API_URL",
        default_value = "https://ccb.roboticsclubvitc.co/api"
    )]
    pub api_url: String,

    /// Bearer token attached to every portal request
    #[arg(long, env = "PORTAL_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// SQLite path for the restart-surviving leaderboard cache
    #[arg(long, env = "CACHE_PATH", default_value = "portal-cache.db")]
    pub cache_path: String,

    /// Leaderboard polling interval in milliseconds
    #[arg(long, env = "LEADERBOARD_INTERVAL_MS", default_value = "1500")]
    pub leaderboard_interval_ms: u64,

    /// Delay after a cycle that delivered a notification (milliseconds)
    #[arg(long, env = "NOTIFICATION_BUSY_DELAY_MS", default_value = "1000")]
    pub notification_busy_delay_ms: u64,

    /// Delay after an empty or failed notification cycle (milliseconds)
    #[arg(long, env = "NOTIFICATION_IDLE_DELAY_MS", default_value = "500")]
    pub notification_idle_delay_ms: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!("api_url must not be empty");
        }
        if self.leaderboard_interval_ms == 0 {
            anyhow::bail!("leaderboard_interval_ms must be positive");
        }
        if self.notification_busy_delay_ms == 0 {
            anyhow::bail!("notification_busy_delay_ms must be positive");
        }
        if self.notification_idle_delay_ms == 0 {
            anyhow::bail!("notification_idle_delay_ms must be positive");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn leaderboard_interval(&self) -> Duration {
        Duration::from_millis(self.leaderboard_interval_ms)
    }

    pub fn notification_delays(&self) -> NotificationDelays {
        NotificationDelays {
            busy: Duration::from_millis(self.notification_busy_delay_ms),
            idle: Duration::from_millis(self.notification_idle_delay_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
