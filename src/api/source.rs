use async_trait::async_trait;
use thiserror::Error;

use crate::store::models::TeamScore;

/// Failure modes of one portal request. All of them are recoverable from the
/// poll loops' perspective: log and retry on the next cycle.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Outcome of one leaderboard request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderboardFetch {
    /// 200: a scoreboard stamped with the server's update time. Ordering is
    /// not trusted; the sync layer re-sorts before accepting it.
    Fresh {
        time: i64,
        leaderboard: Vec<TeamScore>,
    },
    /// 204: nothing newer than the watermark we asked about.
    NoChange,
}

/// Trait every portal transport must implement.
#[async_trait]
pub trait PortalSource: Send + Sync {
    /// One leaderboard poll. `since` carries the held watermark so the portal
    /// can answer 204 cheaply; `None` means no watermark is held yet.
    async fn fetch_leaderboard(&self, since: Option<i64>) -> Result<LeaderboardFetch, ApiError>;

    /// One notification poll. `Ok(None)` maps the portal's 204.
    async fn fetch_notification(&self) -> Result<Option<serde_json::Value>, ApiError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
