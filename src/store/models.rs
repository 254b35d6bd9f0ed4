use serde::{Deserialize, Serialize};

/// One leaderboard row as the portal reports it.
///
/// Field names match the wire envelope (`team_name`, `points`) so the same
/// type deserializes the HTTP response and the cached snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    pub team_name: String,
    pub points: i64,
}
