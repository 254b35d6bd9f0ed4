use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::source::{ApiError, LeaderboardFetch, PortalSource};
use crate::store::models::TeamScore;

/// Portal transport backed by `reqwest`.
pub struct PortalClient {
    http: Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(base_url: &str, auth_token: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(token) = auth_token {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Auth token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(PortalClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PortalSource for PortalClient {
    async fn fetch_leaderboard(&self, since: Option<i64>) -> Result<LeaderboardFetch, ApiError> {
        let url = match since {
            Some(watermark) => format!("{}/leaderboard?time={}", self.base_url, watermark),
            None => format!("{}/leaderboard", self.base_url),
        };
        debug!("Fetching leaderboard from {}", url);

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let raw: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| ApiError::Malformed(e.to_string()))?;
                parse_leaderboard_envelope(&raw)
            }
            StatusCode::NO_CONTENT => Ok(LeaderboardFetch::NoChange),
            status => Err(ApiError::Status(status)),
        }
    }

    async fn fetch_notification(&self) -> Result<Option<serde_json::Value>, ApiError> {
        let url = format!("{}/notification", self.base_url);
        debug!("Fetching notification from {}", url);

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            StatusCode::OK => {
                let raw: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| ApiError::Malformed(e.to_string()))?;
                Ok(parse_notification_envelope(&raw))
            }
            StatusCode::NO_CONTENT => Ok(None),
            status => Err(ApiError::Status(status)),
        }
    }

    fn name(&self) -> &str {
        "portal"
    }
}

fn parse_leaderboard_envelope(raw: &serde_json::Value) -> Result<LeaderboardFetch, ApiError> {
    let time = raw["time"]
        .as_i64()
        .ok_or_else(|| ApiError::Malformed("missing integer `time`".to_string()))?;

    let rows = raw["leaderboard"]
        .as_array()
        .ok_or_else(|| ApiError::Malformed("missing `leaderboard` array".to_string()))?;

    let leaderboard = rows
        .iter()
        .map(|row| {
            serde_json::from_value::<TeamScore>(row.clone())
                .map_err(|e| ApiError::Malformed(format!("bad leaderboard row: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LeaderboardFetch::Fresh { time, leaderboard })
}

/// A 200 whose `notification` field is missing or null counts as no news.
fn parse_notification_envelope(raw: &serde_json::Value) -> Option<serde_json::Value> {
    match raw.get("notification") {
        Some(value) if !value.is_null() => Some(value.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaderboard_envelope() {
        let raw = json!({
            "time": 100,
            "leaderboard": [
                { "team_name": "Beta", "points": 50 },
                { "team_name": "Alpha", "points": 80 }
            ]
        });
        let fetch = parse_leaderboard_envelope(&raw).unwrap();
        match fetch {
            LeaderboardFetch::Fresh { time, leaderboard } => {
                assert_eq!(time, 100);
                assert_eq!(leaderboard.len(), 2);
                // Server order preserved at this layer; sorting is the sync
                // layer's job.
                assert_eq!(leaderboard[0].team_name, "Beta");
            }
            LeaderboardFetch::NoChange => panic!("expected Fresh"),
        }
    }

    #[test]
    fn test_parse_leaderboard_missing_time() {
        let raw = json!({ "leaderboard": [] });
        assert!(matches!(
            parse_leaderboard_envelope(&raw),
            Err(ApiError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_leaderboard_bad_row() {
        let raw = json!({
            "time": 5,
            "leaderboard": [ { "team_name": "Alpha" } ]
        });
        assert!(matches!(
            parse_leaderboard_envelope(&raw),
            Err(ApiError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_notification_envelope() {
        let raw = json!({ "notification": { "title": "Round 2 open" } });
        let payload = parse_notification_envelope(&raw).unwrap();
        assert_eq!(payload["title"], "Round 2 open");

        assert!(parse_notification_envelope(&json!({ "notification": null })).is_none());
        assert!(parse_notification_envelope(&json!({})).is_none());
    }
}
