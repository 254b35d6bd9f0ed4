//! Fixed-interval, watermark-gated leaderboard poller.
//!
//! One cycle per tick: request the scoreboard (parameterized by the held
//! watermark so the portal can answer 204 cheaply), accept the response only
//! if its `time` is strictly newer, persist the accepted snapshot, and fan it
//! out to subscribers. A transport failure never stops the loop; the next
//! tick retries.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::listeners::{Callback, ListenerSet, Subscription};
use crate::api::{LeaderboardFetch, PortalSource};
use crate::store::models::TeamScore;
use crate::store::CacheStore;

/// Payload delivered to leaderboard subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderboardUpdate {
    /// A strictly newer snapshot was accepted, already sorted by points.
    Fresh { data: Vec<TeamScore> },
    /// The portal answered 204: nothing changed since the held watermark.
    Unchanged,
}

pub struct LeaderboardSync {
    source: Arc<dyn PortalSource>,
    store: CacheStore,
    interval: Duration,
    listeners: ListenerSet<LeaderboardUpdate>,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    /// Bumped on every start/stop. A cycle whose captured generation no
    /// longer matches must not touch state or notify, so a late-resolving
    /// fetch from a stopped loop is dropped unconditionally.
    generation: u64,
    task: Option<JoinHandle<()>>,
    /// Monotonically non-decreasing freshness stamp; 0 means none held.
    watermark: i64,
    snapshot: Option<Vec<TeamScore>>,
}

impl LeaderboardSync {
    /// Build a service resuming from whatever the durable cache holds.
    pub fn new(source: Arc<dyn PortalSource>, store: CacheStore, interval: Duration) -> Self {
        let watermark = store.load_watermark();
        let snapshot = store.load_snapshot();
        if watermark > 0 {
            info!("Resuming leaderboard sync from cached watermark {}", watermark);
        }
        LeaderboardSync {
            source,
            store,
            interval,
            listeners: ListenerSet::new(),
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                task: None,
                watermark,
                snapshot,
            })),
        }
    }

    /// Begin polling. Idempotent: a second `start` while running is a no-op.
    /// The first fetch fires immediately, then one per interval.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.task.is_some() {
            return;
        }
        inner.generation += 1;
        let generation = inner.generation;

        let source = Arc::clone(&self.source);
        let store = self.store.clone();
        let listeners = self.listeners.clone();
        let shared = Arc::clone(&self.inner);
        let interval = self.interval;

        inner.task = Some(tokio::spawn(async move {
            info!(
                "Leaderboard sync started (source={}, interval={:?})",
                source.name(),
                interval
            );
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let since = {
                    let state = shared.lock().unwrap();
                    if state.generation != generation {
                        break;
                    }
                    if state.watermark == 0 {
                        None
                    } else {
                        Some(state.watermark)
                    }
                };

                match source.fetch_leaderboard(since).await {
                    Ok(fetch) => apply_fetch(&shared, &store, &listeners, generation, fetch),
                    Err(e) => warn!("Leaderboard fetch failed: {}", e),
                }
            }
        }));
    }

    /// Stop polling. Idempotent. Cancels the pending tick and makes any
    /// in-flight fetch's resolution a no-op via the generation bump.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.task.take() {
            inner.generation += 1;
            task.abort();
            info!("Leaderboard sync stopped");
        }
    }

    /// Register a listener and synchronously replay the cached snapshot (if
    /// any) before returning, so a late subscriber is not left blank until
    /// the next tick.
    pub fn subscribe(
        &self,
        listener: impl Fn(&LeaderboardUpdate) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Callback<LeaderboardUpdate> = Arc::new(listener);
        let subscription = self.listeners.subscribe(Arc::clone(&callback));
        if let Some(data) = self.store.load_snapshot() {
            callback(&LeaderboardUpdate::Fresh { data });
        }
        subscription
    }

    pub fn watermark(&self) -> i64 {
        self.inner.lock().unwrap().watermark
    }

    pub fn snapshot(&self) -> Option<Vec<TeamScore>> {
        self.inner.lock().unwrap().snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().task.is_some()
    }
}

impl Drop for LeaderboardSync {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decide what one cycle's result means and apply it. Every side effect is
/// gated on the generation still matching; listeners are notified outside
/// the state lock.
fn apply_fetch(
    shared: &Arc<Mutex<Inner>>,
    store: &CacheStore,
    listeners: &ListenerSet<LeaderboardUpdate>,
    generation: u64,
    fetch: LeaderboardFetch,
) {
    let update = {
        let mut state = shared.lock().unwrap();
        if state.generation != generation {
            debug!("Dropping leaderboard result from a stopped cycle");
            return;
        }
        match fetch {
            LeaderboardFetch::Fresh { time, leaderboard } if time > state.watermark => {
                let mut data = leaderboard;
                // The portal's ordering is not trusted. Stable sort: ties
                // keep the incoming relative order.
                data.sort_by(|a, b| b.points.cmp(&a.points));
                if let Err(e) = store.save_leaderboard(time, &data) {
                    warn!("Failed to persist leaderboard cache: {:#}", e);
                }
                state.watermark = time;
                state.snapshot = Some(data.clone());
                info!(
                    "Leaderboard advanced to watermark {} ({} teams)",
                    time,
                    data.len()
                );
                Some(LeaderboardUpdate::Fresh { data })
            }
            LeaderboardFetch::Fresh { time, .. } => {
                debug!(
                    "Ignoring stale leaderboard response (time={}, watermark={})",
                    time, state.watermark
                );
                None
            }
            LeaderboardFetch::NoChange => Some(LeaderboardUpdate::Unchanged),
        }
    };

    if let Some(update) = update {
        listeners.notify(&update);
    }
}
