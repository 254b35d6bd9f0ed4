//! Adaptive-delay notification poller.
//!
//! There is no fixed period: each cycle fetches, applies or skips, then arms
//! a single-shot sleep whose length depends on the outcome. A delivered
//! notification backs off to the busy delay; an empty or failed cycle polls
//! again sooner.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::listeners::{Callback, ListenerSet, Subscription};
use crate::api::PortalSource;

/// Delay table for the adaptive poller.
#[derive(Debug, Clone, Copy)]
pub struct NotificationDelays {
    /// Armed after a cycle that delivered a notification.
    pub busy: Duration,
    /// Armed after an empty (204) or failed cycle: poll faster while idle.
    pub idle: Duration,
}

impl Default for NotificationDelays {
    fn default() -> Self {
        NotificationDelays {
            busy: Duration::from_millis(1000),
            idle: Duration::from_millis(500),
        }
    }
}

pub struct NotificationSync {
    source: Arc<dyn PortalSource>,
    delays: NotificationDelays,
    listeners: ListenerSet<Option<serde_json::Value>>,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    /// Same staleness gate as the leaderboard loop: bumped on start/stop.
    generation: u64,
    task: Option<JoinHandle<()>>,
    payload: Option<serde_json::Value>,
}

impl NotificationSync {
    pub fn new(source: Arc<dyn PortalSource>, delays: NotificationDelays) -> Self {
        NotificationSync {
            source,
            delays,
            listeners: ListenerSet::new(),
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                task: None,
                payload: None,
            })),
        }
    }

    /// Begin polling. Idempotent. Fetches immediately, then self-reschedules
    /// with the outcome-dependent delay.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.task.is_some() {
            return;
        }
        inner.generation += 1;
        let generation = inner.generation;

        let source = Arc::clone(&self.source);
        let listeners = self.listeners.clone();
        let shared = Arc::clone(&self.inner);
        let delays = self.delays;

        inner.task = Some(tokio::spawn(async move {
            info!(
                "Notification sync started (source={}, busy={:?}, idle={:?})",
                source.name(),
                delays.busy,
                delays.idle
            );
            loop {
                let outcome = source.fetch_notification().await;

                let (delay, update) = {
                    let mut state = shared.lock().unwrap();
                    if state.generation != generation {
                        break;
                    }
                    match outcome {
                        Ok(Some(payload)) => {
                            state.payload = Some(payload.clone());
                            (delays.busy, Some(payload))
                        }
                        Ok(None) => (delays.idle, None),
                        Err(e) => {
                            warn!("Notification fetch failed: {}", e);
                            (delays.idle, None)
                        }
                    }
                };

                if let Some(payload) = update {
                    info!("Notification received");
                    listeners.notify(&Some(payload));
                }

                tokio::time::sleep(delay).await;
            }
        }));
    }

    /// Stop polling. Idempotent. Aborting the task cancels the armed
    /// single-shot sleep; the generation bump drops any in-flight result.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.task.take() {
            inner.generation += 1;
            task.abort();
            info!("Notification sync stopped");
        }
    }

    /// Register a listener and synchronously hand it whatever payload is
    /// currently held (possibly none) before returning.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Option<serde_json::Value>) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Callback<Option<serde_json::Value>> = Arc::new(listener);
        let subscription = self.listeners.subscribe(Arc::clone(&callback));
        let current = self.inner.lock().unwrap().payload.clone();
        callback(&current);
        subscription
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().task.is_some()
    }
}

impl Drop for NotificationSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, LeaderboardFetch};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Option<Value>, ApiError>>>,
        fetches: mpsc::UnboundedSender<Instant>,
    }

    impl ScriptedSource {
        fn new(
            responses: Vec<Result<Option<Value>, ApiError>>,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<Instant>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let source = Arc::new(ScriptedSource {
                responses: Mutex::new(responses.into()),
                fetches: tx,
            });
            (source, rx)
        }
    }

    #[async_trait]
    impl PortalSource for ScriptedSource {
        async fn fetch_leaderboard(
            &self,
            _since: Option<i64>,
        ) -> Result<LeaderboardFetch, ApiError> {
            Ok(LeaderboardFetch::NoChange)
        }

        async fn fetch_notification(&self) -> Result<Option<Value>, ApiError> {
            let _ = self.fetches.send(Instant::now());
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(response) => response,
                None => std::future::pending().await,
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn collecting_listener(
        sync: &NotificationSync,
    ) -> (Arc<Mutex<Vec<Option<Value>>>>, Subscription) {
        let seen: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = sync.subscribe(move |payload| sink.lock().unwrap().push(payload.clone()));
        (seen, sub)
    }

    #[tokio::test(start_paused = true)]
    async fn test_adaptive_delay_table() {
        let (source, mut fetches) = ScriptedSource::new(vec![
            Ok(Some(json!({ "title": "Round 2 open" }))),
            Ok(None),
            Err(ApiError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
            Ok(Some(json!({ "title": "Hint released" }))),
        ]);
        let sync = NotificationSync::new(source, NotificationDelays::default());

        sync.start();
        let t0 = fetches.recv().await.unwrap();
        let t1 = fetches.recv().await.unwrap();
        let t2 = fetches.recv().await.unwrap();
        let t3 = fetches.recv().await.unwrap();

        assert_eq!(t1 - t0, Duration::from_millis(1000), "payload delivered: busy delay");
        assert_eq!(t2 - t1, Duration::from_millis(500), "204: idle delay");
        assert_eq!(t3 - t2, Duration::from_millis(500), "error: idle delay");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (source, mut fetches) = ScriptedSource::new(vec![Ok(None), Ok(None)]);
        let sync = NotificationSync::new(source, NotificationDelays::default());

        sync.start();
        sync.start();

        let t0 = fetches.recv().await.unwrap();
        let t1 = fetches.recv().await.unwrap();
        assert_eq!(
            t1 - t0,
            Duration::from_millis(500),
            "a duplicate start would fetch twice at t0"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_payload_reaches_subscribers() {
        let payload = json!({ "title": "Round 2 open" });
        let (source, mut fetches) = ScriptedSource::new(vec![Ok(Some(payload.clone()))]);
        let sync = NotificationSync::new(source, NotificationDelays::default());
        let (seen, _sub) = collecting_listener(&sync);

        sync.start();
        // Second fetch pends; once observed, the first cycle has applied.
        fetches.recv().await.unwrap();
        fetches.recv().await.unwrap();

        let updates = seen.lock().unwrap().clone();
        assert_eq!(updates, vec![None, Some(payload.clone())]);

        // A late subscriber replays the held payload immediately.
        let (late, _late_sub) = collecting_listener(&sync);
        assert_eq!(late.lock().unwrap().clone(), vec![Some(payload)]);
    }

    #[tokio::test]
    async fn test_subscribe_replays_none_before_first_cycle() {
        let (source, _fetches) = ScriptedSource::new(vec![]);
        let sync = NotificationSync::new(source, NotificationDelays::default());
        let (seen, _sub) = collecting_listener(&sync);
        assert_eq!(seen.lock().unwrap().clone(), vec![None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_armed_timer() {
        let (source, mut fetches) = ScriptedSource::new(vec![Ok(None), Ok(None)]);
        let sync = NotificationSync::new(source, NotificationDelays::default());

        sync.start();
        fetches.recv().await.unwrap();
        sync.stop();
        assert!(!sync.is_running());

        // The next cycle was armed inside the previous one; stopping must
        // cancel it, not merely decline to arm another.
        let next = tokio::time::timeout(Duration::from_secs(5), fetches.recv()).await;
        assert!(next.is_err(), "no fetch may fire after stop()");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_start_resumes_polling() {
        let (source, mut fetches) = ScriptedSource::new(vec![Ok(None), Ok(None)]);
        let sync = NotificationSync::new(source, NotificationDelays::default());

        sync.start();
        fetches.recv().await.unwrap();
        sync.stop();
        sync.start();
        fetches.recv().await.unwrap();
        assert!(sync.is_running());
    }
}
