use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use tracing::warn;

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registry of subscriber callbacks, unique by subscription identity.
///
/// `notify` snapshots the callback list before invoking anything, so a
/// callback may subscribe or unsubscribe re-entrantly without deadlocking or
/// skipping unrelated listeners. The registry never removes a subscriber on
/// its own; lifetime is owned by the caller through [`Subscription`].
pub struct ListenerSet<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

struct Inner<T> {
    next_id: u64,
    listeners: HashMap<u64, Callback<T>>,
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        ListenerSet {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> ListenerSet<T> {
    pub fn new() -> Self {
        ListenerSet {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                listeners: HashMap::new(),
            })),
        }
    }

    /// Register a callback. Dropping the returned [`Subscription`] removes it.
    pub fn subscribe(&self, callback: Callback<T>) -> Subscription {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.insert(id, callback);
            id
        };

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().unwrap().listeners.remove(&id);
                }
            })),
        }
    }

    /// Invoke every registered callback with the payload. A callback that
    /// panics is isolated and logged; the remaining callbacks still run.
    pub fn notify(&self, payload: &T) {
        let callbacks: Vec<Callback<T>> = {
            let inner = self.inner.lock().unwrap();
            inner.listeners.values().cloned().collect()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                warn!("Subscriber callback panicked, continuing with the rest");
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().listeners.len()
    }
}

impl<T: Send + 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregistration handle returned by `subscribe`. Removes the callback on
/// drop; `unsubscribe` is the explicit spelling of the same thing.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_all_listeners() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let _s1 = set.subscribe(Arc::new(move |v: &u32| {
            assert_eq!(*v, 7);
            h1.fetch_add(1, Ordering::SeqCst);
        }));
        let h2 = Arc::clone(&hits);
        let _s2 = set.subscribe(Arc::new(move |_: &u32| {
            h2.fetch_add(1, Ordering::SeqCst);
        }));

        set.notify(&7);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let sub = set.subscribe(Arc::new(move |_: &u32| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(set.len(), 1);

        drop(sub);
        assert_eq!(set.len(), 0);
        set.notify(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let sub = set.subscribe(Arc::new(|_: &u32| {}));
        sub.unsubscribe();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = set.subscribe(Arc::new(|_: &u32| panic!("listener bug")));
        let h = Arc::clone(&hits);
        let _good = set.subscribe(Arc::new(move |_: &u32| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        set.notify(&1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_subscribe_during_notify() {
        let set: ListenerSet<u32> = ListenerSet::new();
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let set_clone = set.clone();
        let added_clone = Arc::clone(&added);
        let _s = set.subscribe(Arc::new(move |_: &u32| {
            let sub = set_clone.subscribe(Arc::new(|_: &u32| {}));
            added_clone.lock().unwrap().push(sub);
        }));

        // Must not deadlock; the newly added listener joins future passes.
        set.notify(&1);
        assert_eq!(set.len(), 2);
    }
}
