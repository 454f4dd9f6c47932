//! In-flight request coalescing keyed by request identity.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

pub type SharedTask<V> = Shared<BoxFuture<'static, V>>;

/// Map of requests currently in flight. A second request for a key joins the
/// first one's future instead of starting its own.
pub struct Coalescer<K, V: Clone> {
    in_flight: Mutex<HashMap<K, SharedTask<V>>>,
}

impl<K, V: Clone> Default for Coalescer<K, V> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the task for `key`, or start one with `start`. The flag is true
    /// when this call started it. Tasks must call [`Coalescer::finish`] when done.
    pub fn join_or_start<F, Fut>(&self, key: K, start: F) -> (SharedTask<V>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = map.get(&key) {
            return (task.clone(), false);
        }
        let task = start().boxed().shared();
        map.insert(key, task.clone());
        (task, true)
    }

    pub fn finish(&self, key: &K) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn second_request_joins_first() {
        let c: Arc<Coalescer<&'static str, u32>> = Arc::new(Coalescer::new());
        let starts = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        let s = starts.clone();
        let c2 = c.clone();
        let (a, started_a) = c.join_or_start("k", move || {
            s.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = gate_rx.await;
                c2.finish(&"k");
                7
            }
        });
        let s = starts.clone();
        let (b, started_b) = c.join_or_start("k", move || {
            s.fetch_add(1, Ordering::SeqCst);
            async { 99 }
        });
        assert!(started_a);
        assert!(!started_b);
        assert_eq!(c.len(), 1);

        let _ = gate_tx.send(());
        assert_eq!(a.await, 7);
        assert_eq!(b.await, 7);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(!c.is_in_flight(&"k"));
    }

    #[tokio::test]
    async fn distinct_keys_run_separately() {
        let c: Coalescer<u8, u8> = Coalescer::new();
        let (a, _) = c.join_or_start(1, || async { 1 });
        let (b, _) = c.join_or_start(2, || async { 2 });
        assert_eq!(c.len(), 2);
        assert_eq!(a.await + b.await, 3);
    }
}
