//! Per-wallet reward ledger state with coalesced refreshes and a stale-result guard.

use crate::chain::inflight::Coalescer;
use crate::chain::source::{RewardLedgerSource, SourceError};
use crate::rewards::{normalize_ledger, RewardLedgerEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerState {
    /// Not fetched yet.
    Pending,
    Ready(Vec<RewardLedgerEntry>),
    Failed(String),
}

type FetchResult = Result<Vec<RewardLedgerEntry>, SourceError>;

/// A fetch outcome tagged with the generation it was started under.
type TaggedFetch = (u64, FetchResult);

struct SyncInner<S> {
    source: S,
    generation: AtomicU64,
    active_wallet: Mutex<Option<String>>,
    states: Mutex<HashMap<String, LedgerState>>,
    in_flight: Coalescer<String, TaggedFetch>,
}

/// Reward ledgers for any number of wallets. Each wallet's state is
/// independent: one wallet's failure leaves the others untouched.
pub struct LedgerSync<S> {
    inner: Arc<SyncInner<S>>,
}

impl<S: RewardLedgerSource + 'static> LedgerSync<S> {
    pub fn new(source: S) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                source,
                generation: AtomicU64::new(0),
                active_wallet: Mutex::new(None),
                states: Mutex::new(HashMap::new()),
                in_flight: Coalescer::new(),
            }),
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn active_wallet(&self) -> Option<String> {
        self.inner
            .active_wallet
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch the active wallet. Results of fetches started under the previous
    /// generation are discarded when they complete.
    pub fn set_active_wallet(&self, wallet_id: &str) -> u64 {
        let mut active = self
            .inner
            .active_wallet
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if active.as_deref() == Some(wallet_id) {
            return self.generation();
        }
        *active = Some(wallet_id.to_string());
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(wallet = wallet_id, generation, "active wallet changed");
        generation
    }

    pub fn state(&self, wallet_id: &str) -> LedgerState {
        self.inner
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wallet_id)
            .cloned()
            .unwrap_or(LedgerState::Pending)
    }

    pub fn is_refreshing(&self, wallet_id: &str) -> bool {
        self.inner.in_flight.is_in_flight(&wallet_id.to_string())
    }

    /// Fetch the wallet's ledger, joining an in-flight fetch for the same
    /// wallet. A failure keeps previously fetched data. The result is dropped
    /// when the generation changed after the fetch started, even for callers
    /// that joined it later.
    pub async fn refresh(&self, wallet_id: &str) -> LedgerState {
        let weak: Weak<SyncInner<S>> = Arc::downgrade(&self.inner);
        let key = wallet_id.to_string();
        let fetch = {
            let key = key.clone();
            let inner = &self.inner;
            move || {
                let started_under = inner.generation.load(Ordering::SeqCst);
                let fut = inner.source.fetch_reward_ledger(&key);
                async move {
                    let result = fut.await;
                    if let Some(inner) = weak.upgrade() {
                        inner.in_flight.finish(&key);
                    }
                    (started_under, result)
                }
            }
        };
        let (task, started) = self.inner.in_flight.join_or_start(key.clone(), fetch);
        if !started {
            debug!(wallet = wallet_id, "joining in-flight ledger fetch");
        }
        let (started_under, result) = task.await;

        if self.generation() != started_under {
            debug!(
                wallet = wallet_id,
                generation = started_under,
                "discarding stale ledger result"
            );
            return self.state(wallet_id);
        }
        let result = result
            .map_err(|e| e.to_string())
            .and_then(|entries| normalize_ledger(entries).map_err(|e| e.to_string()));
        let mut states = self
            .inner
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let next = match result {
            Ok(entries) => LedgerState::Ready(entries),
            Err(e) => match states.get(&key) {
                Some(ready @ LedgerState::Ready(_)) => {
                    warn!(wallet = wallet_id, error = %e, "ledger refresh failed, keeping previous data");
                    ready.clone()
                }
                _ => {
                    warn!(wallet = wallet_id, error = %e, "ledger fetch failed");
                    LedgerState::Failed(e)
                }
            },
        };
        states.insert(key, next.clone());
        next
    }
}
