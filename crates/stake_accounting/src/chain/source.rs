//! Boundaries to the external fetch layer.

use crate::delegation::PoolMeta;
use crate::rewards::RewardLedgerEntry;
use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed source data: {0}")]
    Malformed(String),
}

/// Supplies a wallet's reward ledger. The engine never retries; implementors may.
pub trait RewardLedgerSource: Send + Sync {
    fn fetch_reward_ledger(
        &self,
        wallet_id: &str,
    ) -> BoxFuture<'static, Result<Vec<RewardLedgerEntry>, SourceError>>;
}

/// Supplies pool metadata. `Ok(None)` means the pool publishes none.
pub trait PoolMetaSource: Send + Sync {
    fn fetch_pool_meta(
        &self,
        network_id: u32,
        pool_hash: &str,
    ) -> BoxFuture<'static, Result<Option<PoolMeta>, SourceError>>;
}
