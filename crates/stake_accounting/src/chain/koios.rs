//! Koios-backed implementations of the ledger and pool metadata sources.

use crate::amount::{MultiTokenAmount, TokenKey};
use crate::chain::fetch::{
    FetchError, Fetcher, KoiosAccountInfo, KoiosPoolInfo, KoiosRewardRow,
};
use crate::chain::source::{PoolMetaSource, RewardLedgerSource, SourceError};
use crate::delegation::{DelegationStatus, PoolMeta};
use crate::rewards::RewardLedgerEntry;
use futures::future::BoxFuture;
use futures::FutureExt;
use num_bigint::{BigInt, Sign};
use std::sync::Arc;
use tracing::debug;

impl From<FetchError> for SourceError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Parse { .. } => SourceError::Malformed(e.to_string()),
            other => SourceError::Unavailable(other.to_string()),
        }
    }
}

/// Reward rows keyed by the epoch the reward was earned in. Rows without a
/// pool (treasury, reserves) carry an empty pool hash. Rewards only ever add
/// to a balance, so a zero or negative amount is malformed.
pub fn rewards_to_ledger(
    rows: &[KoiosRewardRow],
    default_token: &TokenKey,
) -> Result<Vec<RewardLedgerEntry>, SourceError> {
    rows.iter()
        .map(|row| {
            let malformed = || {
                SourceError::Malformed(format!(
                    "reward amount {:?} at epoch {}",
                    row.amount, row.earned_epoch
                ))
            };
            let amount: BigInt = row.amount.parse().map_err(|_| malformed())?;
            if amount.sign() != Sign::Plus {
                return Err(malformed());
            }
            Ok(RewardLedgerEntry {
                epoch: row.earned_epoch,
                amount: MultiTokenAmount::from_default(default_token.clone(), amount),
                pool_hash: row.pool_id.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// `None` when the pool publishes no usable metadata.
pub fn pool_info_to_meta(info: &KoiosPoolInfo) -> Option<PoolMeta> {
    let meta = info.meta_json.as_ref()?;
    if meta.name.is_none() && meta.ticker.is_none() {
        return None;
    }
    Some(PoolMeta {
        pool_hash: info.pool_id_bech32.clone(),
        name: meta.name.clone(),
        ticker: meta.ticker.clone(),
        homepage: meta.homepage.clone(),
    })
}

/// Settled status from an account snapshot. A snapshot cannot tell a
/// never-registered key from a deregistered one; both read as unregistered.
pub fn account_status(info: Option<&KoiosAccountInfo>) -> DelegationStatus {
    match info {
        Some(a) if a.is_registered() => match &a.delegated_pool {
            Some(pool) => DelegationStatus::Delegated { pool: pool.clone() },
            None => DelegationStatus::Registered,
        },
        _ => DelegationStatus::Unregistered,
    }
}

/// Both engine sources over one shared fetcher. Wallet ids are stake addresses.
#[derive(Clone)]
pub struct KoiosSource {
    fetcher: Arc<Fetcher>,
    default_token: TokenKey,
}

impl KoiosSource {
    pub fn new(fetcher: Arc<Fetcher>, default_token: TokenKey) -> Self {
        Self {
            fetcher,
            default_token,
        }
    }

    pub fn network_id(&self) -> u32 {
        self.default_token.network_id
    }
}

impl RewardLedgerSource for KoiosSource {
    fn fetch_reward_ledger(
        &self,
        wallet_id: &str,
    ) -> BoxFuture<'static, Result<Vec<RewardLedgerEntry>, SourceError>> {
        let fetcher = self.fetcher.clone();
        let token = self.default_token.clone();
        let stake = wallet_id.to_string();
        async move {
            let rows = fetcher.account_rewards(&stake).await?;
            rewards_to_ledger(&rows, &token)
        }
        .boxed()
    }
}

impl PoolMetaSource for KoiosSource {
    fn fetch_pool_meta(
        &self,
        network_id: u32,
        pool_hash: &str,
    ) -> BoxFuture<'static, Result<Option<PoolMeta>, SourceError>> {
        let fetcher = self.fetcher.clone();
        let own_network = self.network_id();
        let pool = pool_hash.to_string();
        async move {
            if network_id != own_network {
                return Err(SourceError::Unavailable(format!(
                    "no backend for network {network_id}"
                )));
            }
            let infos = fetcher.pool_info(std::slice::from_ref(&pool)).await?;
            let meta = infos
                .iter()
                .find(|i| i.pool_id_bech32 == pool || i.pool_id_hex.as_deref() == Some(&pool))
                .and_then(pool_info_to_meta);
            debug!(pool = %pool, found = meta.is_some(), "pool metadata");
            Ok(meta)
        }
        .boxed()
    }
}
