//! Chain data fetching, caching, request coalescing and per-wallet ledger sync.

mod cache;
pub(crate) mod fetch;
pub(crate) mod inflight;
mod koios;
pub(crate) mod source;
mod sync;

pub use cache::{Cache, CacheError, CachedResponse};
pub use fetch::{
    FetchConfig, FetchError, Fetcher, KoiosAccountInfo, KoiosAccountRewards, KoiosPoolInfo,
    KoiosPoolMetaJson, KoiosRewardRow, KoiosTip,
    DEFAULT_KOIOS_URL,
};
pub use inflight::{Coalescer, SharedTask};
pub use koios::{account_status, pool_info_to_meta, rewards_to_ledger, KoiosSource};
pub use source::{PoolMetaSource, RewardLedgerSource, SourceError};
pub use sync::{LedgerState, LedgerSync};
