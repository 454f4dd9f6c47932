//! stake_accounting: delegation and staking-rewards accounting for a light wallet.
//!
//! Converts epochs and slots to wall-clock time across eras, reconstructs
//! dense reward histories from sparse ledgers with exact multi-token
//! arithmetic, classifies wallet addresses and detects mangled funds, and
//! tracks the delegation lifecycle with cached pool metadata.
//! Read-only; no seeds; no transaction signing.

pub mod address;
pub mod amount;
pub mod chain;
pub mod config;
pub mod delegation;
pub mod error;
pub mod rewards;
pub mod time;
pub mod verify;

pub use address::{
    classify_all, compute_mangled_summary, summarize_wallet, AddressInfo, AddressSubgroup,
    MangledAmountSummary, UnmangleParams, Utxo,
};
pub use amount::{shifted_decimal, MultiTokenAmount, TokenKey, TokenRegistry};
pub use chain::{Cache, FetchConfig, Fetcher, KoiosSource, LedgerState, LedgerSync};
pub use config::NetworkConfig;
pub use delegation::{DelegationStatus, DelegationTracker, PoolMeta, PoolMetaResolver};
pub use error::EngineError;
pub use rewards::{reconstruct, reconstruct_to_current, RewardHistory, RewardLedgerEntry};
pub use time::{EpochSlot, Era, EraTable};
pub use verify::{reproducibility_hash, verify_bundle, EvidenceBundle, VerificationResult};
