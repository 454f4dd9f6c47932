//! Delegation lifecycle tracking and pool metadata resolution.

mod pool_meta;
mod status;

pub use pool_meta::{short_hash, PoolMeta, PoolMetaResolver};
pub use status::{
    Certificate, DelegationError, DelegationStatus, DelegationTracker, ObservedCertificate,
    PendingTarget, PoolId,
};
