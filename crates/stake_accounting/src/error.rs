//! Top-level error with stable localization keys.

use crate::address::AddressError;
use crate::amount::AmountError;
use crate::chain::{CacheError, FetchError, SourceError};
use crate::config::ConfigError;
use crate::delegation::DelegationError;
use crate::time::{NormalizeError, TimeError};
use crate::verify::VerifyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Delegation(#[from] DelegationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl EngineError {
    /// Key for the UI's message catalogue. Stable across releases.
    pub fn message_id(&self) -> &'static str {
        match self {
            EngineError::Time(e) | EngineError::Normalize(NormalizeError::Time(e)) => match e {
                TimeError::MalformedEraTable(_) => "error.config.malformedEraTable",
                TimeError::SlotOutOfRange { .. } => "error.time.slotOutOfRange",
                TimeError::BeforeGenesis(_) => "error.time.beforeGenesis",
                TimeError::Overflow => "error.time.overflow",
            },
            EngineError::Normalize(_) => "error.input.invalidEpochSlotOrTime",
            EngineError::Amount(e) => match e {
                AmountError::IncompatibleDefaultToken { .. } => {
                    "error.amount.incompatibleDefaultToken"
                }
                AmountError::MissingDefaultToken(_) => "error.config.missingDefaultToken",
                AmountError::InvalidAmount(_) => "error.amount.invalid",
            },
            EngineError::Address(e) => match e {
                AddressError::InvalidPath(_) => "error.address.invalidPath",
                _ => "error.address.invalid",
            },
            EngineError::Delegation(e) => match e {
                DelegationError::AlreadyPending => "error.delegation.alreadyPending",
                DelegationError::NotRegistered => "error.delegation.notRegistered",
                DelegationError::AlreadyDelegatedTo(_) => "error.delegation.alreadyDelegated",
                DelegationError::NothingPending => "error.delegation.nothingPending",
            },
            EngineError::Config(e) => match e {
                ConfigError::Time(TimeError::MalformedEraTable(_)) => {
                    "error.config.malformedEraTable"
                }
                ConfigError::NetworkMismatch { .. } => "error.config.networkMismatch",
                _ => "error.config.unreadable",
            },
            EngineError::Cache(_) => "error.storage.cache",
            EngineError::Fetch(FetchError::OfflineMiss) => "error.network.offline",
            EngineError::Fetch(_) | EngineError::Source(SourceError::Unavailable(_)) => {
                "error.network.unavailable"
            }
            EngineError::Source(SourceError::Malformed(_)) => "error.network.malformedResponse",
            EngineError::Verify(_) => "error.verify.failed",
        }
    }

    /// Configuration errors stop the engine; everything else is per-request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::Time(TimeError::MalformedEraTable(_))
                | EngineError::Amount(AmountError::MissingDefaultToken(_))
        )
    }
}
