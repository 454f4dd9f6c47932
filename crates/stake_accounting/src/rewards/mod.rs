//! Reward ledger normalization and dense history reconstruction.

mod history;
mod ledger;

pub use history::{reconstruct, reconstruct_to_current, ChartPoint, RewardHistory, RewardSeriesPoint};
pub use ledger::{normalize_ledger, RewardLedgerEntry};
