//! Sparse reward ledger as delivered by the sync layer.

use crate::amount::{AmountError, MultiTokenAmount};
use crate::time::Epoch;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reward paid for one epoch. Ledgers hold at most one entry per epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLedgerEntry {
    pub epoch: Epoch,
    pub amount: MultiTokenAmount,
    pub pool_hash: String,
}

/// Sort by epoch and merge duplicate epochs.
///
/// Backends are expected to deliver a strictly ascending ledger; anything else
/// is repaired here. Duplicates keep the first pool hash. A duplicate whose
/// default token disagrees is an error, as it would be anywhere else.
pub fn normalize_ledger(
    mut entries: Vec<RewardLedgerEntry>,
) -> Result<Vec<RewardLedgerEntry>, AmountError> {
    if entries.windows(2).all(|w| w[0].epoch < w[1].epoch) {
        return Ok(entries);
    }
    entries.sort_by_key(|e| e.epoch);
    let mut out: Vec<RewardLedgerEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match out.last_mut() {
            Some(last) if last.epoch == entry.epoch => {
                warn!(epoch = entry.epoch, "duplicate reward ledger epoch, merging");
                last.amount.checked_add_assign(&entry.amount)?;
            }
            _ => out.push(entry),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenKey;
    use num_bigint::BigInt;

    fn entry(epoch: u64, amount: u64, pool: &str) -> RewardLedgerEntry {
        RewardLedgerEntry {
            epoch,
            amount: MultiTokenAmount::from_default(TokenKey::primary(1), amount),
            pool_hash: pool.into(),
        }
    }

    #[test]
    fn sorted_input_untouched() {
        let l = vec![entry(1, 1, "a"), entry(4, 2, "a")];
        assert_eq!(normalize_ledger(l.clone()).unwrap(), l);
    }

    #[test]
    fn unsorted_input_sorted_and_merged() {
        let l = vec![entry(5, 1, "b"), entry(2, 3, "a"), entry(5, 4, "c")];
        let out = normalize_ledger(l).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].epoch, 2);
        assert_eq!(out[1].epoch, 5);
        assert_eq!(out[1].amount.default_amount(), BigInt::from(5));
        assert_eq!(out[1].pool_hash, "b");
    }

    #[test]
    fn duplicate_with_other_default_token_is_error() {
        let foreign = RewardLedgerEntry {
            epoch: 5,
            amount: MultiTokenAmount::from_default(TokenKey::primary(0), 7),
            pool_hash: "a".into(),
        };
        let err = normalize_ledger(vec![entry(5, 5, "a"), foreign]).unwrap_err();
        assert!(matches!(err, AmountError::IncompatibleDefaultToken { .. }));
    }
}
