//! Dense reward series from a sparse ledger.

use crate::amount::{AmountError, MultiTokenAmount, TokenKey};
use crate::rewards::ledger::{normalize_ledger, RewardLedgerEntry};
use crate::time::Epoch;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

/// One epoch of the reconstructed series.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSeriesPoint {
    pub epoch: Epoch,
    pub cumulative_amount: MultiTokenAmount,
    pub delta_amount: MultiTokenAmount,
    /// Empty for epochs without a reward.
    pub pool_label: String,
}

/// Chart-ready projection of a series point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub epoch: Epoch,
    pub amount: MultiTokenAmount,
    pub pool_label: String,
}

/// Reward history over `[start_epoch, end_epoch)`, one point per epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardHistory {
    pub start_epoch: Epoch,
    pub end_epoch: Epoch,
    pub default_token: TokenKey,
    pub points: Vec<RewardSeriesPoint>,
}

impl RewardHistory {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cumulative amount at the last epoch of the window.
    pub fn total(&self) -> MultiTokenAmount {
        self.points
            .last()
            .map(|p| p.cumulative_amount.clone())
            .unwrap_or_else(|| MultiTokenAmount::new(self.default_token.clone()))
    }

    /// Running total per epoch.
    pub fn total_rewards(&self) -> Vec<ChartPoint> {
        self.points
            .iter()
            .map(|p| ChartPoint {
                epoch: p.epoch,
                amount: p.cumulative_amount.clone(),
                pool_label: p.pool_label.clone(),
            })
            .collect()
    }

    /// Reward paid in each epoch.
    pub fn per_epoch_rewards(&self) -> Vec<ChartPoint> {
        self.points
            .iter()
            .map(|p| ChartPoint {
                epoch: p.epoch,
                amount: p.delta_amount.clone(),
                pool_label: p.pool_label.clone(),
            })
            .collect()
    }
}

/// Upper bound on the up-front allocation; longer windows grow as they fill.
const MAX_PREALLOCATED_POINTS: usize = 4096;

fn capacity_hint(start_epoch: Epoch, end_epoch: Epoch) -> usize {
    usize::try_from(end_epoch.saturating_sub(start_epoch))
        .unwrap_or(usize::MAX)
        .min(MAX_PREALLOCATED_POINTS)
}

fn strictly_ascending(ledger: &[RewardLedgerEntry]) -> bool {
    ledger.windows(2).all(|w| w[0].epoch < w[1].epoch)
}

/// Walk the ledger with a cursor and emit one point per epoch in
/// `[start_epoch, end_epoch)`. Epochs without a ledger entry carry the
/// cumulative amount forward with a zero delta and no pool label. Entries
/// outside the window are ignored.
pub fn reconstruct(
    ledger: &[RewardLedgerEntry],
    start_epoch: Epoch,
    end_epoch: Epoch,
    default_token: &TokenKey,
    resolver: impl Fn(&str) -> String,
) -> Result<RewardHistory, AmountError> {
    let ledger: Cow<'_, [RewardLedgerEntry]> = if strictly_ascending(ledger) {
        Cow::Borrowed(ledger)
    } else {
        Cow::Owned(normalize_ledger(ledger.to_vec())?)
    };

    let mut points = Vec::with_capacity(capacity_hint(start_epoch, end_epoch));
    let mut cursor = ledger.partition_point(|e| e.epoch < start_epoch);
    let mut cumulative = MultiTokenAmount::new(default_token.clone());
    let zero = MultiTokenAmount::new(default_token.clone());

    for epoch in start_epoch..end_epoch {
        match ledger.get(cursor) {
            Some(entry) if entry.epoch == epoch => {
                cumulative.checked_add_assign(&entry.amount)?;
                points.push(RewardSeriesPoint {
                    epoch,
                    cumulative_amount: cumulative.clone(),
                    delta_amount: entry.amount.clone(),
                    pool_label: resolver(&entry.pool_hash),
                });
                cursor += 1;
            }
            _ => points.push(RewardSeriesPoint {
                epoch,
                cumulative_amount: cumulative.clone(),
                delta_amount: zero.clone(),
                pool_label: String::new(),
            }),
        }
    }
    debug!(
        start_epoch,
        end_epoch,
        ledger_len = ledger.len(),
        "reconstructed reward history"
    );
    Ok(RewardHistory {
        start_epoch,
        end_epoch: end_epoch.max(start_epoch),
        default_token: default_token.clone(),
        points,
    })
}

/// History from the first rewarded epoch through `current_epoch` inclusive.
pub fn reconstruct_to_current(
    ledger: &[RewardLedgerEntry],
    current_epoch: Epoch,
    default_token: &TokenKey,
    resolver: impl Fn(&str) -> String,
) -> Result<RewardHistory, AmountError> {
    let first = ledger.iter().map(|e| e.epoch).min();
    let (start, end) = match first {
        Some(first) => (first.min(current_epoch), current_epoch.saturating_add(1)),
        None => (current_epoch, current_epoch),
    };
    reconstruct(ledger, start, end, default_token, resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;
    use num_traits::Zero;

    fn ada() -> TokenKey {
        TokenKey::primary(1)
    }

    fn entry(epoch: u64, amount: u64, pool: &str) -> RewardLedgerEntry {
        RewardLedgerEntry {
            epoch,
            amount: MultiTokenAmount::from_default(ada(), amount),
            pool_hash: pool.into(),
        }
    }

    fn label(hash: &str) -> String {
        hash.to_string()
    }

    fn example_ledger() -> Vec<RewardLedgerEntry> {
        vec![entry(10, 5_000_000, "P1"), entry(13, 3_000_000, "P1")]
    }

    fn triples(points: &[ChartPoint]) -> Vec<(u64, BigInt, String)> {
        points
            .iter()
            .map(|p| (p.epoch, p.amount.default_amount(), p.pool_label.clone()))
            .collect()
    }

    #[test]
    fn worked_example() {
        let h = reconstruct(&example_ledger(), 10, 14, &ada(), label).unwrap();
        let t = |e: u64, a: u64, l: &str| (e, BigInt::from(a), l.to_string());
        assert_eq!(
            triples(&h.total_rewards()),
            vec![
                t(10, 5_000_000, "P1"),
                t(11, 5_000_000, ""),
                t(12, 5_000_000, ""),
                t(13, 8_000_000, "P1"),
            ]
        );
        assert_eq!(
            triples(&h.per_epoch_rewards()),
            vec![
                t(10, 5_000_000, "P1"),
                t(11, 0, ""),
                t(12, 0, ""),
                t(13, 3_000_000, "P1"),
            ]
        );
        assert_eq!(h.total().default_amount(), BigInt::from(8_000_000));
    }

    #[test]
    fn density_for_any_window() {
        let ledger = example_ledger();
        for start in 0..16u64 {
            for end in start..18u64 {
                let h = reconstruct(&ledger, start, end, &ada(), label).unwrap();
                assert_eq!(h.len() as u64, end - start);
            }
        }
    }

    #[test]
    fn inverted_window_is_empty() {
        let h = reconstruct(&example_ledger(), 14, 10, &ada(), label).unwrap();
        assert!(h.is_empty());
        assert!(h.total().is_empty());
    }

    #[test]
    fn monotonic_and_carry_forward() {
        let ledger = vec![
            entry(2, 1, "A"),
            entry(3, 7, "B"),
            entry(9, 2, "A"),
            entry(11, 40, "C"),
        ];
        let h = reconstruct(&ledger, 0, 15, &ada(), label).unwrap();
        for w in h.points.windows(2) {
            assert!(w[1].cumulative_amount.default_amount() >= w[0].cumulative_amount.default_amount());
            if !ledger.iter().any(|e| e.epoch == w[1].epoch) {
                assert!(w[1].delta_amount.default_amount().is_zero());
                assert_eq!(w[1].cumulative_amount, w[0].cumulative_amount);
                assert!(w[1].pool_label.is_empty());
            }
        }
    }

    #[test]
    fn entries_outside_window_ignored() {
        let ledger = vec![entry(1, 100, "X"), entry(5, 3, "Y"), entry(20, 100, "Z")];
        let h = reconstruct(&ledger, 4, 8, &ada(), label).unwrap();
        assert_eq!(h.len(), 4);
        assert_eq!(h.total().default_amount(), BigInt::from(3));
        assert_eq!(h.points[1].pool_label, "Y");
    }

    #[test]
    fn idempotent_byte_identical() {
        let a = reconstruct(&example_ledger(), 8, 20, &ada(), label).unwrap();
        let b = reconstruct(&example_ledger(), 8, 20, &ada(), label).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn unsorted_ledger_is_sorted_first() {
        let mut ledger = example_ledger();
        ledger.reverse();
        let h = reconstruct(&ledger, 10, 14, &ada(), label).unwrap();
        assert_eq!(h, reconstruct(&example_ledger(), 10, 14, &ada(), label).unwrap());
    }

    #[test]
    fn mismatched_default_token_is_error() {
        let ledger = vec![RewardLedgerEntry {
            epoch: 3,
            amount: MultiTokenAmount::from_default(TokenKey::primary(0), 5),
            pool_hash: "P".into(),
        }];
        let err = reconstruct(&ledger, 0, 5, &ada(), label).unwrap_err();
        assert!(matches!(err, AmountError::IncompatibleDefaultToken { .. }));
    }

    #[test]
    fn duplicate_epoch_with_other_default_token_is_error() {
        let ledger = vec![
            entry(5, 5, "P"),
            RewardLedgerEntry {
                epoch: 5,
                amount: MultiTokenAmount::from_default(TokenKey::primary(0), 7),
                pool_hash: "P".into(),
            },
        ];
        let err = reconstruct(&ledger, 0, 10, &ada(), label).unwrap_err();
        assert!(matches!(err, AmountError::IncompatibleDefaultToken { .. }));
    }

    #[test]
    fn huge_window_allocates_bounded_hint() {
        assert_eq!(capacity_hint(0, u64::MAX), MAX_PREALLOCATED_POINTS);
        assert_eq!(capacity_hint(10, 14), 4);
        assert_eq!(capacity_hint(14, 10), 0);
        let h = reconstruct(&example_ledger(), u64::MAX - 2, u64::MAX, &ada(), label).unwrap();
        assert_eq!(h.len(), 2);
        assert!(h.total().is_empty());
    }

    #[test]
    fn to_current_window() {
        let h = reconstruct_to_current(&example_ledger(), 15, &ada(), label).unwrap();
        assert_eq!(h.start_epoch, 10);
        assert_eq!(h.end_epoch, 16);
        assert_eq!(h.len(), 6);
        let empty = reconstruct_to_current(&[], 15, &ada(), label).unwrap();
        assert!(empty.is_empty());
    }
}
