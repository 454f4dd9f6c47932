//! Partition of mangled-address balances into reclaimable and stuck funds.
//!
//! A reclaim (unmangle) transaction is a self-send that spends only
//! mangled-address UTxOs, paying its fee from those same funds and leaving a
//! change output of at least the minimum UTxO value.

use crate::amount::{AmountError, MultiTokenAmount, TokenKey};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    /// Hex address.
    pub address: String,
    pub amount: MultiTokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangledAmountSummary {
    pub can_unmangle: MultiTokenAmount,
    pub cannot_unmangle: MultiTokenAmount,
}

impl MangledAmountSummary {
    pub fn zero(default_token: &TokenKey) -> Self {
        Self {
            can_unmangle: MultiTokenAmount::new(default_token.clone()),
            cannot_unmangle: MultiTokenAmount::new(default_token.clone()),
        }
    }

    pub fn total(&self) -> Result<MultiTokenAmount, AmountError> {
        self.can_unmangle.add(&self.cannot_unmangle)
    }
}

/// Reclaim parameters: dust threshold and fee estimate, in the default token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmangleParams {
    #[serde(with = "crate::amount::big_int_str")]
    pub min_utxo_value: BigInt,
    #[serde(with = "crate::amount::big_int_str")]
    pub estimated_fee: BigInt,
}

fn on_mangled<'a>(
    utxos: &'a [Utxo],
    mangled: &'a BTreeSet<String>,
) -> impl Iterator<Item = &'a Utxo> + 'a {
    utxos
        .iter()
        .filter(move |u| mangled.contains(&u.address.trim().to_lowercase()))
}

/// Split mangled UTxOs into (reclaimable, stuck).
///
/// UTxOs below `min_utxo_value` are dust and never reclaimable. The rest are
/// reclaimable together only if their total covers the fee plus one
/// minimum-value change output.
fn partition<'a>(
    utxos: &'a [Utxo],
    mangled: &'a BTreeSet<String>,
    min_utxo_value: &BigInt,
    estimated_fee: &BigInt,
) -> (Vec<&'a Utxo>, Vec<&'a Utxo>) {
    let (eligible, mut stuck): (Vec<&Utxo>, Vec<&Utxo>) =
        on_mangled(utxos, mangled).partition(|u| u.amount.default_amount() >= *min_utxo_value);
    let available: BigInt = eligible.iter().map(|u| u.amount.default_amount()).sum();
    if available >= estimated_fee + min_utxo_value {
        (eligible, stuck)
    } else {
        stuck.extend(eligible);
        (Vec::new(), stuck)
    }
}

pub fn compute_mangled_summary(
    utxos: &[Utxo],
    mangled: &BTreeSet<String>,
    min_utxo_value: &BigInt,
    estimated_fee: &BigInt,
    default_token: &TokenKey,
) -> Result<MangledAmountSummary, AmountError> {
    if mangled.is_empty() {
        return Ok(MangledAmountSummary::zero(default_token));
    }
    let (can, cannot) = partition(utxos, mangled, min_utxo_value, estimated_fee);
    let summary = MangledAmountSummary {
        can_unmangle: MultiTokenAmount::try_sum(default_token.clone(), can.iter().map(|u| &u.amount))?,
        cannot_unmangle: MultiTokenAmount::try_sum(
            default_token.clone(),
            cannot.iter().map(|u| &u.amount),
        )?,
    };
    debug!(
        reclaimable = can.len(),
        stuck = cannot.len(),
        "computed mangled summary"
    );
    Ok(summary)
}

/// Inputs an unmangle transaction would spend; empty when nothing is reclaimable.
pub fn unmangle_inputs<'a>(
    utxos: &'a [Utxo],
    mangled: &'a BTreeSet<String>,
    params: &UnmangleParams,
) -> Vec<&'a Utxo> {
    partition(utxos, mangled, &params.min_utxo_value, &params.estimated_fee).0
}
