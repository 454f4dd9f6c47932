//! Evidence bundle for a reward history and its SHA-256 reproducibility hash.

use crate::address::MangledAmountSummary;
use crate::amount::{AmountError, TokenKey};
use crate::delegation::{short_hash, DelegationStatus};
use crate::rewards::{normalize_ledger, reconstruct, RewardHistory, RewardLedgerEntry};
use crate::time::Epoch;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error("unsupported bundle version {0}")]
    UnsupportedVersion(u32),
}

/// Inputs (ledger, window, pool labels) plus the reconstructed series, so a
/// third party can recompute the history offline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub version: u32,
    pub wallet_id: String,
    pub network_id: u32,
    pub created_utc_rfc3339: String,
    /// Normalized: ascending, one entry per epoch.
    pub ledger: Vec<RewardLedgerEntry>,
    pub start_epoch: Epoch,
    pub end_epoch: Epoch,
    /// Pool hash -> display label at bundle time.
    pub pool_labels: BTreeMap<String, String>,
    pub history: RewardHistory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mangled: Option<MangledAmountSummary>,
}

pub const BUNDLE_VERSION: u32 = 1;

fn label_lookup(labels: &BTreeMap<String, String>) -> impl Fn(&str) -> String + '_ {
    |hash| labels.get(hash).cloned().unwrap_or_else(|| short_hash(hash))
}

impl EvidenceBundle {
    /// Normalize the ledger and reconstruct the window into a new bundle.
    pub fn build(
        wallet_id: String,
        default_token: &TokenKey,
        ledger: Vec<RewardLedgerEntry>,
        start_epoch: Epoch,
        end_epoch: Epoch,
        pool_labels: BTreeMap<String, String>,
    ) -> Result<Self, VerifyError> {
        let ledger = normalize_ledger(ledger)?;
        let history = reconstruct(
            &ledger,
            start_epoch,
            end_epoch,
            default_token,
            label_lookup(&pool_labels),
        )?;
        let created_utc_rfc3339 = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Ok(Self {
            version: BUNDLE_VERSION,
            wallet_id,
            network_id: default_token.network_id,
            created_utc_rfc3339,
            ledger,
            start_epoch,
            end_epoch: history.end_epoch,
            pool_labels,
            history,
            delegation: None,
            mangled: None,
        })
    }

    pub fn with_delegation(mut self, status: DelegationStatus) -> Self {
        self.delegation = Some(status);
        self
    }

    pub fn with_mangled(mut self, summary: MangledAmountSummary) -> Self {
        self.mangled = Some(summary);
        self
    }

    /// Reconstruct the history again from the bundled inputs.
    pub fn recompute(&self) -> Result<RewardHistory, VerifyError> {
        Ok(reconstruct(
            &self.ledger,
            self.start_epoch,
            self.end_epoch,
            &self.history.default_token,
            label_lookup(&self.pool_labels),
        )?)
    }
}

/// Normalize JSON for hashing: sort keys and no whitespace.
pub fn normalize_for_hash(value: &serde_json::Value) -> Result<String, VerifyError> {
    let sorted = sort_json_keys(value);
    Ok(serde_json::to_string(&sorted)?)
}

fn sort_json_keys(v: &serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(m) => {
            let sorted: BTreeMap<&String, serde_json::Value> =
                m.iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// Compute SHA-256 over normalized bundle JSON.
pub fn reproducibility_hash(bundle: &EvidenceBundle) -> Result<String, VerifyError> {
    let json = serde_json::to_value(bundle)?;
    let normalized = normalize_for_hash(&json)?;
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub bundle_hash: String,
    pub expected_hash: Option<String>,
    /// `None` when no expected hash was supplied.
    pub hash_matches: Option<bool>,
    /// The bundled history equals one recomputed from the bundled ledger.
    pub history_matches: bool,
}

impl VerificationResult {
    pub fn ok(&self) -> bool {
        self.history_matches && self.hash_matches.unwrap_or(true)
    }
}

/// Check the bundle against an expected `.sha256` content (if any) and
/// recompute its history.
pub fn verify_bundle(
    bundle: &EvidenceBundle,
    expected_hex: Option<&str>,
) -> Result<VerificationResult, VerifyError> {
    if bundle.version != BUNDLE_VERSION {
        return Err(VerifyError::UnsupportedVersion(bundle.version));
    }
    let bundle_hash = reproducibility_hash(bundle)?;
    let expected = expected_hex.map(|e| e.trim().to_lowercase());
    let hash_matches = expected.as_ref().map(|e| *e == bundle_hash);
    let history_matches = bundle.recompute()? == bundle.history;
    Ok(VerificationResult {
        bundle_hash,
        expected_hash: expected,
        hash_matches,
        history_matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::MultiTokenAmount;

    fn entry(epoch: Epoch, amount: i64, pool: &str) -> RewardLedgerEntry {
        RewardLedgerEntry {
            epoch,
            amount: MultiTokenAmount::from_default(TokenKey::primary(1), amount),
            pool_hash: pool.to_string(),
        }
    }

    fn bundle() -> EvidenceBundle {
        let labels = BTreeMap::from([("p1".to_string(), "[ONE] Pool One".to_string())]);
        EvidenceBundle::build(
            "stake1u9".to_string(),
            &TokenKey::primary(1),
            vec![entry(12, 3, "p1"), entry(10, 5, "p1")],
            10,
            13,
            labels,
        )
        .unwrap()
    }

    #[test]
    fn normalize_deterministic() {
        let a = serde_json::json!({"z":1,"a":{"y":2,"b":3}});
        let b = serde_json::json!({"a":{"b":3,"y":2},"z":1});
        assert_eq!(normalize_for_hash(&a).unwrap(), normalize_for_hash(&b).unwrap());
    }

    #[test]
    fn build_normalizes_and_labels() {
        let b = bundle();
        assert_eq!(b.ledger[0].epoch, 10);
        assert_eq!(b.history.len(), 3);
        assert_eq!(b.history.points[0].pool_label, "[ONE] Pool One");
        assert_eq!(b.history.points[1].pool_label, "");
    }

    #[test]
    fn hash_stable_across_json_round_trip() {
        let b = bundle();
        let h1 = reproducibility_hash(&b).unwrap();
        let json = serde_json::to_string_pretty(&b).unwrap();
        let back: EvidenceBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(reproducibility_hash(&back).unwrap(), h1);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn verify_detects_tampering() {
        let b = bundle();
        let hash = reproducibility_hash(&b).unwrap();
        let result = verify_bundle(&b, Some(&hash.to_uppercase())).unwrap();
        assert!(result.ok());

        let mut tampered = b.clone();
        tampered.ledger[1].amount = MultiTokenAmount::from_default(TokenKey::primary(1), 4);
        let result = verify_bundle(&tampered, Some(&hash)).unwrap();
        assert_eq!(result.hash_matches, Some(false));
        assert!(!result.history_matches);
        assert!(!result.ok());
    }
}
