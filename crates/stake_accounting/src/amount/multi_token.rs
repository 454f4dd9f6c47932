//! Multi-token amounts anchored on a default (primary) token.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("incompatible default tokens: {left} vs {right}")]
    IncompatibleDefaultToken { left: TokenKey, right: TokenKey },
    #[error("no default token metadata for network {0}")]
    MissingDefaultToken(u32),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Token identity. The primary token of a network has an empty identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    pub identifier: String,
    pub network_id: u32,
}

impl TokenKey {
    pub fn new(identifier: impl Into<String>, network_id: u32) -> Self {
        Self {
            identifier: identifier.into(),
            network_id,
        }
    }

    /// Key of a network's primary token.
    pub fn primary(network_id: u32) -> Self {
        Self::new("", network_id)
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identifier.is_empty() {
            write!(f, "<primary>@{}", self.network_id)
        } else {
            write!(f, "{}@{}", self.identifier, self.network_id)
        }
    }
}

/// One token's amount in its smallest unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub identifier: String,
    pub network_id: u32,
    #[serde(with = "big_int_str")]
    pub amount: BigInt,
}

impl TokenEntry {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.identifier.clone(), self.network_id)
    }
}

/// Amounts for any number of tokens plus the designated default token.
///
/// Zero amounts are never stored, so two values holding the same non-zero
/// amounts compare equal regardless of how they were built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "MultiTokenRepr", try_from = "MultiTokenRepr")]
pub struct MultiTokenAmount {
    default: TokenKey,
    values: BTreeMap<TokenKey, BigInt>,
}

impl MultiTokenAmount {
    /// Zero amount anchored on `default`.
    pub fn new(default: TokenKey) -> Self {
        Self {
            default,
            values: BTreeMap::new(),
        }
    }

    pub fn from_default(default: TokenKey, amount: impl Into<BigInt>) -> Self {
        let key = default.clone();
        Self::new(default).with(key, amount)
    }

    /// Builder-style add of a single token amount.
    pub fn with(mut self, key: TokenKey, amount: impl Into<BigInt>) -> Self {
        self.accumulate(key, &amount.into());
        self
    }

    pub fn default_token(&self) -> &TokenKey {
        &self.default
    }

    pub fn get(&self, key: &TokenKey) -> BigInt {
        self.values.get(key).cloned().unwrap_or_else(BigInt::zero)
    }

    pub fn default_amount(&self) -> BigInt {
        self.get(&self.default)
    }

    /// Projection onto the primary token.
    pub fn default_entry(&self) -> TokenEntry {
        TokenEntry {
            identifier: self.default.identifier.clone(),
            network_id: self.default.network_id,
            amount: self.default_amount(),
        }
    }

    pub fn non_default_entries(&self) -> Vec<TokenEntry> {
        self.values
            .iter()
            .filter(|(k, _)| **k != self.default)
            .map(|(k, v)| TokenEntry {
                identifier: k.identifier.clone(),
                network_id: k.network_id,
                amount: v.clone(),
            })
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&TokenKey, &BigInt)> {
        self.values.iter()
    }

    /// True when every token amount is zero.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn ensure_compatible(&self, other: &Self) -> Result<(), AmountError> {
        if self.default != other.default {
            return Err(AmountError::IncompatibleDefaultToken {
                left: self.default.clone(),
                right: other.default.clone(),
            });
        }
        Ok(())
    }

    fn accumulate(&mut self, key: TokenKey, delta: &BigInt) {
        if delta.is_zero() {
            return;
        }
        let slot = self.values.entry(key).or_insert_with(BigInt::zero);
        *slot += delta;
        if slot.is_zero() {
            self.values.retain(|_, v| !v.is_zero());
        }
    }

    pub fn checked_add_assign(&mut self, other: &Self) -> Result<(), AmountError> {
        self.ensure_compatible(other)?;
        for (k, v) in &other.values {
            self.accumulate(k.clone(), v);
        }
        Ok(())
    }

    /// Per-token sum. Tokens present in only one operand pass through.
    pub fn add(&self, other: &Self) -> Result<Self, AmountError> {
        let mut out = self.clone();
        out.checked_add_assign(other)?;
        Ok(out)
    }

    /// Per-token difference; the result may hold negative amounts.
    pub fn sub(&self, other: &Self) -> Result<Self, AmountError> {
        self.ensure_compatible(other)?;
        let mut out = self.clone();
        for (k, v) in &other.values {
            out.accumulate(k.clone(), &-v);
        }
        Ok(out)
    }

    pub fn try_sum<'a>(
        default: TokenKey,
        amounts: impl IntoIterator<Item = &'a MultiTokenAmount>,
    ) -> Result<Self, AmountError> {
        let mut total = Self::new(default);
        for a in amounts {
            total.checked_add_assign(a)?;
        }
        Ok(total)
    }
}

#[derive(Serialize, Deserialize)]
struct MultiTokenRepr {
    default: TokenKey,
    values: Vec<TokenEntry>,
}

impl From<MultiTokenAmount> for MultiTokenRepr {
    fn from(m: MultiTokenAmount) -> Self {
        let mut values = vec![m.default_entry()];
        values.extend(m.non_default_entries());
        Self {
            default: m.default,
            values,
        }
    }
}

impl TryFrom<MultiTokenRepr> for MultiTokenAmount {
    type Error = AmountError;

    fn try_from(r: MultiTokenRepr) -> Result<Self, Self::Error> {
        let mut out = MultiTokenAmount::new(r.default);
        for e in r.values {
            out.accumulate(e.key(), &e.amount);
        }
        Ok(out)
    }
}

/// Serde helper: arbitrary-precision integers as decimal strings.
/// Plain JSON integers are accepted on input.
pub mod big_int_str {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Signed(i64),
        Unsigned(u64),
    }

    pub fn serialize<S: Serializer>(v: &BigInt, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigInt, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Str(s) => s
                .trim()
                .parse::<BigInt>()
                .map_err(|_| de::Error::custom(format!("invalid integer amount: {s}"))),
            Raw::Signed(n) => Ok(BigInt::from(n)),
            Raw::Unsigned(n) => Ok(BigInt::from(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> TokenKey {
        TokenKey::primary(1)
    }

    fn token(name: &str) -> TokenKey {
        TokenKey::new(name, 1)
    }

    #[test]
    fn add_passes_through_one_sided_tokens() {
        let a = MultiTokenAmount::from_default(ada(), 5).with(token("aa.01"), 7);
        let b = MultiTokenAmount::from_default(ada(), 10).with(token("bb.02"), 3);
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.default_amount(), BigInt::from(15));
        assert_eq!(sum.get(&token("aa.01")), BigInt::from(7));
        assert_eq!(sum.get(&token("bb.02")), BigInt::from(3));
        assert_eq!(sum.non_default_entries().len(), 2);
    }

    #[test]
    fn add_rejects_different_default_tokens() {
        let a = MultiTokenAmount::from_default(TokenKey::primary(1), 1);
        let b = MultiTokenAmount::from_default(TokenKey::primary(0), 1);
        let err = a.add(&b).unwrap_err();
        assert!(matches!(err, AmountError::IncompatibleDefaultToken { .. }));
    }

    #[test]
    fn no_precision_loss_beyond_u64() {
        let huge: BigInt = "340282366920938463463374607431768211455".parse().unwrap();
        let a = MultiTokenAmount::from_default(ada(), huge.clone());
        let sum = a.add(&a).unwrap();
        assert_eq!(sum.default_amount(), huge * 2);
    }

    #[test]
    fn zero_amounts_are_not_stored() {
        let a = MultiTokenAmount::from_default(ada(), 5).with(token("aa.01"), 2);
        let b = MultiTokenAmount::from_default(ada(), 5).with(token("aa.01"), 2);
        let diff = a.sub(&b).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff, MultiTokenAmount::new(ada()));
    }

    #[test]
    fn default_entry_of_empty_amount_is_zero() {
        let e = MultiTokenAmount::new(ada()).default_entry();
        assert_eq!(e.amount, BigInt::zero());
        assert_eq!(e.identifier, "");
        assert_eq!(e.network_id, 1);
    }

    #[test]
    fn serde_amounts_are_strings() {
        let a = MultiTokenAmount::from_default(ada(), 5_000_000).with(token("aa.01"), 9);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["values"][0]["amount"], "5000000");
        assert_eq!(json["values"][1]["amount"], "9");
        let back: MultiTokenAmount = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn deserialize_accepts_numeric_amounts() {
        let json = r#"{"default":{"identifier":"","network_id":1},"values":[{"identifier":"","network_id":1,"amount":42}]}"#;
        let a: MultiTokenAmount = serde_json::from_str(json).unwrap();
        assert_eq!(a.default_amount(), BigInt::from(42));
    }
}
