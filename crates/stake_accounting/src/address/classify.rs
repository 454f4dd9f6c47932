//! Address subgroup tagging and mangled-address detection.

use crate::address::decode::{Address, AddressError, Credential};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const HARDENED: u32 = 0x8000_0000;
pub const CHAIN_EXTERNAL: u32 = 0;
pub const CHAIN_INTERNAL: u32 = 1;
pub const CHAIN_STAKING: u32 = 2;

/// BIP32-style path, e.g. `m/1852'/1815'/0'/0/3`. Hardened indices carry the high bit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DerivationPath(pub Vec<u32>);

impl DerivationPath {
    /// Role of the address within its account (`0` external, `1` internal, `2` staking).
    pub fn chain(&self) -> Option<u32> {
        let n = self.0.len();
        (n >= 2).then(|| self.0[n - 2])
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for i in &self.0 {
            if i & HARDENED != 0 {
                write!(f, "/{}'", i & !HARDENED)?;
            } else {
                write!(f, "/{i}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidPath(s.to_string());
        let mut parts = s.trim().split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }
        let mut out = Vec::new();
        for p in parts {
            let (digits, hardened) = match p.strip_suffix('\'').or_else(|| p.strip_suffix('H')) {
                Some(d) => (d, true),
                None => (p, false),
            };
            let n: u32 = digits.parse().map_err(|_| invalid())?;
            if n & HARDENED != 0 {
                return Err(invalid());
            }
            out.push(if hardened { n | HARDENED } else { n });
        }
        Ok(DerivationPath(out))
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Wallet address as handed over by the storage layer. `address` is hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    /// Absent for address-book entries not derived from this wallet.
    #[serde(default)]
    pub derivation_path: Option<DerivationPath>,
    #[serde(default)]
    pub is_used: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddressSubgroup {
    External,
    Internal,
    Reward,
    Mangled,
    AddressBook,
    /// Selector matching every subgroup; never assigned to an address.
    All,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedAddress {
    pub info: AddressInfo,
    pub decoded: Address,
    pub subgroup: AddressSubgroup,
}

/// True when funds at `address` sit under a stake credential other than the
/// wallet's current one. Pointer addresses always count: their delegation
/// follows a certificate, not the current key.
pub fn is_mangled(address: &Address, current_stake: &Credential) -> bool {
    match address {
        Address::Base { stake, .. } => stake != current_stake,
        Address::Pointer { .. } => true,
        Address::Enterprise { .. } | Address::Reward { .. } | Address::Byron { .. } => false,
    }
}

fn subgroup_of(decoded: &Address, info: &AddressInfo, current_stake: &Credential) -> AddressSubgroup {
    if decoded.is_reward() {
        return AddressSubgroup::Reward;
    }
    // Entries the wallet did not derive cannot be spent by it, mangled or not.
    let Some(path) = &info.derivation_path else {
        return AddressSubgroup::AddressBook;
    };
    if is_mangled(decoded, current_stake) {
        return AddressSubgroup::Mangled;
    }
    match path.chain() {
        Some(CHAIN_INTERNAL) => AddressSubgroup::Internal,
        Some(CHAIN_STAKING) => AddressSubgroup::Reward,
        _ => AddressSubgroup::External,
    }
}

pub fn classify(info: &AddressInfo, current_stake: &Credential) -> Result<AddressSubgroup, AddressError> {
    let decoded = Address::from_hex(&info.address)?;
    Ok(subgroup_of(&decoded, info, current_stake))
}

/// Classify every address; undecodable ones are logged and skipped.
pub fn classify_all(addresses: &[AddressInfo], current_stake: &Credential) -> Vec<ClassifiedAddress> {
    addresses
        .iter()
        .filter_map(|info| match Address::from_hex(&info.address) {
            Ok(decoded) => Some(ClassifiedAddress {
                subgroup: subgroup_of(&decoded, info, current_stake),
                info: info.clone(),
                decoded,
            }),
            Err(e) => {
                warn!(address = %info.address, error = %e, "skipping undecodable address");
                None
            }
        })
        .collect()
}

pub fn filter_subgroup(
    classified: &[ClassifiedAddress],
    subgroup: AddressSubgroup,
) -> Vec<&ClassifiedAddress> {
    classified
        .iter()
        .filter(|c| subgroup == AddressSubgroup::All || c.subgroup == subgroup)
        .collect()
}

/// Lowercase hex of every mangled address.
pub fn mangled_address_set(classified: &[ClassifiedAddress]) -> BTreeSet<String> {
    classified
        .iter()
        .filter(|c| c.subgroup == AddressSubgroup::Mangled)
        .map(|c| c.info.address.trim().to_lowercase())
        .collect()
}
