//! Decoding of raw (hex) addresses into header-tagged variants.
//!
//! Header byte: high nibble is the address type, low nibble the network id.
//! 0-3 base, 4-5 pointer, 6-7 enterprise, 8 legacy (bootstrap), 14-15 reward.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CREDENTIAL_LEN: usize = 28;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("empty address")]
    Empty,
    #[error("invalid length {len} for {kind} address")]
    InvalidLength { kind: &'static str, len: usize },
    #[error("unknown address header type {0:#x}")]
    UnknownHeader(u8),
    #[error("truncated or oversized pointer")]
    BadPointer,
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "hash", rename_all = "snake_case")]
pub enum Credential {
    #[serde(with = "hash_hex")]
    KeyHash([u8; CREDENTIAL_LEN]),
    #[serde(with = "hash_hex")]
    ScriptHash([u8; CREDENTIAL_LEN]),
}

impl Credential {
    fn from_slice(bytes: &[u8], script: bool) -> Self {
        let mut h = [0u8; CREDENTIAL_LEN];
        h.copy_from_slice(&bytes[..CREDENTIAL_LEN]);
        if script {
            Credential::ScriptHash(h)
        } else {
            Credential::KeyHash(h)
        }
    }

    /// Staking key hash given as 56 hex characters.
    pub fn key_hash_from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s.trim()).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        if bytes.len() != CREDENTIAL_LEN {
            return Err(AddressError::InvalidLength {
                kind: "credential",
                len: bytes.len(),
            });
        }
        Ok(Self::from_slice(&bytes, false))
    }

    pub fn hash(&self) -> &[u8; CREDENTIAL_LEN] {
        match self {
            Credential::KeyHash(h) | Credential::ScriptHash(h) => h,
        }
    }
}

/// Certificate position a pointer address refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pointer {
    pub slot: u64,
    pub tx_index: u64,
    pub cert_index: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Base {
        network: u8,
        payment: Credential,
        stake: Credential,
    },
    Pointer {
        network: u8,
        payment: Credential,
        pointer: Pointer,
    },
    Enterprise {
        network: u8,
        payment: Credential,
    },
    Reward {
        network: u8,
        stake: Credential,
    },
    Byron {
        bytes: Vec<u8>,
    },
}

fn expect_len(kind: &'static str, bytes: &[u8], len: usize) -> Result<(), AddressError> {
    if bytes.len() != len {
        return Err(AddressError::InvalidLength {
            kind,
            len: bytes.len(),
        });
    }
    Ok(())
}

/// Big-endian base-128 natural, high bit set on every byte but the last.
fn read_varnat(bytes: &[u8], pos: &mut usize) -> Result<u64, AddressError> {
    let mut value: u64 = 0;
    loop {
        let b = *bytes.get(*pos).ok_or(AddressError::BadPointer)?;
        *pos += 1;
        if value > (u64::MAX >> 7) {
            return Err(AddressError::BadPointer);
        }
        value = (value << 7) | u64::from(b & 0x7f);
        if b & 0x80 == 0 {
            return Ok(value);
        }
    }
}

impl Address {
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = hex::decode(s.trim()).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let header = *bytes.first().ok_or(AddressError::Empty)?;
        let kind = header >> 4;
        let network = header & 0x0f;
        let body = &bytes[1..];
        match kind {
            0..=3 => {
                expect_len("base", body, 2 * CREDENTIAL_LEN)?;
                Ok(Address::Base {
                    network,
                    payment: Credential::from_slice(body, kind & 0b01 != 0),
                    stake: Credential::from_slice(&body[CREDENTIAL_LEN..], kind & 0b10 != 0),
                })
            }
            4 | 5 => {
                if body.len() < CREDENTIAL_LEN + 3 {
                    return Err(AddressError::InvalidLength {
                        kind: "pointer",
                        len: body.len(),
                    });
                }
                let mut pos = CREDENTIAL_LEN;
                let slot = read_varnat(body, &mut pos)?;
                let tx_index = read_varnat(body, &mut pos)?;
                let cert_index = read_varnat(body, &mut pos)?;
                if pos != body.len() {
                    return Err(AddressError::BadPointer);
                }
                Ok(Address::Pointer {
                    network,
                    payment: Credential::from_slice(body, kind == 5),
                    pointer: Pointer {
                        slot,
                        tx_index,
                        cert_index,
                    },
                })
            }
            6 | 7 => {
                expect_len("enterprise", body, CREDENTIAL_LEN)?;
                Ok(Address::Enterprise {
                    network,
                    payment: Credential::from_slice(body, kind == 7),
                })
            }
            8 => Ok(Address::Byron {
                bytes: bytes.to_vec(),
            }),
            14 | 15 => {
                expect_len("reward", body, CREDENTIAL_LEN)?;
                Ok(Address::Reward {
                    network,
                    stake: Credential::from_slice(body, kind == 15),
                })
            }
            other => Err(AddressError::UnknownHeader(other)),
        }
    }

    /// Stake credential embedded directly in the address, if any.
    pub fn stake_credential(&self) -> Option<&Credential> {
        match self {
            Address::Base { stake, .. } | Address::Reward { stake, .. } => Some(stake),
            _ => None,
        }
    }

    pub fn network_id(&self) -> Option<u8> {
        match self {
            Address::Base { network, .. }
            | Address::Pointer { network, .. }
            | Address::Enterprise { network, .. }
            | Address::Reward { network, .. } => Some(*network),
            Address::Byron { .. } => None,
        }
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, Address::Reward { .. })
    }
}

mod hash_hex {
    use super::CREDENTIAL_LEN;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(h: &[u8; CREDENTIAL_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(h))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; CREDENTIAL_LEN], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| de::Error::custom("credential hash must be 28 bytes"))
    }
}
