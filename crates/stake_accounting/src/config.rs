//! Network parameters: era table, genesis, primary token and reclaim thresholds.
//!
//! Load from: env `STAKE_ACCOUNTING_CONFIG`, or `./config/network.json`, or
//! `./network.json`. With no file present the built-in mainnet preset is used.
//! A file that exists but does not parse or validate is an error, never a
//! silent fallback.

use crate::address::UnmangleParams;
use crate::amount::{
    big_int_str, parse_shifted_decimal, AmountError, TokenInfo, TokenKey, TokenRegistry,
};
use crate::chain::DEFAULT_KOIOS_URL;
use crate::time::{Era, EraTable, TimeError};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const CONFIG_ENV: &str = "STAKE_ACCOUNTING_CONFIG";

const MAINNET_GENESIS_UNIX: i64 = 1_506_203_091;
const SHELLEY_START_EPOCH: u64 = 208;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Time(#[from] TimeError),
    #[error("default token network {token} does not match network {network}")]
    NetworkMismatch { network: u32, token: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network_id: u32,
    pub genesis_unix: i64,
    pub eras: Vec<Era>,
    pub default_token: TokenInfo,
    /// Additional tokens with display metadata.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<TokenInfo>,
    #[serde(with = "big_int_str")]
    pub min_utxo_value: BigInt,
    #[serde(with = "big_int_str")]
    pub estimated_unmangle_fee: BigInt,
    #[serde(default = "default_koios_url")]
    pub koios_url: String,
}

fn default_koios_url() -> String {
    DEFAULT_KOIOS_URL.to_string()
}

impl NetworkConfig {
    /// Cardano mainnet: Byron (20 s slots, 21600 per epoch) then Shelley onwards.
    pub fn mainnet() -> Self {
        Self {
            network_id: 1,
            genesis_unix: MAINNET_GENESIS_UNIX,
            eras: vec![
                Era {
                    start_epoch: 0,
                    slots_per_epoch: 21_600,
                    slot_length_secs: 20,
                },
                Era {
                    start_epoch: SHELLEY_START_EPOCH,
                    slots_per_epoch: 432_000,
                    slot_length_secs: 1,
                },
            ],
            default_token: TokenInfo {
                identifier: String::new(),
                network_id: 1,
                ticker: Some("ADA".to_string()),
                decimals: 6,
            },
            tokens: Vec::new(),
            min_utxo_value: BigInt::from(1_000_000),
            estimated_unmangle_fee: BigInt::from(200_000),
            koios_url: default_koios_url(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        info!(path = %path.display(), network = config.network_id, "loaded network config");
        Ok(config)
    }

    /// Env `STAKE_ACCOUNTING_CONFIG`, then `./config/network.json`, then `./network.json`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = Path::new(&path);
            if p.exists() {
                return Self::load_from_path(p);
            }
        }
        for candidate in [Path::new("./config/network.json"), Path::new("./network.json")] {
            if candidate.exists() {
                return Self::load_from_path(candidate);
            }
        }
        Ok(Self::mainnet())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_token.network_id != self.network_id {
            return Err(ConfigError::NetworkMismatch {
                network: self.network_id,
                token: self.default_token.network_id,
            });
        }
        self.era_table()?;
        Ok(())
    }

    pub fn era_table(&self) -> Result<EraTable, TimeError> {
        EraTable::new(self.genesis_unix, &self.eras)
    }

    pub fn default_token_key(&self) -> TokenKey {
        self.default_token.key()
    }

    pub fn token_registry(&self) -> TokenRegistry {
        let mut registry = TokenRegistry::new();
        registry.register_default(self.default_token.clone());
        for token in &self.tokens {
            registry.register(token.clone());
        }
        registry
    }

    pub fn unmangle_params(&self) -> UnmangleParams {
        UnmangleParams {
            min_utxo_value: self.min_utxo_value.clone(),
            estimated_fee: self.estimated_unmangle_fee.clone(),
        }
    }

    /// Unmangle parameters with the fee estimate overridden by a human
    /// amount in the default token ("0.17"). `None` keeps the configured fee.
    pub fn unmangle_params_with_fee(&self, fee: Option<&str>) -> Result<UnmangleParams, AmountError> {
        let mut params = self.unmangle_params();
        if let Some(fee) = fee {
            params.estimated_fee = parse_shifted_decimal(fee, self.default_token.decimals)?;
            if params.estimated_fee.sign() == num_bigint::Sign::Minus {
                return Err(AmountError::InvalidAmount(fee.to_string()));
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mainnet_preset_is_valid() {
        let config = NetworkConfig::mainnet();
        config.validate().unwrap();
        let table = config.era_table().unwrap();
        let shelley = table.epoch_start_time(SHELLEY_START_EPOCH).unwrap();
        assert_eq!(shelley.unix_timestamp(), 1_596_059_091);
        let registry = config.token_registry();
        assert_eq!(registry.default_token_info(1).unwrap().decimals, 6);
    }

    #[test]
    fn loads_file_with_numeric_amounts() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{"network_id":0,"genesis_unix":1654041600,
                "eras":[{{"start_epoch":0,"slots_per_epoch":432000,"slot_length_secs":1}}],
                "default_token":{{"identifier":"","network_id":0,"ticker":"tADA","decimals":6}},
                "min_utxo_value":1000000,"estimated_unmangle_fee":"180000"}}"#
        )
        .unwrap();
        let config = NetworkConfig::load_from_path(tmp.path()).unwrap();
        assert_eq!(config.network_id, 0);
        assert_eq!(config.koios_url, DEFAULT_KOIOS_URL);
        assert_eq!(config.unmangle_params().estimated_fee, BigInt::from(180_000));
    }

    #[test]
    fn fee_override_uses_default_token_decimals() {
        let config = NetworkConfig::mainnet();
        let params = config.unmangle_params_with_fee(Some("0.17")).unwrap();
        assert_eq!(params.estimated_fee, BigInt::from(170_000));
        assert_eq!(params.min_utxo_value, config.min_utxo_value);
        assert_eq!(config.unmangle_params_with_fee(None).unwrap(), config.unmangle_params());
        assert!(config.unmangle_params_with_fee(Some("0.0000001")).is_err());
        assert!(config.unmangle_params_with_fee(Some("-1")).is_err());
    }

    #[test]
    fn malformed_era_table_is_fatal() {
        let mut config = NetworkConfig::mainnet();
        config.eras[0].start_epoch = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Time(TimeError::MalformedEraTable(_)))
        ));
        config.eras.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "{{ not json").unwrap();
        assert!(matches!(
            NetworkConfig::load_from_path(tmp.path()),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn token_network_must_match() {
        let mut config = NetworkConfig::mainnet();
        config.default_token.network_id = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NetworkMismatch { network: 1, token: 0 })
        ));
    }
}
