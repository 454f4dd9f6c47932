//! Token metadata (ticker, decimals) used at the display boundary.

use crate::amount::decimal::shifted_decimal;
use crate::amount::multi_token::{AmountError, MultiTokenAmount, TokenEntry, TokenKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub identifier: String,
    pub network_id: u32,
    pub ticker: Option<String>,
    #[serde(default)]
    pub decimals: u32,
}

impl TokenInfo {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.identifier.clone(), self.network_id)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<TokenKey, TokenInfo>,
    defaults: BTreeMap<u32, TokenKey>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: TokenInfo) {
        self.tokens.insert(info.key(), info);
    }

    /// Register `info` as its network's primary token.
    pub fn register_default(&mut self, info: TokenInfo) {
        self.defaults.insert(info.network_id, info.key());
        self.register(info);
    }

    pub fn info(&self, key: &TokenKey) -> Option<&TokenInfo> {
        self.tokens.get(key)
    }

    /// Missing primary-token metadata is a configuration error.
    pub fn default_token_info(&self, network_id: u32) -> Result<&TokenInfo, AmountError> {
        self.defaults
            .get(&network_id)
            .and_then(|k| self.tokens.get(k))
            .ok_or(AmountError::MissingDefaultToken(network_id))
    }

    /// "<shifted> <ticker>"; unknown tokens are shown unshifted with their identifier.
    pub fn format_entry(&self, entry: &TokenEntry) -> String {
        match self.info(&entry.key()) {
            Some(info) => {
                let value = shifted_decimal(&entry.amount, info.decimals);
                match &info.ticker {
                    Some(t) => format!("{value} {t}"),
                    None => value,
                }
            }
            None => format!("{} {}", entry.amount, entry.identifier),
        }
    }

    pub fn format_default(&self, amount: &MultiTokenAmount) -> Result<String, AmountError> {
        let info = self.default_token_info(amount.default_token().network_id)?;
        if info.key() != *amount.default_token() {
            return Err(AmountError::IncompatibleDefaultToken {
                left: info.key(),
                right: amount.default_token().clone(),
            });
        }
        Ok(self.format_entry(&amount.default_entry()))
    }
}
