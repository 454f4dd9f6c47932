//! Wallet balance totals per address subgroup.

use crate::address::classify::{mangled_address_set, AddressSubgroup, ClassifiedAddress};
use crate::address::mangled::{compute_mangled_summary, MangledAmountSummary, UnmangleParams, Utxo};
use crate::amount::{AmountError, MultiTokenAmount, TokenKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalanceSummary {
    pub total: MultiTokenAmount,
    pub by_subgroup: BTreeMap<AddressSubgroup, MultiTokenAmount>,
    pub mangled: MangledAmountSummary,
}

/// UTxOs at addresses the wallet does not know count toward `total` only.
pub fn summarize_wallet(
    classified: &[ClassifiedAddress],
    utxos: &[Utxo],
    params: &UnmangleParams,
    default_token: &TokenKey,
) -> Result<WalletBalanceSummary, AmountError> {
    let groups: HashMap<String, AddressSubgroup> = classified
        .iter()
        .map(|c| (c.info.address.trim().to_lowercase(), c.subgroup))
        .collect();

    let mut total = MultiTokenAmount::new(default_token.clone());
    let mut by_subgroup: BTreeMap<AddressSubgroup, MultiTokenAmount> = BTreeMap::new();
    let mut unknown = 0usize;
    for u in utxos {
        total.checked_add_assign(&u.amount)?;
        match groups.get(&u.address.trim().to_lowercase()) {
            Some(group) => by_subgroup
                .entry(*group)
                .or_insert_with(|| MultiTokenAmount::new(default_token.clone()))
                .checked_add_assign(&u.amount)?,
            None => unknown += 1,
        }
    }
    if unknown > 0 {
        debug!(unknown, "utxos at addresses outside the wallet's address list");
    }
    by_subgroup.insert(AddressSubgroup::All, total.clone());

    let mangled = compute_mangled_summary(
        utxos,
        &mangled_address_set(classified),
        &params.min_utxo_value,
        &params.estimated_fee,
        default_token,
    )?;
    Ok(WalletBalanceSummary {
        total,
        by_subgroup,
        mangled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::classify::{classify_all, AddressInfo};
    use crate::address::decode::tests::{base_hex, key};
    use num_bigint::BigInt;

    #[test]
    fn totals_by_subgroup() {
        let ada = TokenKey::primary(1);
        let ext = base_hex(1, 1, 0xbb);
        let mangled = base_hex(1, 2, 0xcc);
        let infos = vec![
            AddressInfo {
                address: ext.clone(),
                derivation_path: Some("m/1852'/1815'/0'/0/0".parse().unwrap()),
                is_used: true,
            },
            AddressInfo {
                address: mangled.clone(),
                derivation_path: Some("m/1852'/1815'/0'/0/1".parse().unwrap()),
                is_used: true,
            },
        ];
        let classified = classify_all(&infos, &key(0xbb));
        let mk = |addr: &str, i: u32, v: u64| Utxo {
            tx_hash: "t".into(),
            output_index: i,
            address: addr.into(),
            amount: MultiTokenAmount::from_default(ada.clone(), v),
        };
        let utxos = vec![mk(&ext, 0, 10), mk(&mangled, 1, 3_000_000), mk("ffff", 2, 1)];
        let params = UnmangleParams {
            min_utxo_value: BigInt::from(1_000_000),
            estimated_fee: BigInt::from(200_000),
        };
        let s = summarize_wallet(&classified, &utxos, &params, &ada).unwrap();
        assert_eq!(s.total.default_amount(), BigInt::from(3_000_011));
        assert_eq!(
            s.by_subgroup[&AddressSubgroup::External].default_amount(),
            BigInt::from(10)
        );
        assert_eq!(
            s.by_subgroup[&AddressSubgroup::Mangled].default_amount(),
            BigInt::from(3_000_000)
        );
        assert_eq!(s.by_subgroup[&AddressSubgroup::All], s.total);
        assert_eq!(s.mangled.can_unmangle.default_amount(), BigInt::from(3_000_000));
    }
}
