//! Address decoding, subgroup classification, and mangled-funds detection.

mod classify;
pub(crate) mod decode;
mod mangled;
mod summary;

pub use classify::{
    classify, classify_all, filter_subgroup, is_mangled, mangled_address_set, AddressInfo,
    AddressSubgroup, ClassifiedAddress, DerivationPath, CHAIN_EXTERNAL, CHAIN_INTERNAL,
    CHAIN_STAKING,
};
pub use decode::{Address, AddressError, Credential, Pointer, CREDENTIAL_LEN};
pub use mangled::{compute_mangled_summary, unmangle_inputs, MangledAmountSummary, UnmangleParams, Utxo};
pub use summary::{summarize_wallet, WalletBalanceSummary};
