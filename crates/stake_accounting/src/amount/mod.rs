//! Exact multi-token arithmetic and display formatting.

mod decimal;
mod multi_token;
mod registry;

pub use decimal::{parse_shifted_decimal, shifted_decimal};
pub use multi_token::{big_int_str, AmountError, MultiTokenAmount, TokenEntry, TokenKey};
pub use registry::{TokenInfo, TokenRegistry};
