//! Protocol time: epochs, slots, eras, and wall-clock conversion.

mod era;
mod normalize;

pub use era::{AbsoluteSlot, Epoch, EpochSlot, Era, EraTable, TimeError};
pub use normalize::{
    normalize_epoch_slot_or_time, parse_protocol_time, parse_time_rfc3339, NormalizeError,
    ProtocolTime,
};
