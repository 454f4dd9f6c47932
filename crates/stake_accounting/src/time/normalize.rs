//! Parsing of user-supplied protocol time: "epoch:slot", an absolute slot, or RFC 3339.

use crate::time::era::{AbsoluteSlot, EraTable, TimeError};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("invalid slot: {0}")]
    InvalidSlot(String),
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// One of the three accepted spellings, before resolution against an era table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolTime {
    EpochSlot { epoch: u64, slot: u64 },
    Absolute(AbsoluteSlot),
    Unix(i64),
}

/// Parse RFC3339 timestamp and return Unix timestamp.
pub fn parse_time_rfc3339(s: &str) -> Result<i64, NormalizeError> {
    let dt = OffsetDateTime::parse(s.trim(), &Rfc3339)
        .map_err(|e| NormalizeError::InvalidTime(e.to_string()))?;
    Ok(dt.unix_timestamp())
}

pub fn parse_protocol_time(input: &str) -> Result<ProtocolTime, NormalizeError> {
    let s = input.trim();
    if let Some((e, sl)) = s.split_once(':') {
        if let (Ok(epoch), Ok(slot)) = (e.parse::<u64>(), sl.parse::<u64>()) {
            return Ok(ProtocolTime::EpochSlot { epoch, slot });
        }
    }
    if let Ok(slot) = s.parse::<u64>() {
        return Ok(ProtocolTime::Absolute(slot));
    }
    if s.is_empty() || s.starts_with('-') {
        return Err(NormalizeError::InvalidSlot(input.to_string()));
    }
    Ok(ProtocolTime::Unix(parse_time_rfc3339(s)?))
}

/// Resolve any accepted spelling to an absolute slot.
pub fn normalize_epoch_slot_or_time(
    input: &str,
    table: &EraTable,
) -> Result<AbsoluteSlot, NormalizeError> {
    match parse_protocol_time(input)? {
        ProtocolTime::EpochSlot { epoch, slot } => Ok(table.to_absolute_slot(epoch, slot)?),
        ProtocolTime::Absolute(abs) => Ok(abs),
        ProtocolTime::Unix(ts) => {
            let at = OffsetDateTime::from_unix_timestamp(ts)
                .map_err(|e| NormalizeError::InvalidTime(e.to_string()))?;
            Ok(table.time_to_absolute_slot(at)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::era::Era;

    fn table() -> EraTable {
        EraTable::new(
            1_000,
            &[Era {
                start_epoch: 0,
                slots_per_epoch: 100,
                slot_length_secs: 1,
            }],
        )
        .unwrap()
    }

    #[test]
    fn normalize_epoch_slot() {
        assert_eq!(normalize_epoch_slot_or_time("3:7", &table()).unwrap(), 307);
    }

    #[test]
    fn normalize_absolute() {
        assert_eq!(normalize_epoch_slot_or_time("12345", &table()).unwrap(), 12345);
    }

    #[test]
    fn normalize_time() {
        assert_eq!(
            parse_protocol_time("2026-02-08T05:32:54Z").unwrap(),
            ProtocolTime::Unix(1_770_528_774)
        );
        assert_eq!(
            normalize_epoch_slot_or_time("1970-01-01T00:17:00Z", &table()).unwrap(),
            20
        );
    }

    #[test]
    fn normalize_rejects_empty_and_out_of_range() {
        assert!(parse_protocol_time("").is_err());
        assert!(normalize_epoch_slot_or_time("3:100", &table()).is_err());
    }
}
