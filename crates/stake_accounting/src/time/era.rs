//! Era table and epoch/slot/wall-clock conversion.
//!
//! Epoch and slot lengths are piecewise-constant across eras. Each era's first
//! absolute slot and its offset from genesis are precomputed once so every
//! conversion is a lookup plus one multiplication.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

pub type Epoch = u64;
pub type AbsoluteSlot = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("malformed era table: {0}")]
    MalformedEraTable(String),
    #[error("slot {slot} out of range for epoch {epoch} ({slots_per_epoch} slots)")]
    SlotOutOfRange {
        epoch: Epoch,
        slot: u64,
        slots_per_epoch: u64,
    },
    #[error("time {0} is before genesis")]
    BeforeGenesis(i64),
    #[error("arithmetic overflow converting epoch/slot/time")]
    Overflow,
}

/// One protocol era: timing parameters from `start_epoch` until the next era.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Era {
    pub start_epoch: Epoch,
    pub slots_per_epoch: u64,
    pub slot_length_secs: u64,
}

/// (epoch, slot within epoch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpochSlot {
    pub epoch: Epoch,
    pub slot: u64,
}

#[derive(Clone, Copy, Debug)]
struct Segment {
    era: Era,
    start_slot: AbsoluteSlot,
    /// Seconds from genesis to the first slot of this era.
    start_offset_secs: u64,
}

/// Validated, ordered era table anchored at a genesis timestamp.
#[derive(Clone, Debug)]
pub struct EraTable {
    genesis_unix: i64,
    segments: Vec<Segment>,
}

impl EraTable {
    /// Build and validate. An unusable table is a fatal configuration error.
    pub fn new(genesis_unix: i64, eras: &[Era]) -> Result<Self, TimeError> {
        let Some(first) = eras.first() else {
            return Err(TimeError::MalformedEraTable("no eras".into()));
        };
        if first.start_epoch != 0 {
            return Err(TimeError::MalformedEraTable(format!(
                "first era starts at epoch {}, expected 0",
                first.start_epoch
            )));
        }
        for (i, era) in eras.iter().enumerate() {
            if era.slots_per_epoch == 0 || era.slot_length_secs == 0 {
                return Err(TimeError::MalformedEraTable(format!(
                    "era {i} has zero-length epoch or slot"
                )));
            }
        }
        for pair in eras.windows(2) {
            if pair[1].start_epoch <= pair[0].start_epoch {
                return Err(TimeError::MalformedEraTable(format!(
                    "eras unsorted or overlapping at start epoch {}",
                    pair[1].start_epoch
                )));
            }
        }

        let mut segments = Vec::with_capacity(eras.len());
        let mut start_slot: u64 = 0;
        let mut start_offset_secs: u64 = 0;
        for (i, era) in eras.iter().enumerate() {
            segments.push(Segment {
                era: *era,
                start_slot,
                start_offset_secs,
            });
            if let Some(next) = eras.get(i + 1) {
                let slots = (next.start_epoch - era.start_epoch)
                    .checked_mul(era.slots_per_epoch)
                    .ok_or(TimeError::Overflow)?;
                let secs = slots
                    .checked_mul(era.slot_length_secs)
                    .ok_or(TimeError::Overflow)?;
                start_slot = start_slot.checked_add(slots).ok_or(TimeError::Overflow)?;
                start_offset_secs = start_offset_secs
                    .checked_add(secs)
                    .ok_or(TimeError::Overflow)?;
            }
        }
        Ok(Self {
            genesis_unix,
            segments,
        })
    }

    pub fn genesis_unix(&self) -> i64 {
        self.genesis_unix
    }

    pub fn eras(&self) -> impl Iterator<Item = &Era> {
        self.segments.iter().map(|s| &s.era)
    }

    // Segments are non-empty and sorted; the first one starts at epoch/slot 0.
    fn segment_for_epoch(&self, epoch: Epoch) -> &Segment {
        let idx = self
            .segments
            .partition_point(|s| s.era.start_epoch <= epoch)
            .saturating_sub(1);
        &self.segments[idx]
    }

    fn segment_for_slot(&self, slot: AbsoluteSlot) -> &Segment {
        let idx = self
            .segments
            .partition_point(|s| s.start_slot <= slot)
            .saturating_sub(1);
        &self.segments[idx]
    }

    fn segment_for_offset(&self, offset_secs: u64) -> &Segment {
        let idx = self
            .segments
            .partition_point(|s| s.start_offset_secs <= offset_secs)
            .saturating_sub(1);
        &self.segments[idx]
    }

    /// Slots per epoch in force at `epoch`. Beyond the last era, its value holds.
    pub fn current_epoch_length(&self, epoch: Epoch) -> u64 {
        self.segment_for_epoch(epoch).era.slots_per_epoch
    }

    /// Slot length in seconds in force at `epoch`.
    pub fn current_slot_length(&self, epoch: Epoch) -> u64 {
        self.segment_for_epoch(epoch).era.slot_length_secs
    }

    pub fn to_absolute_slot(&self, epoch: Epoch, slot_in_epoch: u64) -> Result<AbsoluteSlot, TimeError> {
        let seg = self.segment_for_epoch(epoch);
        if slot_in_epoch >= seg.era.slots_per_epoch {
            return Err(TimeError::SlotOutOfRange {
                epoch,
                slot: slot_in_epoch,
                slots_per_epoch: seg.era.slots_per_epoch,
            });
        }
        (epoch - seg.era.start_epoch)
            .checked_mul(seg.era.slots_per_epoch)
            .and_then(|s| s.checked_add(seg.start_slot))
            .and_then(|s| s.checked_add(slot_in_epoch))
            .ok_or(TimeError::Overflow)
    }

    /// Inverse of [`EraTable::to_absolute_slot`].
    pub fn decompose_slot(&self, absolute: AbsoluteSlot) -> EpochSlot {
        let seg = self.segment_for_slot(absolute);
        let into_era = absolute - seg.start_slot;
        EpochSlot {
            epoch: seg.era.start_epoch + into_era / seg.era.slots_per_epoch,
            slot: into_era % seg.era.slots_per_epoch,
        }
    }

    /// Unix seconds at the start of `absolute`.
    pub fn to_unix_time(&self, absolute: AbsoluteSlot) -> Result<i64, TimeError> {
        let seg = self.segment_for_slot(absolute);
        let offset = (absolute - seg.start_slot)
            .checked_mul(seg.era.slot_length_secs)
            .and_then(|s| s.checked_add(seg.start_offset_secs))
            .ok_or(TimeError::Overflow)?;
        i64::try_from(offset)
            .ok()
            .and_then(|o| self.genesis_unix.checked_add(o))
            .ok_or(TimeError::Overflow)
    }

    pub fn to_real_time(&self, absolute: AbsoluteSlot) -> Result<OffsetDateTime, TimeError> {
        let unix = self.to_unix_time(absolute)?;
        OffsetDateTime::from_unix_timestamp(unix).map_err(|_| TimeError::Overflow)
    }

    /// Absolute slot containing `at` (floor).
    pub fn time_to_absolute_slot(&self, at: OffsetDateTime) -> Result<AbsoluteSlot, TimeError> {
        let unix = at.unix_timestamp();
        if unix < self.genesis_unix {
            return Err(TimeError::BeforeGenesis(unix));
        }
        let offset = u64::try_from(unix - self.genesis_unix).map_err(|_| TimeError::Overflow)?;
        let seg = self.segment_for_offset(offset);
        let slots = (offset - seg.start_offset_secs) / seg.era.slot_length_secs;
        seg.start_slot.checked_add(slots).ok_or(TimeError::Overflow)
    }

    pub fn epoch_at(&self, at: OffsetDateTime) -> Result<EpochSlot, TimeError> {
        Ok(self.decompose_slot(self.time_to_absolute_slot(at)?))
    }

    pub fn epoch_start_time(&self, epoch: Epoch) -> Result<OffsetDateTime, TimeError> {
        self.to_real_time(self.to_absolute_slot(epoch, 0)?)
    }

    /// Exclusive end of `epoch`, i.e. the start of the next one.
    pub fn epoch_end_time(&self, epoch: Epoch) -> Result<OffsetDateTime, TimeError> {
        let next = epoch.checked_add(1).ok_or(TimeError::Overflow)?;
        self.epoch_start_time(next)
    }
}
