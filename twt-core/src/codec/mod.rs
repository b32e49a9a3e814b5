//! Bit-exact packing of the TWT wire substructures.
//!
//! All multi-byte fields are little-endian. Each structure has an explicit
//! `encode`/`decode` pair; nothing relies on the host's struct layout.
//!
//! - [`fields`]: control byte, request type, group assignment, broadcast
//!   info, NDP paging, teardown byte and TWT information field
//! - [`element`]: the TWT information element built from those fields
//! - [`action`]: S1G action frames carrying setup, teardown and
//!   information content

pub mod action;
pub mod element;
pub mod fields;

pub use action::TwtActionFrame;
pub use element::{BroadcastParamSet, ElementBody, IndividualTwt, TwtElement};
pub use fields::{
    BroadcastInfo, Control, GroupAssignment, InfoField, NdpPaging, RequestType, Schedule,
    TeardownField, TwtInformation, UnitOffset,
};

use crate::error::CodecError;

/// Bits of a 64-bit TSF that form a 16-bit broadcast target wake time.
pub const BCAST_WAKE_TIME_MASK: u64 = 0x03FF_FC00;
pub const BCAST_WAKE_TIME_SHIFT: u32 = 10;

/// Reduces a TSF value to the 16-bit broadcast target wake time.
pub fn broadcast_wake_time(tsf: u64) -> u16 {
    ((tsf & BCAST_WAKE_TIME_MASK) >> BCAST_WAKE_TIME_SHIFT) as u16
}

/// Expands a broadcast target wake time back to its TSF bits; the low
/// ten bits are zero.
pub fn broadcast_wake_time_to_tsf(wake_time: u16) -> u64 {
    (wake_time as u64) << BCAST_WAKE_TIME_SHIFT
}

/// Splits a 64-bit wake time into its (high, low) 32-bit halves.
pub(crate) fn split_wake_time(wake_time: u64) -> (u32, u32) {
    ((wake_time >> 32) as u32, wake_time as u32)
}

pub(crate) fn join_wake_time(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

pub(crate) fn ensure_len(buf: &[u8], expected: usize) -> Result<(), CodecError> {
    if buf.len() < expected {
        return Err(CodecError::truncated(expected, buf.len()));
    }
    Ok(())
}

/// Fails when `value` needs more than `bits` bits.
pub(crate) fn check_width(field: &'static str, value: u64, bits: u32) -> Result<(), CodecError> {
    let max = (1u64 << bits) - 1;
    if value > max {
        return Err(CodecError::out_of_range(field, value, max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_time_split_is_high_then_low() {
        let (high, low) = split_wake_time(0x0123_4567_89AB_CDEF);
        assert_eq!(high, 0x0123_4567);
        assert_eq!(low, 0x89AB_CDEF);
        assert_eq!(join_wake_time(high, low), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn broadcast_wake_time_window() {
        let tsf = 0xFFFF_FFFF_FFFF_FFFFu64;
        assert_eq!(broadcast_wake_time(tsf), 0xFFFF);
        assert_eq!(broadcast_wake_time(0x3FF), 0);
        assert_eq!(broadcast_wake_time(0x400), 1);
        assert_eq!(broadcast_wake_time_to_tsf(1), 0x400);
        assert_eq!(broadcast_wake_time_to_tsf(0xFFFF), BCAST_WAKE_TIME_MASK);
    }

    #[test]
    fn width_check() {
        assert!(check_width("flow id", 7, 3).is_ok());
        assert_eq!(
            check_width("flow id", 8, 3),
            Err(CodecError::FieldOutOfRange {
                field: "flow id",
                value: 8,
                max: 7
            })
        );
    }
}
