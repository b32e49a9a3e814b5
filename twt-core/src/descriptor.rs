//! Firmware-facing setup and teardown descriptors.
//!
//! Both are flat little-endian records with explicit `encode`/`decode`;
//! their byte layout never depends on host struct layout.
//!
//! ```text
//! SetupDescriptor (34 bytes)
//!   0  setup_cmd:u8      1  flow_flags:u8     2  flow_id:u8    3  wake_type:u8
//!   4  wake_time_h:u32   8  wake_time_l:u32  12  wake_dur:u32 16  wake_int:u32
//!  20  btwt_persistence:u32                   24  wake_int_max:u32
//!  28  duty_cycle_min:u8 29 pad:u8  30 bid:u8  31 channel:u8
//!  32  negotiation_type:u8                    33  frame_recomm:u8
//!
//! TeardownDescriptor (4 bytes)
//!   0  negotiation_type:u8  1 flow_id:u8  2 bid:u8  3 alltwt:u8
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{ensure_len, join_wake_time, split_wake_time};
use crate::error::CodecError;
use crate::flags::FlowFlags;
use crate::message::{BroadcastRecommendation, NegotiationType, SetupCmd, WakeTimeType};

// ── SetupDescriptor ──────────────────────────────────────────────

/// Setup descriptor carried by setup commands and, optionally, by setup
/// completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupDescriptor {
    pub setup_cmd: SetupCmd,
    pub flow_flags: FlowFlags,
    pub flow_id: u8,
    pub wake_type: WakeTimeType,
    /// Full 64-bit wake time; split into halves only on the wire.
    pub wake_time: u64,
    /// Nominal wake duration in µs.
    pub wake_duration: u32,
    /// Wake interval in µs.
    pub wake_interval: u32,
    pub broadcast_persistence: u32,
    pub wake_interval_max: u32,
    pub duty_cycle_min: u8,
    pub broadcast_id: u8,
    pub channel: u8,
    pub negotiation_type: NegotiationType,
    pub frame_recommendation: BroadcastRecommendation,
}

impl SetupDescriptor {
    pub const SIZE: usize = 34;

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let flags = self.flow_flags.to_wire()?;
        let (high, low) = split_wake_time(self.wake_time);

        buf.reserve(Self::SIZE);
        buf.put_u8(self.setup_cmd.into());
        buf.put_u8(flags);
        buf.put_u8(self.flow_id);
        buf.put_u8(self.wake_type.into());
        buf.put_u32_le(high);
        buf.put_u32_le(low);
        buf.put_u32_le(self.wake_duration);
        buf.put_u32_le(self.wake_interval);
        buf.put_u32_le(self.broadcast_persistence);
        buf.put_u32_le(self.wake_interval_max);
        buf.put_u8(self.duty_cycle_min);
        buf.put_u8(0); // pad
        buf.put_u8(self.broadcast_id);
        buf.put_u8(self.channel);
        buf.put_u8(self.negotiation_type.into());
        buf.put_u8(self.frame_recommendation.into());
        Ok(())
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        ensure_len(buf, Self::SIZE)?;

        let setup_cmd = SetupCmd::try_from(buf.get_u8())?;
        let flow_flags = FlowFlags::from_wire(buf.get_u8())?;
        let flow_id = buf.get_u8();
        let wake_type = WakeTimeType::try_from(buf.get_u8())?;
        let high = buf.get_u32_le();
        let low = buf.get_u32_le();
        let wake_duration = buf.get_u32_le();
        let wake_interval = buf.get_u32_le();
        let broadcast_persistence = buf.get_u32_le();
        let wake_interval_max = buf.get_u32_le();
        let duty_cycle_min = buf.get_u8();
        buf.advance(1);
        let broadcast_id = buf.get_u8();
        let channel = buf.get_u8();
        let negotiation_type = NegotiationType::try_from(buf.get_u8())?;
        let frame_recommendation = BroadcastRecommendation::try_from(buf.get_u8())?;

        Ok(Self {
            setup_cmd,
            flow_flags,
            flow_id,
            wake_type,
            wake_time: join_wake_time(high, low),
            wake_duration,
            wake_interval,
            broadcast_persistence,
            wake_interval_max,
            duty_cycle_min,
            broadcast_id,
            channel,
            negotiation_type,
            frame_recommendation,
        })
    }

    /// The id that keys the described session under its negotiation type.
    pub fn session_id_value(&self) -> u8 {
        if self.negotiation_type.is_broadcast() {
            self.broadcast_id
        } else {
            self.flow_id
        }
    }
}

// ── TeardownDescriptor ───────────────────────────────────────────

/// Teardown descriptor carried by teardown commands and, optionally, by
/// teardown completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownDescriptor {
    pub negotiation_type: NegotiationType,
    pub flow_id: u8,
    pub broadcast_id: u8,
    pub teardown_all: bool,
}

impl TeardownDescriptor {
    pub const SIZE: usize = 4;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.negotiation_type.into());
        buf.put_u8(self.flow_id);
        buf.put_u8(self.broadcast_id);
        buf.put_u8(self.teardown_all as u8);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        ensure_len(buf, Self::SIZE)?;
        Ok(Self {
            negotiation_type: NegotiationType::try_from(buf.get_u8())?,
            flow_id: buf.get_u8(),
            broadcast_id: buf.get_u8(),
            teardown_all: buf.get_u8() != 0,
        })
    }

    pub fn session_id_value(&self) -> u8 {
        if self.negotiation_type.is_broadcast() {
            self.broadcast_id
        } else {
            self.flow_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SetupDescriptor {
        SetupDescriptor {
            setup_cmd: SetupCmd::Suggest,
            flow_flags: FlowFlags::REQUEST | FlowFlags::IMPLICIT,
            flow_id: 3,
            wake_type: WakeTimeType::Bss,
            wake_time: 0x0000_0001_2345_6789,
            wake_duration: 16_384,
            wake_interval: 1_048_576,
            broadcast_persistence: 0,
            wake_interval_max: 0,
            duty_cycle_min: 0,
            broadcast_id: 0,
            channel: 0,
            negotiation_type: NegotiationType::Individual,
            frame_recommendation: BroadcastRecommendation::NoConstraints,
        }
    }

    #[test]
    fn setup_layout() {
        let desc = sample();
        let mut buf = BytesMut::new();
        desc.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), SetupDescriptor::SIZE);
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], 0b0010_0010);
        assert_eq!(buf[2], 3);
        assert_eq!(buf[3], 0);
        // high half first, each half little-endian
        assert_eq!(&buf[4..8], &[0x01, 0x00, 0x00, 0x00]);
        assert_eq!(&buf[8..12], &[0x89, 0x67, 0x45, 0x23]);
        assert_eq!(&buf[12..16], &16_384u32.to_le_bytes());
        assert_eq!(buf[29], 0);

        assert_eq!(SetupDescriptor::decode(&buf).unwrap(), desc);
    }

    #[test]
    fn setup_decode_rejects_short_and_unknown() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf).unwrap();
        assert!(matches!(
            SetupDescriptor::decode(&buf[..33]),
            Err(CodecError::Truncated { .. })
        ));

        let mut bad = buf.to_vec();
        bad[32] = 9;
        assert!(matches!(
            SetupDescriptor::decode(&bad),
            Err(CodecError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn teardown_layout() {
        let desc = TeardownDescriptor {
            negotiation_type: NegotiationType::Broadcast,
            flow_id: 0xFF,
            broadcast_id: 12,
            teardown_all: true,
        };
        let mut buf = BytesMut::new();
        desc.encode(&mut buf);
        assert_eq!(&buf[..], &[3, 0xFF, 12, 1]);
        assert_eq!(TeardownDescriptor::decode(&buf).unwrap(), desc);
        assert_eq!(desc.session_id_value(), 12);
    }
}
