//! Protocol vocabulary: operation kinds, negotiation types, setup
//! commands and the enumerated sub-fields of the TWT element.
//!
//! Every enum converts from its raw wire value with `TryFrom<u8>`; unknown
//! values become `CodecError::UnknownVariant` instead of panicking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Declares a `#[repr(u8)]` wire enum with `TryFrom<u8>`, `From<Self> for u8`
/// and a `Display` that prints the variant name.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr, )+
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        $(#[$meta])*
        pub enum $name {
            $( $(#[$vmeta])* $variant = $value, )+
        }

        impl TryFrom<u8> for $name {
            type Error = CodecError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( v if v == $value => Ok($name::$variant), )+
                    _ => Err(CodecError::UnknownVariant {
                        type_name: stringify!($name),
                        value: value as u64,
                    }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

// ── TwtOperation ─────────────────────────────────────────────────

wire_enum! {
    /// Firmware TWT sub-command requested by the user layer.
    #[serde(rename_all = "snake_case")]
    pub enum TwtOperation {
        /// Enable the firmware TWT module.
        Enable = 0,
        /// Set up a TWT session with a peer.
        Setup = 1,
        /// Tear down an active TWT session with a peer.
        Teardown = 2,
    }
}

// ── NegotiationType ──────────────────────────────────────────────

wire_enum! {
    /// TWT negotiation type (IEEE Std 802.11ax-2021, Table 9-296a).
    #[serde(rename_all = "snake_case")]
    pub enum NegotiationType {
        /// Individual TWT setup.
        Individual = 0,
        /// Wake TBTT negotiation.
        WakeTbtt = 1,
        /// Broadcast TWT element advertised in beacons.
        BroadcastInBeacon = 2,
        /// Broadcast TWT membership negotiation.
        Broadcast = 3,
    }
}

impl NegotiationType {
    /// Broadcast negotiation types key their sessions by broadcast TWT id.
    pub fn is_broadcast(self) -> bool {
        matches!(self, Self::BroadcastInBeacon | Self::Broadcast)
    }

    /// Largest session id expressible on the wire for this type:
    /// 3-bit flow ids for individual, 5-bit broadcast ids otherwise.
    pub fn max_id(self) -> u8 {
        if self.is_broadcast() { 0x1F } else { 0x07 }
    }
}

// ── SetupCmd ─────────────────────────────────────────────────────

wire_enum! {
    /// TWT setup command (IEEE Std 802.11ax-2021, Table 9-297).
    #[serde(rename_all = "snake_case")]
    pub enum SetupCmd {
        Request = 0,
        Suggest = 1,
        Demand = 2,
        Grouping = 3,
        Accept = 4,
        Alternate = 5,
        Dictate = 6,
        Reject = 7,
    }
}

impl SetupCmd {
    /// Commands 4..=7 are only sent by a responding STA.
    pub fn is_response(self) -> bool {
        (self as u8) >= SetupCmd::Accept as u8
    }
}

// ── WakeTimeType ─────────────────────────────────────────────────

wire_enum! {
    /// How the firmware interprets the wake time of a setup descriptor.
    #[serde(rename_all = "snake_case")]
    pub enum WakeTimeType {
        /// Wake time is an absolute BSS TSF value.
        Bss = 0,
        /// Wake time is an offset from the TSF when the command is processed.
        Offset = 1,
        /// The firmware picks the wake time.
        Auto = 2,
    }
}

// ── WakeDurationUnit ─────────────────────────────────────────────

wire_enum! {
    /// Unit of the nominal minimum wake duration.
    #[derive(Default)]
    #[serde(rename_all = "snake_case")]
    pub enum WakeDurationUnit {
        /// 256 µs units.
        #[default]
        Micros256 = 0,
        /// 1024 µs (one TU) units.
        TimeUnit = 1,
    }
}

impl WakeDurationUnit {
    pub fn micros(self) -> u32 {
        match self {
            Self::Micros256 => 256,
            Self::TimeUnit => 1024,
        }
    }
}

// ── TwtUnit ──────────────────────────────────────────────────────

wire_enum! {
    /// TWT unit of the group assignment unit/offset word.
    pub enum TwtUnit {
        Us32 = 0,
        Us256 = 1,
        Us1024 = 2,
        Ms8 = 3,
        Ms32 = 4,
        Ms262 = 5,
        S1 = 6,
        S8 = 7,
        S33 = 8,
        S268 = 9,
        S1073 = 10,
        S8589 = 11,
    }
}

impl TwtUnit {
    /// Length of one unit in microseconds (32 µs × 8^n, with a ×4 step
    /// every other entry).
    pub fn micros(self) -> u64 {
        match self {
            Self::Us32 => 32,
            Self::Us256 => 256,
            Self::Us1024 => 1_024,
            Self::Ms8 => 8_192,
            Self::Ms32 => 32_768,
            Self::Ms262 => 262_144,
            Self::S1 => 1_048_576,
            Self::S8 => 8_388_608,
            Self::S33 => 33_554_432,
            Self::S268 => 268_435_456,
            Self::S1073 => 1_073_741_824,
            Self::S8589 => 8_589_934_592,
        }
    }
}

// ── NdpPagingAction ──────────────────────────────────────────────

wire_enum! {
    /// Action subfield of the NDP paging word.
    pub enum NdpPagingAction {
        /// Send a PS-Poll or uplink trigger frame.
        SendPsPollOrTrigger = 0,
        /// Wake at the time given by the minimum sleep duration.
        WakeAfterMinSleep = 1,
        /// Wake to receive the beacon.
        WakeForBeacon = 2,
        /// Wake to receive the DTIM beacon.
        WakeForDtim = 3,
        /// Wake at min sleep duration plus the paging frame's ASD.
        WakeAtIndicatedTime = 4,
    }
}

// ── BroadcastRecommendation ──────────────────────────────────────

wire_enum! {
    /// Frame recommendation for a broadcast TWT service period.
    #[derive(Default)]
    #[serde(rename_all = "snake_case")]
    pub enum BroadcastRecommendation {
        #[default]
        NoConstraints = 0,
        NoRandomAccessRu = 1,
        RandomAccessRu = 2,
        Recommendation3 = 3,
    }
}

// ── NextTwtSize ──────────────────────────────────────────────────

wire_enum! {
    /// Size of the Next TWT subfield of a TWT information field.
    pub enum NextTwtSize {
        Absent = 0,
        Bits32 = 1,
        Bits48 = 2,
        Bits64 = 3,
    }
}

impl NextTwtSize {
    pub fn byte_len(self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Bits32 => 4,
            Self::Bits48 => 6,
            Self::Bits64 => 8,
        }
    }

    /// Smallest size that can carry `value`.
    pub fn for_value(value: u64) -> Self {
        match value {
            0 => Self::Absent,
            v if v <= u32::MAX as u64 => Self::Bits32,
            v if v < 1 << 48 => Self::Bits48,
            _ => Self::Bits64,
        }
    }
}

// ── MacAddr ──────────────────────────────────────────────────────

/// A 6-byte peer hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const LEN: usize = 6;

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("mac address too short: {s}"))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|e| format!("bad octet {part:?} in {s}: {e}"))?;
        }
        if parts.next().is_some() {
            return Err(format!("mac address too long: {s}"));
        }
        Ok(Self(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_cmd_roundtrip() {
        for raw in 0u8..=7 {
            let cmd = SetupCmd::try_from(raw).unwrap();
            assert_eq!(u8::from(cmd), raw);
        }
        assert!(SetupCmd::try_from(8).is_err());
    }

    #[test]
    fn negotiation_type_id_width() {
        assert_eq!(NegotiationType::Individual.max_id(), 7);
        assert_eq!(NegotiationType::WakeTbtt.max_id(), 7);
        assert_eq!(NegotiationType::BroadcastInBeacon.max_id(), 31);
        assert_eq!(NegotiationType::Broadcast.max_id(), 31);
        assert!(NegotiationType::try_from(4).is_err());
    }

    #[test]
    fn unknown_variant_names_type() {
        let err = TwtUnit::try_from(12).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownVariant {
                type_name: "TwtUnit",
                value: 12
            }
        );
    }

    #[test]
    fn twt_unit_scale() {
        assert_eq!(TwtUnit::Us32.micros(), 32);
        assert_eq!(TwtUnit::S8589.micros(), 8_589_934_592);
    }

    #[test]
    fn setup_cmd_response_split() {
        assert!(!SetupCmd::Demand.is_response());
        assert!(SetupCmd::Accept.is_response());
        assert!(SetupCmd::Reject.is_response());
    }

    #[test]
    fn wire_defaults_are_zero() {
        assert_eq!(WakeDurationUnit::default(), WakeDurationUnit::Micros256);
        assert_eq!(u8::from(WakeDurationUnit::default()), 0);
        assert_eq!(
            BroadcastRecommendation::default(),
            BroadcastRecommendation::NoConstraints
        );
        assert_eq!(u8::from(BroadcastRecommendation::default()), 0);
    }

    #[test]
    fn next_twt_size_for_value() {
        assert_eq!(NextTwtSize::for_value(0), NextTwtSize::Absent);
        assert_eq!(NextTwtSize::for_value(0xFFFF_FFFF), NextTwtSize::Bits32);
        assert_eq!(NextTwtSize::for_value(1 << 40), NextTwtSize::Bits48);
        assert_eq!(NextTwtSize::for_value(u64::MAX), NextTwtSize::Bits64);
    }

    #[test]
    fn mac_addr_parse_and_display() {
        let mac: MacAddr = "02:1a:00:ff:10:0b".parse().unwrap();
        assert_eq!(mac.octets(), [0x02, 0x1a, 0x00, 0xff, 0x10, 0x0b]);
        assert_eq!(mac.to_string(), "02:1a:00:ff:10:0b");
        assert!("02:1a:00".parse::<MacAddr>().is_err());
        assert!("02:1a:00:ff:10:0b:01".parse::<MacAddr>().is_err());
        assert!("zz:1a:00:ff:10:0b".parse::<MacAddr>().is_err());
    }
}
