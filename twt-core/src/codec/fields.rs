//! Sub-byte fields of the TWT element and TWT action frames.
//!
//! Fields whose meaning depends on the negotiation type take that type as
//! a decode argument, so they cannot be interpreted before the
//! negotiation-type field of the enclosing structure has been read.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{check_width, ensure_len};
use crate::error::CodecError;
use crate::message::{
    BroadcastRecommendation, NdpPagingAction, NegotiationType, NextTwtSize, SetupCmd, TwtUnit,
    WakeDurationUnit,
};

// ── Control ──────────────────────────────────────────────────────

const CTRL_NDP_PAGING: u8 = 0x01;
const CTRL_RESPONDER_PM: u8 = 0x02;
const CTRL_NEGO_TYPE_MASK: u8 = 0x0C;
const CTRL_NEGO_TYPE_SHIFT: u8 = 2;
const CTRL_INFO_FRAME_DISABLED: u8 = 0x10;
const CTRL_WAKE_DUR_UNIT: u8 = 0x20;

// IEEE Std 802.11ax-2021, 9.4.2.199, Figure 9-687
/// Control byte of the TWT element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    pub ndp_paging: bool,
    pub responder_pm: bool,
    pub negotiation: NegotiationType,
    pub info_frame_disabled: bool,
    pub wake_duration_unit: WakeDurationUnit,
}

impl Control {
    pub fn new(negotiation: NegotiationType) -> Self {
        Self {
            ndp_paging: false,
            responder_pm: false,
            negotiation,
            info_frame_disabled: false,
            wake_duration_unit: WakeDurationUnit::Micros256,
        }
    }

    pub fn encode(&self) -> u8 {
        let mut raw = (self.negotiation as u8) << CTRL_NEGO_TYPE_SHIFT;
        if self.ndp_paging {
            raw |= CTRL_NDP_PAGING;
        }
        if self.responder_pm {
            raw |= CTRL_RESPONDER_PM;
        }
        if self.info_frame_disabled {
            raw |= CTRL_INFO_FRAME_DISABLED;
        }
        if self.wake_duration_unit == WakeDurationUnit::TimeUnit {
            raw |= CTRL_WAKE_DUR_UNIT;
        }
        raw
    }

    /// Decodes a control byte. Reserved bits 6-7 are ignored.
    pub fn decode(raw: u8) -> Result<Self, CodecError> {
        Ok(Self {
            ndp_paging: raw & CTRL_NDP_PAGING != 0,
            responder_pm: raw & CTRL_RESPONDER_PM != 0,
            negotiation: NegotiationType::try_from(
                (raw & CTRL_NEGO_TYPE_MASK) >> CTRL_NEGO_TYPE_SHIFT,
            )?,
            info_frame_disabled: raw & CTRL_INFO_FRAME_DISABLED != 0,
            wake_duration_unit: if raw & CTRL_WAKE_DUR_UNIT != 0 {
                WakeDurationUnit::TimeUnit
            } else {
                WakeDurationUnit::Micros256
            },
        })
    }
}

// ── RequestType ──────────────────────────────────────────────────

const REQ_TYPE_REQUEST: u16 = 0x0001;
const REQ_TYPE_SETUP_CMD_MASK: u16 = 0x000E;
const REQ_TYPE_SETUP_CMD_SHIFT: u16 = 1;
const REQ_TYPE_TRIGGER: u16 = 0x0010;
// Implicit (individual) or Last Broadcast Parameter Set (broadcast).
const REQ_TYPE_BIT5: u16 = 0x0020;
const REQ_TYPE_FLOW_TYPE: u16 = 0x0040;
// Flow identifier (individual) or Broadcast TWT Recommendation (broadcast).
const REQ_TYPE_ID_MASK: u16 = 0x0380;
const REQ_TYPE_ID_SHIFT: u16 = 7;
const REQ_TYPE_WAKE_EXP_MASK: u16 = 0x7C00;
const REQ_TYPE_WAKE_EXP_SHIFT: u16 = 10;
const REQ_TYPE_PROTECTION: u16 = 0x8000;

/// The negotiation-dependent part of the request type word (bit 5 and
/// bits 7-9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Individual {
        implicit: bool,
        flow_id: u8,
    },
    Broadcast {
        last_param_set: bool,
        recommendation: BroadcastRecommendation,
    },
}

impl Schedule {
    /// Whether this schedule is interpreted under `negotiation`.
    pub fn matches(&self, negotiation: NegotiationType) -> bool {
        matches!(self, Schedule::Broadcast { .. }) == negotiation.is_broadcast()
    }
}

// IEEE Std 802.11ax-2021, 9.4.2.199, Figure 9-688
/// Request type word of the TWT element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestType {
    pub request: bool,
    pub setup_cmd: SetupCmd,
    pub trigger: bool,
    /// Flow type bit: `true` for an unannounced TWT.
    pub unannounced: bool,
    pub schedule: Schedule,
    pub wake_interval_exponent: u8,
    pub protection: bool,
}

impl RequestType {
    pub fn encode(&self) -> Result<u16, CodecError> {
        check_width(
            "wake interval exponent",
            self.wake_interval_exponent as u64,
            5,
        )?;
        let (bit5, id) = match self.schedule {
            Schedule::Individual { implicit, flow_id } => {
                check_width("flow id", flow_id as u64, 3)?;
                (implicit, flow_id as u16)
            }
            Schedule::Broadcast {
                last_param_set,
                recommendation,
            } => (last_param_set, recommendation as u16),
        };

        let mut raw = ((self.setup_cmd as u16) << REQ_TYPE_SETUP_CMD_SHIFT)
            | (id << REQ_TYPE_ID_SHIFT)
            | ((self.wake_interval_exponent as u16) << REQ_TYPE_WAKE_EXP_SHIFT);
        if self.request {
            raw |= REQ_TYPE_REQUEST;
        }
        if self.trigger {
            raw |= REQ_TYPE_TRIGGER;
        }
        if bit5 {
            raw |= REQ_TYPE_BIT5;
        }
        if self.unannounced {
            raw |= REQ_TYPE_FLOW_TYPE;
        }
        if self.protection {
            raw |= REQ_TYPE_PROTECTION;
        }
        Ok(raw)
    }

    /// Decodes the word under the negotiation type already read from the
    /// element's control byte.
    pub fn decode(raw: u16, negotiation: NegotiationType) -> Result<Self, CodecError> {
        let bit5 = raw & REQ_TYPE_BIT5 != 0;
        let id = ((raw & REQ_TYPE_ID_MASK) >> REQ_TYPE_ID_SHIFT) as u8;
        let schedule = if negotiation.is_broadcast() {
            Schedule::Broadcast {
                last_param_set: bit5,
                recommendation: BroadcastRecommendation::try_from(id)?,
            }
        } else {
            Schedule::Individual {
                implicit: bit5,
                flow_id: id,
            }
        };

        Ok(Self {
            request: raw & REQ_TYPE_REQUEST != 0,
            setup_cmd: SetupCmd::try_from(
                ((raw & REQ_TYPE_SETUP_CMD_MASK) >> REQ_TYPE_SETUP_CMD_SHIFT) as u8,
            )?,
            trigger: raw & REQ_TYPE_TRIGGER != 0,
            unannounced: raw & REQ_TYPE_FLOW_TYPE != 0,
            schedule,
            wake_interval_exponent: ((raw & REQ_TYPE_WAKE_EXP_MASK) >> REQ_TYPE_WAKE_EXP_SHIFT)
                as u8,
            protection: raw & REQ_TYPE_PROTECTION != 0,
        })
    }
}

// ── Group Assignment ─────────────────────────────────────────────

const UNIT_MASK: u16 = 0x000F;
const OFFSET_MASK: u16 = 0xFFF0;
const OFFSET_SHIFT: u16 = 4;

/// TWT unit and offset word of the group assignment info.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitOffset {
    pub unit: TwtUnit,
    /// Offset in `unit`s, 12 bits.
    pub offset: u16,
}

impl UnitOffset {
    pub fn encode(&self) -> Result<u16, CodecError> {
        check_width("twt offset", self.offset as u64, 12)?;
        Ok((self.unit as u16) | (self.offset << OFFSET_SHIFT))
    }

    pub fn decode(raw: u16) -> Result<Self, CodecError> {
        Ok(Self {
            unit: TwtUnit::try_from((raw & UNIT_MASK) as u8)?,
            offset: (raw & OFFSET_MASK) >> OFFSET_SHIFT,
        })
    }

    /// The offset expressed in microseconds.
    pub fn offset_micros(&self) -> u64 {
        self.offset as u64 * self.unit.micros()
    }
}

const GROUP_ID_MASK: u8 = 0x7F;
const GROUP_ZERO_OFFSET_PRESENT: u8 = 0x80;
const ZERO_OFFSET_LEN: usize = 6;

/// Group assignment info in its short (3 octet) or long (9 octet) form.
/// The form is selected by the zero-offset-present bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAssignment {
    Short {
        group_id: u8,
        unit_offset: UnitOffset,
    },
    Long {
        group_id: u8,
        /// 48-bit zero offset of the group.
        zero_offset: u64,
        unit_offset: UnitOffset,
    },
}

impl GroupAssignment {
    pub const SHORT_LEN: usize = 3;
    pub const LONG_LEN: usize = 9;

    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Short { .. } => Self::SHORT_LEN,
            Self::Long { .. } => Self::LONG_LEN,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        match *self {
            Self::Short {
                group_id,
                unit_offset,
            } => {
                check_width("group id", group_id as u64, 7)?;
                let word = unit_offset.encode()?;
                buf.put_u8(group_id);
                buf.put_u16_le(word);
            }
            Self::Long {
                group_id,
                zero_offset,
                unit_offset,
            } => {
                check_width("group id", group_id as u64, 7)?;
                check_width("zero offset", zero_offset, 48)?;
                let word = unit_offset.encode()?;
                buf.put_u8(group_id | GROUP_ZERO_OFFSET_PRESENT);
                buf.put_slice(&zero_offset.to_le_bytes()[..ZERO_OFFSET_LEN]);
                buf.put_u16_le(word);
            }
        }
        Ok(())
    }

    /// Decodes either form from the start of `buf`, returning the number of
    /// bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        ensure_len(buf, 1)?;
        let head = buf[0];
        let group_id = head & GROUP_ID_MASK;
        let mut cur = &buf[1..];

        if head & GROUP_ZERO_OFFSET_PRESENT == 0 {
            ensure_len(buf, Self::SHORT_LEN)?;
            let unit_offset = UnitOffset::decode(cur.get_u16_le())?;
            return Ok((
                Self::Short {
                    group_id,
                    unit_offset,
                },
                Self::SHORT_LEN,
            ));
        }

        ensure_len(buf, Self::LONG_LEN)?;
        let mut zero = [0u8; 8];
        zero[..ZERO_OFFSET_LEN].copy_from_slice(&cur[..ZERO_OFFSET_LEN]);
        cur.advance(ZERO_OFFSET_LEN);
        let unit_offset = UnitOffset::decode(cur.get_u16_le())?;
        Ok((
            Self::Long {
                group_id,
                zero_offset: u64::from_le_bytes(zero),
                unit_offset,
            },
            Self::LONG_LEN,
        ))
    }
}

// ── Broadcast Info ───────────────────────────────────────────────

const BTWT_PERSIST_EXPO_MASK: u16 = 0x0007;
const BTWT_ID_MASK: u16 = 0x00F8;
const BTWT_ID_SHIFT: u16 = 3;
const BTWT_PERSIST_MANT_MASK: u16 = 0xFF00;
const BTWT_PERSIST_MANT_SHIFT: u16 = 8;

/// Persistence mantissa meaning "until torn down".
pub const BTWT_PERSIST_INDEFINITE: u8 = 0xFF;

// IEEE Std 802.11ax-2021, 9.4.2.199, Figure 9-690
/// Broadcast TWT info word.
///
/// The broadcast id is the 5-bit wire field; the 0xFF auto-assign sentinel
/// only exists in firmware descriptors and is rejected here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastInfo {
    pub persistence_exponent: u8,
    pub broadcast_id: u8,
    pub persistence_mantissa: u8,
}

impl BroadcastInfo {
    pub fn encode(&self) -> Result<u16, CodecError> {
        check_width("persistence exponent", self.persistence_exponent as u64, 3)?;
        check_width("broadcast twt id", self.broadcast_id as u64, 5)?;
        Ok((self.persistence_exponent as u16)
            | ((self.broadcast_id as u16) << BTWT_ID_SHIFT)
            | ((self.persistence_mantissa as u16) << BTWT_PERSIST_MANT_SHIFT))
    }

    pub fn decode(raw: u16) -> Self {
        Self {
            persistence_exponent: (raw & BTWT_PERSIST_EXPO_MASK) as u8,
            broadcast_id: ((raw & BTWT_ID_MASK) >> BTWT_ID_SHIFT) as u8,
            persistence_mantissa: ((raw & BTWT_PERSIST_MANT_MASK) >> BTWT_PERSIST_MANT_SHIFT)
                as u8,
        }
    }

    pub fn is_indefinite(&self) -> bool {
        self.persistence_mantissa == BTWT_PERSIST_INDEFINITE
    }
}

// ── NDP Paging ───────────────────────────────────────────────────

const NDP_PID_MASK: u32 = 0x0000_01FF;
const NDP_MAX_PERIOD_MASK: u32 = 0x0001_FE00;
const NDP_MAX_PERIOD_SHIFT: u32 = 9;
const NDP_PART_TSF_OFF_MASK: u32 = 0x001E_0000;
const NDP_PART_TSF_OFF_SHIFT: u32 = 17;
const NDP_ACTION_MASK: u32 = 0x00E0_0000;
const NDP_ACTION_SHIFT: u32 = 21;
const NDP_MIN_SLEEP_MASK: u32 = 0x3F00_0000;
const NDP_MIN_SLEEP_SHIFT: u32 = 24;

/// NDP paging word, present when the control byte's NDP paging bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdpPaging {
    pub pid: u16,
    pub max_paging_period: u8,
    pub partial_tsf_offset: u8,
    pub action: NdpPagingAction,
    pub min_sleep_duration: u8,
}

impl NdpPaging {
    pub const LEN: usize = 4;

    pub fn encode(&self) -> Result<u32, CodecError> {
        check_width("p-id", self.pid as u64, 9)?;
        check_width("partial tsf offset", self.partial_tsf_offset as u64, 4)?;
        check_width("min sleep duration", self.min_sleep_duration as u64, 6)?;
        Ok((self.pid as u32)
            | ((self.max_paging_period as u32) << NDP_MAX_PERIOD_SHIFT)
            | ((self.partial_tsf_offset as u32) << NDP_PART_TSF_OFF_SHIFT)
            | ((self.action as u32) << NDP_ACTION_SHIFT)
            | ((self.min_sleep_duration as u32) << NDP_MIN_SLEEP_SHIFT))
    }

    pub fn decode(raw: u32) -> Result<Self, CodecError> {
        Ok(Self {
            pid: (raw & NDP_PID_MASK) as u16,
            max_paging_period: ((raw & NDP_MAX_PERIOD_MASK) >> NDP_MAX_PERIOD_SHIFT) as u8,
            partial_tsf_offset: ((raw & NDP_PART_TSF_OFF_MASK) >> NDP_PART_TSF_OFF_SHIFT) as u8,
            action: NdpPagingAction::try_from(((raw & NDP_ACTION_MASK) >> NDP_ACTION_SHIFT) as u8)?,
            min_sleep_duration: ((raw & NDP_MIN_SLEEP_MASK) >> NDP_MIN_SLEEP_SHIFT) as u8,
        })
    }
}

// ── Teardown ─────────────────────────────────────────────────────

const TEARDOWN_FLOW_ID_MASK: u8 = 0x07;
const TEARDOWN_BTWT_ID_MASK: u8 = 0x1F;
const TEARDOWN_NEGO_TYPE_MASK: u8 = 0x60;
const TEARDOWN_NEGO_TYPE_SHIFT: u8 = 5;
const TEARDOWN_ALL_TWT: u8 = 0x80;

/// TWT flow field of a teardown frame.
///
/// `id` is a 3-bit flow id for individual / wake-TBTT negotiation and a
/// 5-bit broadcast id for the broadcast types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownField {
    pub negotiation: NegotiationType,
    pub id: u8,
    pub teardown_all: bool,
}

impl TeardownField {
    pub fn encode(&self) -> Result<u8, CodecError> {
        let max = self.negotiation.max_id();
        if self.id > max {
            return Err(CodecError::out_of_range("teardown id", self.id, max as u64));
        }
        let mut raw = self.id | ((self.negotiation as u8) << TEARDOWN_NEGO_TYPE_SHIFT);
        if self.teardown_all {
            raw |= TEARDOWN_ALL_TWT;
        }
        Ok(raw)
    }

    /// Reads the negotiation type first, then the id at the width it implies.
    pub fn decode(raw: u8) -> Result<Self, CodecError> {
        let negotiation =
            NegotiationType::try_from((raw & TEARDOWN_NEGO_TYPE_MASK) >> TEARDOWN_NEGO_TYPE_SHIFT)?;
        let id_mask = if negotiation.is_broadcast() {
            TEARDOWN_BTWT_ID_MASK
        } else {
            TEARDOWN_FLOW_ID_MASK
        };
        Ok(Self {
            negotiation,
            id: raw & id_mask,
            teardown_all: raw & TEARDOWN_ALL_TWT != 0,
        })
    }
}

// ── TWT Information ──────────────────────────────────────────────

const INFO_FLOW_ID_MASK: u8 = 0x07;
const INFO_RESP_REQ: u8 = 0x08;
const INFO_NEXT_TWT_REQ: u8 = 0x10;
const INFO_NEXT_TWT_SIZE_MASK: u8 = 0x60;
const INFO_NEXT_TWT_SIZE_SHIFT: u8 = 5;
const INFO_ALL_TWT: u8 = 0x80;

// IEEE Std 802.11ax-2021, 9.4.1.60, Figure 9-179
/// First byte of the TWT information field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoField {
    pub flow_id: u8,
    pub response_requested: bool,
    pub next_twt_request: bool,
    pub next_twt_size: NextTwtSize,
    pub all_twt: bool,
}

impl InfoField {
    pub fn encode(&self) -> Result<u8, CodecError> {
        check_width("flow id", self.flow_id as u64, 3)?;
        let mut raw = self.flow_id | ((self.next_twt_size as u8) << INFO_NEXT_TWT_SIZE_SHIFT);
        if self.response_requested {
            raw |= INFO_RESP_REQ;
        }
        if self.next_twt_request {
            raw |= INFO_NEXT_TWT_REQ;
        }
        if self.all_twt {
            raw |= INFO_ALL_TWT;
        }
        Ok(raw)
    }

    pub fn decode(raw: u8) -> Result<Self, CodecError> {
        Ok(Self {
            flow_id: raw & INFO_FLOW_ID_MASK,
            response_requested: raw & INFO_RESP_REQ != 0,
            next_twt_request: raw & INFO_NEXT_TWT_REQ != 0,
            next_twt_size: NextTwtSize::try_from(
                (raw & INFO_NEXT_TWT_SIZE_MASK) >> INFO_NEXT_TWT_SIZE_SHIFT,
            )?,
            all_twt: raw & INFO_ALL_TWT != 0,
        })
    }
}

/// TWT information field: the flag byte plus the variable-length Next TWT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwtInformation {
    pub field: InfoField,
    pub next_twt: Option<u64>,
}

impl TwtInformation {
    /// Suspends or reschedules `flow_id`; the Next TWT size is chosen from
    /// the value.
    pub fn new(flow_id: u8, next_twt: Option<u64>) -> Self {
        let next_twt_size = next_twt.map_or(NextTwtSize::Absent, NextTwtSize::for_value);
        Self {
            field: InfoField {
                flow_id,
                response_requested: false,
                next_twt_request: false,
                next_twt_size,
                all_twt: false,
            },
            next_twt: next_twt.filter(|_| next_twt_size != NextTwtSize::Absent),
        }
    }

    pub fn encoded_len(&self) -> usize {
        1 + self.field.next_twt_size.byte_len()
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        let size = self.field.next_twt_size.byte_len();
        let value = self.next_twt.unwrap_or(0);
        if size < 8 {
            check_width("next twt", value, size as u32 * 8)?;
        }
        if size > 0 && self.next_twt.is_none() {
            return Err(CodecError::LengthMismatch {
                declared: size,
                available: 0,
            });
        }
        buf.put_u8(self.field.encode()?);
        buf.put_slice(&value.to_le_bytes()[..size]);
        Ok(())
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        ensure_len(buf, 1)?;
        let field = InfoField::decode(buf[0])?;
        let size = field.next_twt_size.byte_len();
        ensure_len(buf, 1 + size)?;
        let next_twt = if size == 0 {
            None
        } else {
            let mut raw = [0u8; 8];
            raw[..size].copy_from_slice(&buf[1..1 + size]);
            Some(u64::from_le_bytes(raw))
        };
        Ok((Self { field, next_twt }, 1 + size))
    }
}
