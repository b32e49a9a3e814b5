//! The TWT information element.
//!
//! ```text
//! individual (negotiation 0/1):
//!   id:u8 len:u8 control:u8 request_type:u16 target_wake_time:u64
//!   [group_assignment: 3|9] min_wake_dur:u8 mantissa:u16 channel:u8
//!   [ndp_paging:u32]
//!
//! broadcast (negotiation 2/3):
//!   id:u8 len:u8 control:u8
//!   { request_type:u16 target_wake_time:u16 min_wake_dur:u8
//!     mantissa:u16 broadcast_info:u16 }+      (until last-param-set)
//! ```
//!
//! The group assignment of an individual element has no presence bit of
//! its own; it is recognised from the bytes left over once the fixed
//! fields and the (control-indicated) NDP paging word are accounted for.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::fields::{
    BroadcastInfo, Control, GroupAssignment, NdpPaging, RequestType, Schedule,
};
use crate::codec::{broadcast_wake_time, ensure_len};
use crate::error::{CodecError, TwtError};
use crate::params::{AUTO_ASSIGN_ID, TwtParameters};

/// Element id of the TWT element.
pub const TWT_ELEMENT_ID: u8 = 216;

const ELEMENT_HEADER_LEN: usize = 2;
// min wake duration, mantissa, channel
const INDIVIDUAL_TAIL_LEN: usize = 4;
// control, request type, target wake time
const INDIVIDUAL_HEAD_LEN: usize = 1 + 2 + 8;

/// Body of an individual (or wake TBTT) TWT element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndividualTwt {
    pub request_type: RequestType,
    pub target_wake_time: u64,
    pub group_assignment: Option<GroupAssignment>,
    /// Nominal minimum wake duration, in the control byte's unit.
    pub min_wake_duration: u8,
    pub wake_interval_mantissa: u16,
    pub channel: u8,
    pub ndp_paging: Option<NdpPaging>,
}

/// One broadcast TWT parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastParamSet {
    pub request_type: RequestType,
    /// 16-bit broadcast target wake time, see [`broadcast_wake_time`].
    pub target_wake_time: u16,
    pub min_wake_duration: u8,
    pub wake_interval_mantissa: u16,
    pub info: BroadcastInfo,
}

impl BroadcastParamSet {
    pub const LEN: usize = 9;

    fn is_last(&self) -> bool {
        matches!(
            self.request_type.schedule,
            Schedule::Broadcast {
                last_param_set: true,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementBody {
    Individual(IndividualTwt),
    Broadcast(Vec<BroadcastParamSet>),
}

/// A decoded TWT element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwtElement {
    pub control: Control,
    pub body: ElementBody,
}

impl TwtElement {
    /// Builds the single-schedule element a requesting STA sends for
    /// `params`.
    pub fn from_parameters(params: &TwtParameters) -> Result<Self, TwtError> {
        let mut control = Control::new(params.negotiation_type);
        control.info_frame_disabled = params.info_frame_disabled;
        control.wake_duration_unit = params.wake_duration_unit;

        let body = if params.negotiation_type.is_broadcast() {
            if params.broadcast_id == AUTO_ASSIGN_ID {
                return Err(TwtError::InvalidParameter(
                    "auto-assigned broadcast id cannot be carried in a TWT element".into(),
                ));
            }
            let request_type = RequestType {
                request: params.requestor,
                setup_cmd: params.setup_cmd,
                trigger: params.trigger,
                unannounced: params.flow_type_unannounced,
                schedule: Schedule::Broadcast {
                    last_param_set: true,
                    recommendation: params.broadcast_recommendation,
                },
                wake_interval_exponent: params.exponent,
                protection: params.protection,
            };
            ElementBody::Broadcast(vec![BroadcastParamSet {
                request_type,
                target_wake_time: broadcast_wake_time(params.target_wake_time),
                min_wake_duration: params.min_wake_duration,
                wake_interval_mantissa: params.mantissa,
                info: BroadcastInfo {
                    persistence_exponent: 0,
                    broadcast_id: params.broadcast_id,
                    persistence_mantissa: params.broadcast_persistence,
                },
            }])
        } else {
            if params.flow_id == AUTO_ASSIGN_ID {
                return Err(TwtError::InvalidParameter(
                    "auto-assigned flow id cannot be carried in a TWT element".into(),
                ));
            }
            ElementBody::Individual(IndividualTwt {
                request_type: RequestType {
                    request: params.requestor,
                    setup_cmd: params.setup_cmd,
                    trigger: params.trigger,
                    unannounced: params.flow_type_unannounced,
                    schedule: Schedule::Individual {
                        implicit: params.implicit,
                        flow_id: params.flow_id,
                    },
                    wake_interval_exponent: params.exponent,
                    protection: params.protection,
                },
                target_wake_time: params.target_wake_time,
                group_assignment: None,
                min_wake_duration: params.min_wake_duration,
                wake_interval_mantissa: params.mantissa,
                channel: params.channel,
                ndp_paging: None,
            })
        };

        let element = Self { control, body };
        element.check_consistency()?;
        Ok(element)
    }

    fn check_consistency(&self) -> Result<(), CodecError> {
        let negotiation = self.control.negotiation;
        match &self.body {
            ElementBody::Individual(twt) => {
                if negotiation.is_broadcast() || !twt.request_type.schedule.matches(negotiation) {
                    return Err(CodecError::IllegalFlags(
                        "individual schedule under a broadcast negotiation type",
                    ));
                }
                if self.control.ndp_paging != twt.ndp_paging.is_some() {
                    return Err(CodecError::IllegalFlags(
                        "ndp paging indication disagrees with element body",
                    ));
                }
            }
            ElementBody::Broadcast(sets) => {
                if !negotiation.is_broadcast() {
                    return Err(CodecError::IllegalFlags(
                        "broadcast parameter sets under an individual negotiation type",
                    ));
                }
                if self.control.ndp_paging {
                    return Err(CodecError::IllegalFlags(
                        "ndp paging is not carried by broadcast elements",
                    ));
                }
                let Some((last, rest)) = sets.split_last() else {
                    return Err(CodecError::IllegalFlags("broadcast element without parameter sets"));
                };
                if !last.is_last() || rest.iter().any(|set| set.is_last()) {
                    return Err(CodecError::IllegalFlags(
                        "last broadcast parameter set must be flagged exactly once, at the end",
                    ));
                }
                if sets.iter().any(|set| !set.request_type.schedule.matches(negotiation)) {
                    return Err(CodecError::IllegalFlags(
                        "individual schedule inside a broadcast element",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Serializes the element including its id and length octets.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        self.check_consistency()?;

        let mut body = BytesMut::with_capacity(32);
        body.put_u8(self.control.encode());
        match &self.body {
            ElementBody::Individual(twt) => {
                body.put_u16_le(twt.request_type.encode()?);
                body.put_u64_le(twt.target_wake_time);
                if let Some(group) = &twt.group_assignment {
                    group.encode(&mut body)?;
                }
                body.put_u8(twt.min_wake_duration);
                body.put_u16_le(twt.wake_interval_mantissa);
                body.put_u8(twt.channel);
                if let Some(ndp) = &twt.ndp_paging {
                    body.put_u32_le(ndp.encode()?);
                }
            }
            ElementBody::Broadcast(sets) => {
                for set in sets {
                    body.put_u16_le(set.request_type.encode()?);
                    body.put_u16_le(set.target_wake_time);
                    body.put_u8(set.min_wake_duration);
                    body.put_u16_le(set.wake_interval_mantissa);
                    body.put_u16_le(set.info.encode()?);
                }
            }
        }

        let len = u8::try_from(body.len())
            .map_err(|_| CodecError::out_of_range("element length", body.len() as u64, 255))?;
        let mut out = BytesMut::with_capacity(ELEMENT_HEADER_LEN + body.len());
        out.put_u8(TWT_ELEMENT_ID);
        out.put_u8(len);
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }

    /// Decodes an element from the start of `buf`, returning it with the
    /// number of bytes consumed (header included).
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        ensure_len(buf, ELEMENT_HEADER_LEN)?;
        if buf[0] != TWT_ELEMENT_ID {
            return Err(CodecError::UnexpectedElement(buf[0]));
        }
        let len = buf[1] as usize;
        let total = ELEMENT_HEADER_LEN + len;
        if buf.len() < total {
            return Err(CodecError::LengthMismatch {
                declared: len,
                available: buf.len() - ELEMENT_HEADER_LEN,
            });
        }
        let body = &buf[ELEMENT_HEADER_LEN..total];
        ensure_len(body, 1)?;

        // The control byte carries the negotiation type every later field
        // depends on.
        let control = Control::decode(body[0])?;
        let rest = &body[1..];
        let body = if control.negotiation.is_broadcast() {
            ElementBody::Broadcast(decode_broadcast_sets(rest, &control)?)
        } else {
            ElementBody::Individual(decode_individual(rest, &control)?)
        };

        let element = Self { control, body };
        element.check_consistency()?;
        Ok((element, total))
    }
}

fn decode_individual(mut buf: &[u8], control: &Control) -> Result<IndividualTwt, CodecError> {
    let ndp_len = if control.ndp_paging { NdpPaging::LEN } else { 0 };
    let fixed = INDIVIDUAL_HEAD_LEN - 1 + INDIVIDUAL_TAIL_LEN + ndp_len;
    ensure_len(buf, fixed)?;

    let request_type = RequestType::decode(buf.get_u16_le(), control.negotiation)?;
    let target_wake_time = buf.get_u64_le();

    let group_assignment = match buf.len() - (INDIVIDUAL_TAIL_LEN + ndp_len) {
        0 => None,
        GroupAssignment::SHORT_LEN | GroupAssignment::LONG_LEN => {
            let (group, used) = GroupAssignment::decode(buf)?;
            buf.advance(used);
            Some(group)
        }
        extra => {
            return Err(CodecError::LengthMismatch {
                declared: fixed + extra,
                available: fixed,
            });
        }
    };
    // A group whose form disagrees with its length leaves the cursor short.
    ensure_len(buf, INDIVIDUAL_TAIL_LEN + ndp_len)?;

    let min_wake_duration = buf.get_u8();
    let wake_interval_mantissa = buf.get_u16_le();
    let channel = buf.get_u8();
    let ndp_paging = if control.ndp_paging {
        Some(NdpPaging::decode(buf.get_u32_le())?)
    } else {
        None
    };
    if !buf.is_empty() {
        return Err(CodecError::LengthMismatch {
            declared: fixed,
            available: fixed + buf.len(),
        });
    }

    Ok(IndividualTwt {
        request_type,
        target_wake_time,
        group_assignment,
        min_wake_duration,
        wake_interval_mantissa,
        channel,
        ndp_paging,
    })
}

fn decode_broadcast_sets(
    mut buf: &[u8],
    control: &Control,
) -> Result<Vec<BroadcastParamSet>, CodecError> {
    let mut sets = Vec::new();
    loop {
        ensure_len(buf, BroadcastParamSet::LEN)?;
        let set = BroadcastParamSet {
            request_type: RequestType::decode(buf.get_u16_le(), control.negotiation)?,
            target_wake_time: buf.get_u16_le(),
            min_wake_duration: buf.get_u8(),
            wake_interval_mantissa: buf.get_u16_le(),
            info: BroadcastInfo::decode(buf.get_u16_le()),
        };
        let last = set.is_last();
        sets.push(set);
        if last {
            break;
        }
    }
    if !buf.is_empty() {
        return Err(CodecError::LengthMismatch {
            declared: sets.len() * BroadcastParamSet::LEN,
            available: sets.len() * BroadcastParamSet::LEN + buf.len(),
        });
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fields::UnitOffset;
    use crate::message::{
        BroadcastRecommendation, NdpPagingAction, NegotiationType, SetupCmd, TwtUnit,
        WakeDurationUnit,
    };

    fn individual_request(flow_id: u8) -> RequestType {
        RequestType {
            request: true,
            setup_cmd: SetupCmd::Suggest,
            trigger: false,
            unannounced: true,
            schedule: Schedule::Individual {
                implicit: true,
                flow_id,
            },
            wake_interval_exponent: 12,
            protection: false,
        }
    }

    fn broadcast_request(last_param_set: bool) -> RequestType {
        RequestType {
            request: true,
            setup_cmd: SetupCmd::Request,
            trigger: true,
            unannounced: false,
            schedule: Schedule::Broadcast {
                last_param_set,
                recommendation: BroadcastRecommendation::NoConstraints,
            },
            wake_interval_exponent: 9,
            protection: false,
        }
    }

    #[test]
    fn individual_element_wire_layout() {
        let element = TwtElement {
            control: Control::new(NegotiationType::Individual),
            body: ElementBody::Individual(IndividualTwt {
                request_type: individual_request(2),
                target_wake_time: 0x1122_3344_5566_7788,
                group_assignment: None,
                min_wake_duration: 0x40,
                wake_interval_mantissa: 0x0200,
                channel: 0,
                ndp_paging: None,
            }),
        };
        let bytes = element.encode().unwrap();
        assert_eq!(bytes[0], TWT_ELEMENT_ID);
        assert_eq!(bytes[1] as usize, bytes.len() - 2);
        assert_eq!(bytes.len(), 2 + 1 + 2 + 8 + 4);
        assert_eq!(bytes[2], 0x00);
        assert_eq!(&bytes[5..13], &0x1122_3344_5566_7788u64.to_le_bytes());

        let (decoded, used) = TwtElement::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, element);
    }

    #[test]
    fn individual_element_optional_fields() {
        let mut control = Control::new(NegotiationType::WakeTbtt);
        control.ndp_paging = true;
        control.wake_duration_unit = WakeDurationUnit::TimeUnit;
        let element = TwtElement {
            control,
            body: ElementBody::Individual(IndividualTwt {
                request_type: individual_request(7),
                target_wake_time: 42,
                group_assignment: Some(GroupAssignment::Long {
                    group_id: 3,
                    zero_offset: 0xABCDEF,
                    unit_offset: UnitOffset {
                        unit: TwtUnit::Us1024,
                        offset: 99,
                    },
                }),
                min_wake_duration: 1,
                wake_interval_mantissa: 1,
                channel: 6,
                ndp_paging: Some(NdpPaging {
                    pid: 17,
                    max_paging_period: 4,
                    partial_tsf_offset: 2,
                    action: NdpPagingAction::WakeForDtim,
                    min_sleep_duration: 9,
                }),
            }),
        };
        let bytes = element.encode().unwrap();
        assert_eq!(bytes.len(), 2 + 11 + 9 + 4 + 4);
        let (decoded, _) = TwtElement::decode(&bytes).unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn broadcast_element_multiple_sets() {
        let set = |id: u8, last: bool| BroadcastParamSet {
            request_type: broadcast_request(last),
            target_wake_time: 0x0F00 + id as u16,
            min_wake_duration: 0x20,
            wake_interval_mantissa: 0x0400,
            info: BroadcastInfo {
                persistence_exponent: 0,
                broadcast_id: id,
                persistence_mantissa: 10,
            },
        };
        let element = TwtElement {
            control: Control::new(NegotiationType::Broadcast),
            body: ElementBody::Broadcast(vec![set(1, false), set(2, true)]),
        };
        let bytes = element.encode().unwrap();
        assert_eq!(bytes.len(), 2 + 1 + 2 * BroadcastParamSet::LEN);
        assert_eq!(bytes[2], 0x0C);
        let (decoded, _) = TwtElement::decode(&bytes).unwrap();
        assert_eq!(decoded, element);
    }

    #[test]
    fn broadcast_last_flag_must_terminate() {
        let element = TwtElement {
            control: Control::new(NegotiationType::Broadcast),
            body: ElementBody::Broadcast(vec![BroadcastParamSet {
                request_type: broadcast_request(false),
                target_wake_time: 0,
                min_wake_duration: 0,
                wake_interval_mantissa: 0,
                info: BroadcastInfo {
                    persistence_exponent: 0,
                    broadcast_id: 0,
                    persistence_mantissa: 0,
                },
            }]),
        };
        assert!(element.encode().is_err());
    }

    #[test]
    fn decode_rejects_bad_lengths() {
        assert_eq!(
            TwtElement::decode(&[221, 0]).unwrap_err(),
            CodecError::UnexpectedElement(221)
        );
        assert!(matches!(
            TwtElement::decode(&[TWT_ELEMENT_ID, 20, 0]).unwrap_err(),
            CodecError::LengthMismatch { .. }
        ));

        // individual body with two stray bytes where no group form fits
        let mut raw = vec![TWT_ELEMENT_ID, 17, 0x00];
        raw.extend_from_slice(&[0u8; 16]);
        assert!(TwtElement::decode(&raw).is_err());
    }

    #[test]
    fn from_parameters_individual() {
        let params = TwtParameters {
            flow_id: 3,
            target_wake_time: 1_000_000,
            ..TwtParameters::default()
        };
        let element = TwtElement::from_parameters(&params).unwrap();
        let ElementBody::Individual(twt) = &element.body else {
            panic!("expected individual body");
        };
        assert_eq!(twt.target_wake_time, 1_000_000);
        assert_eq!(
            twt.request_type.schedule,
            Schedule::Individual {
                implicit: params.implicit,
                flow_id: 3
            }
        );
    }

    #[test]
    fn from_parameters_rejects_auto_assign() {
        let params = TwtParameters {
            flow_id: AUTO_ASSIGN_ID,
            ..TwtParameters::default()
        };
        assert!(matches!(
            TwtElement::from_parameters(&params),
            Err(TwtError::InvalidParameter(_))
        ));
    }

    #[test]
    fn from_parameters_broadcast() {
        let params = TwtParameters {
            negotiation_type: NegotiationType::Broadcast,
            broadcast_id: 9,
            target_wake_time: 0x0000_0000_0123_4400,
            ..TwtParameters::default()
        };
        let element = TwtElement::from_parameters(&params).unwrap();
        let ElementBody::Broadcast(sets) = &element.body else {
            panic!("expected broadcast body");
        };
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].info.broadcast_id, 9);
        assert_eq!(sets[0].target_wake_time, broadcast_wake_time(0x0123_4400));
    }
}
