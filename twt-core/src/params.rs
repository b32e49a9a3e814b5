//! The request descriptor handed in by the user-request layer.

use serde::{Deserialize, Serialize};

use crate::codec::fields::BTWT_PERSIST_INDEFINITE;
use crate::error::TwtError;
use crate::flags::FlowFlags;
use crate::message::{
    BroadcastRecommendation, NegotiationType, SetupCmd, TwtOperation, WakeDurationUnit,
    WakeTimeType,
};

/// Flow id / broadcast id value asking the peer to assign the id.
pub const AUTO_ASSIGN_ID: u8 = 0xFF;

const MAX_WAKE_INTERVAL_EXPONENT: u8 = 31;

/// Parameters of one TWT setup or teardown request.
///
/// A zero `target_wake_time` means "not given"; see
/// [`TwtParameters::wake_time_type`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwtParameters {
    pub operation: TwtOperation,
    pub negotiation_type: NegotiationType,
    pub setup_cmd: SetupCmd,
    pub dialog_token: u8,
    /// Absolute target wake time (BSS TSF, µs).
    pub target_wake_time: u64,
    /// Target wake time relative to the TSF at processing time (µs).
    pub wake_time_offset: u64,
    /// Nominal minimum wake duration in `wake_duration_unit`s.
    pub min_wake_duration: u8,
    pub exponent: u8,
    pub mantissa: u16,
    /// `true` when this STA is the TWT requesting STA.
    pub requestor: bool,
    pub trigger: bool,
    pub implicit: bool,
    /// Flow type bit: `true` for an unannounced TWT.
    pub flow_type_unannounced: bool,
    pub flow_id: u8,
    pub broadcast_id: u8,
    pub protection: bool,
    pub channel: u8,
    pub info_frame_disabled: bool,
    pub wake_duration_unit: WakeDurationUnit,
    pub teardown_all: bool,
    pub broadcast_recommendation: BroadcastRecommendation,
    /// Broadcast persistence mantissa; 0xFF keeps the schedule until
    /// torn down.
    pub broadcast_persistence: u8,
}

impl Default for TwtParameters {
    fn default() -> Self {
        Self {
            operation: TwtOperation::Setup,
            negotiation_type: NegotiationType::Individual,
            setup_cmd: SetupCmd::Request,
            dialog_token: 0,
            target_wake_time: 0,
            wake_time_offset: 0,
            min_wake_duration: 0,
            exponent: 0,
            mantissa: 0,
            requestor: true,
            trigger: false,
            implicit: true,
            flow_type_unannounced: false,
            flow_id: 0,
            broadcast_id: 0,
            protection: false,
            channel: 0,
            info_frame_disabled: false,
            wake_duration_unit: WakeDurationUnit::Micros256,
            teardown_all: false,
            broadcast_recommendation: BroadcastRecommendation::NoConstraints,
            broadcast_persistence: BTWT_PERSIST_INDEFINITE,
        }
    }
}

impl TwtParameters {
    /// A teardown request for the session these setup parameters describe.
    pub fn teardown_of(&self) -> Self {
        Self {
            operation: TwtOperation::Teardown,
            teardown_all: false,
            ..self.clone()
        }
    }

    /// The id that keys this request: the broadcast id for broadcast
    /// negotiation, the flow id otherwise.
    pub fn session_id_value(&self) -> u8 {
        if self.negotiation_type.is_broadcast() {
            self.broadcast_id
        } else {
            self.flow_id
        }
    }

    pub fn is_auto_assigned(&self) -> bool {
        self.session_id_value() == AUTO_ASSIGN_ID
    }

    fn check_ids(&self) -> Result<(), TwtError> {
        if self.flow_id > NegotiationType::Individual.max_id() && self.flow_id != AUTO_ASSIGN_ID {
            return Err(TwtError::InvalidParameter(format!(
                "flow id {} outside 0..=7",
                self.flow_id
            )));
        }
        if self.broadcast_id > NegotiationType::Broadcast.max_id()
            && self.broadcast_id != AUTO_ASSIGN_ID
        {
            return Err(TwtError::InvalidParameter(format!(
                "broadcast id {} outside 0..=31",
                self.broadcast_id
            )));
        }
        Ok(())
    }

    /// Checks every value a setup descriptor carries.
    pub fn validate_setup(&self) -> Result<(), TwtError> {
        self.check_ids()?;
        if self.exponent > MAX_WAKE_INTERVAL_EXPONENT {
            return Err(TwtError::InvalidParameter(format!(
                "wake interval exponent {} does not fit 5 bits",
                self.exponent
            )));
        }
        self.wake_interval_us()?;
        self.flow_flags()?;
        Ok(())
    }

    /// Checks the values a teardown descriptor carries.
    pub fn validate_teardown(&self) -> Result<(), TwtError> {
        self.check_ids()
    }

    /// Flow flags implied by the request, rejecting illegal combinations.
    pub fn flow_flags(&self) -> Result<FlowFlags, TwtError> {
        let mut flags = FlowFlags::empty();
        flags.set(FlowFlags::REQUEST, self.requestor);
        flags.set(FlowFlags::TRIGGER, self.trigger);
        flags.set(FlowFlags::IMPLICIT, self.implicit);
        flags.set(FlowFlags::UNANNOUNCED, self.flow_type_unannounced);
        flags.set(FlowFlags::PROTECT, self.protection);
        flags.set(
            FlowFlags::WAKE_TBTT_NEGO,
            self.negotiation_type == NegotiationType::WakeTbtt,
        );
        flags.set(FlowFlags::BROADCAST, self.negotiation_type.is_broadcast());
        flags
            .validate()
            .map_err(|e| TwtError::InvalidParameter(e.to_string()))
    }

    /// Nominal minimum wake duration in microseconds.
    pub fn wake_duration_us(&self) -> u32 {
        self.min_wake_duration as u32 * self.wake_duration_unit.micros()
    }

    /// Wake interval in microseconds, `mantissa << exponent`.
    pub fn wake_interval_us(&self) -> Result<u32, TwtError> {
        let interval = (self.mantissa as u64) << (self.exponent.min(MAX_WAKE_INTERVAL_EXPONENT));
        u32::try_from(interval).map_err(|_| {
            TwtError::InvalidParameter(format!(
                "wake interval {} << {} overflows 32 bits",
                self.mantissa, self.exponent
            ))
        })
    }

    pub fn wake_time_type(&self) -> WakeTimeType {
        if self.target_wake_time != 0 {
            WakeTimeType::Bss
        } else if self.wake_time_offset != 0 {
            WakeTimeType::Offset
        } else {
            WakeTimeType::Auto
        }
    }

    /// The wake time value matching [`Self::wake_time_type`].
    pub fn wake_time(&self) -> u64 {
        match self.wake_time_type() {
            WakeTimeType::Bss => self.target_wake_time,
            WakeTimeType::Offset => self.wake_time_offset,
            WakeTimeType::Auto => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let params = TwtParameters::default();
        assert!(params.validate_setup().is_ok());
        assert_eq!(params.wake_time_type(), WakeTimeType::Auto);
        assert!(!params.is_auto_assigned());
    }

    #[test]
    fn id_ranges() {
        let bad_flow = TwtParameters {
            flow_id: 8,
            ..TwtParameters::default()
        };
        assert!(matches!(
            bad_flow.validate_setup(),
            Err(TwtError::InvalidParameter(_))
        ));

        let auto = TwtParameters {
            flow_id: AUTO_ASSIGN_ID,
            ..TwtParameters::default()
        };
        assert!(auto.validate_setup().is_ok());
        assert!(auto.is_auto_assigned());

        let bad_bcast = TwtParameters {
            broadcast_id: 32,
            ..TwtParameters::default()
        };
        assert!(bad_bcast.validate_teardown().is_err());
    }

    #[test]
    fn exponent_must_fit_five_bits() {
        let params = TwtParameters {
            exponent: 32,
            ..TwtParameters::default()
        };
        assert!(params.validate_setup().is_err());
    }

    #[test]
    fn wake_duration_units() {
        let mut params = TwtParameters {
            min_wake_duration: 10,
            ..TwtParameters::default()
        };
        assert_eq!(params.wake_duration_us(), 2560);
        params.wake_duration_unit = WakeDurationUnit::TimeUnit;
        assert_eq!(params.wake_duration_us(), 10240);
    }

    #[test]
    fn wake_interval_overflow() {
        let ok = TwtParameters {
            mantissa: 0x8000,
            exponent: 16,
            ..TwtParameters::default()
        };
        assert_eq!(ok.wake_interval_us().unwrap(), 0x8000_0000);

        let overflow = TwtParameters {
            mantissa: 0x8000,
            exponent: 17,
            ..TwtParameters::default()
        };
        assert!(matches!(
            overflow.wake_interval_us(),
            Err(TwtError::InvalidParameter(_))
        ));
    }

    #[test]
    fn wake_time_type_precedence() {
        let params = TwtParameters {
            target_wake_time: 5,
            wake_time_offset: 9,
            ..TwtParameters::default()
        };
        assert_eq!(params.wake_time_type(), WakeTimeType::Bss);
        assert_eq!(params.wake_time(), 5);

        let params = TwtParameters {
            wake_time_offset: 9,
            ..TwtParameters::default()
        };
        assert_eq!(params.wake_time_type(), WakeTimeType::Offset);
        assert_eq!(params.wake_time(), 9);
    }

    #[test]
    fn flow_flags_from_request() {
        let params = TwtParameters {
            negotiation_type: NegotiationType::Broadcast,
            trigger: true,
            implicit: false,
            ..TwtParameters::default()
        };
        let flags = params.flow_flags().unwrap();
        assert_eq!(
            flags,
            FlowFlags::REQUEST | FlowFlags::TRIGGER | FlowFlags::BROADCAST
        );

        let tbtt = TwtParameters {
            negotiation_type: NegotiationType::WakeTbtt,
            ..TwtParameters::default()
        };
        assert!(tbtt.flow_flags().unwrap().contains(FlowFlags::WAKE_TBTT_NEGO));
    }

    #[test]
    fn session_id_follows_negotiation() {
        let params = TwtParameters {
            flow_id: 2,
            broadcast_id: 17,
            ..TwtParameters::default()
        };
        assert_eq!(params.session_id_value(), 2);
        let params = TwtParameters {
            negotiation_type: NegotiationType::BroadcastInBeacon,
            ..params
        };
        assert_eq!(params.session_id_value(), 17);
    }

    #[test]
    fn teardown_of_keeps_identity() {
        let setup = TwtParameters {
            flow_id: 4,
            teardown_all: true,
            ..TwtParameters::default()
        };
        let td = setup.teardown_of();
        assert_eq!(td.operation, TwtOperation::Teardown);
        assert_eq!(td.flow_id, 4);
        assert!(!td.teardown_all);
    }
}
