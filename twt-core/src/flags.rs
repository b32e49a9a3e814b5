//! Flow attributes carried in the setup descriptor.

use bitflags::bitflags;

use crate::error::CodecError;

bitflags! {
    /// Flow flags of a TWT setup descriptor.
    ///
    /// The descriptor field is a single byte; `PROTECT` exists in the
    /// firmware interface but cannot be carried by it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlowFlags: u16 {
        /// Broadcast TWT session.
        const BROADCAST = 1 << 0;
        /// Implicit TWT session.
        const IMPLICIT = 1 << 1;
        /// Unannounced TWT session.
        const UNANNOUNCED = 1 << 2;
        /// Trigger-enabled TWT session.
        const TRIGGER = 1 << 3;
        /// Wake TBTT negotiation.
        const WAKE_TBTT_NEGO = 1 << 4;
        /// This STA is the TWT requesting STA.
        const REQUEST = 1 << 5;
        /// Responder PM mode.
        const RESPONDER_PM = 1 << 6;
        /// Unsolicited setup.
        const UNSOLICITED = 1 << 7;
        /// Transmissions within the service period are protected.
        const PROTECT = 1 << 8;
    }
}

impl FlowFlags {
    /// Rejects combinations no single session can carry.
    pub fn validate(self) -> Result<Self, CodecError> {
        if self.contains(Self::BROADCAST | Self::WAKE_TBTT_NEGO) {
            return Err(CodecError::IllegalFlags(
                "broadcast session cannot use wake TBTT negotiation",
            ));
        }
        if self.contains(Self::BROADCAST | Self::UNSOLICITED) {
            return Err(CodecError::IllegalFlags(
                "broadcast membership cannot be unsolicited",
            ));
        }
        Ok(self)
    }

    /// Encodes the flags into the descriptor's flow-flags byte.
    pub fn to_wire(self) -> Result<u8, CodecError> {
        let flags = self.validate()?;
        u8::try_from(flags.bits()).map_err(|_| {
            CodecError::IllegalFlags("protection flag does not fit the descriptor")
        })
    }

    /// Decodes a descriptor's flow-flags byte.
    pub fn from_wire(raw: u8) -> Result<Self, CodecError> {
        // Every bit of the byte is a defined flag.
        Self::from_bits_truncate(raw as u16).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let flags = FlowFlags::REQUEST | FlowFlags::TRIGGER | FlowFlags::UNANNOUNCED;
        let raw = flags.to_wire().unwrap();
        assert_eq!(raw, 0b0010_1100);
        assert_eq!(FlowFlags::from_wire(raw).unwrap(), flags);
    }

    #[test]
    fn broadcast_with_wake_tbtt_rejected() {
        let flags = FlowFlags::BROADCAST | FlowFlags::WAKE_TBTT_NEGO;
        assert!(flags.validate().is_err());
        assert!(FlowFlags::from_wire(0b0001_0001).is_err());
    }

    #[test]
    fn protect_does_not_fit_descriptor() {
        let flags = FlowFlags::REQUEST | FlowFlags::PROTECT;
        assert!(matches!(flags.to_wire(), Err(CodecError::IllegalFlags(_))));
    }
}
