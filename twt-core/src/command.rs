//! Command builder: turns validated request parameters into the
//! firmware-bound setup and teardown command buffers.
//!
//! ```text
//! setup:    version:u16 length:u16 peer:[u8;6] pad:[u8;2] SetupDescriptor
//! teardown: version:u16 length:u16 peer:[u8;6] TeardownDescriptor
//! ```
//!
//! `length` counts the bytes after the length field. Building is a pure
//! transform; registry updates and dispatch belong to the caller.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::codec::ensure_len;
use crate::descriptor::{SetupDescriptor, TeardownDescriptor};
use crate::error::{CodecError, TwtError};
use crate::message::MacAddr;
use crate::params::TwtParameters;
use crate::state::SessionKey;

pub const TWT_SETUP_VERSION: u16 = 0;
pub const TWT_TEARDOWN_VERSION: u16 = 0;

/// version + length
pub const COMMAND_HEADER_LEN: usize = 4;

const SETUP_PAD_LEN: usize = 2;

// ── SetupOperation ───────────────────────────────────────────────

/// Setup sub-command for the firmware TWT module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupOperation {
    pub peer: MacAddr,
    pub descriptor: SetupDescriptor,
}

pub type SetupCommand = SetupOperation;

impl SetupOperation {
    pub const PAYLOAD_LEN: usize = MacAddr::LEN + SETUP_PAD_LEN + SetupDescriptor::SIZE;
    pub const LEN: usize = COMMAND_HEADER_LEN + Self::PAYLOAD_LEN;

    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        buf.put_u16_le(TWT_SETUP_VERSION);
        buf.put_u16_le(Self::PAYLOAD_LEN as u16);
        buf.put_slice(&self.peer.octets());
        buf.put_bytes(0, SETUP_PAD_LEN);
        self.descriptor.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        let mut cur = check_header(buf, TWT_SETUP_VERSION, Self::PAYLOAD_LEN)?;
        let peer = read_peer(&mut cur);
        cur.advance(SETUP_PAD_LEN);
        Ok(Self {
            peer,
            descriptor: SetupDescriptor::decode(cur)?,
        })
    }
}

// ── TeardownOperation ────────────────────────────────────────────

/// Teardown sub-command for the firmware TWT module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownOperation {
    pub peer: MacAddr,
    pub descriptor: TeardownDescriptor,
}

pub type TeardownCommand = TeardownOperation;

impl TeardownOperation {
    pub const PAYLOAD_LEN: usize = MacAddr::LEN + TeardownDescriptor::SIZE;
    pub const LEN: usize = COMMAND_HEADER_LEN + Self::PAYLOAD_LEN;

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        buf.put_u16_le(TWT_TEARDOWN_VERSION);
        buf.put_u16_le(Self::PAYLOAD_LEN as u16);
        buf.put_slice(&self.peer.octets());
        self.descriptor.encode(&mut buf);
        buf.freeze()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        let mut cur = check_header(buf, TWT_TEARDOWN_VERSION, Self::PAYLOAD_LEN)?;
        let peer = read_peer(&mut cur);
        Ok(Self {
            peer,
            descriptor: TeardownDescriptor::decode(cur)?,
        })
    }
}

// ── TwtCommand ───────────────────────────────────────────────────

/// A command handed to the firmware channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwtCommand {
    Setup(SetupOperation),
    Teardown(TeardownOperation),
}

impl TwtCommand {
    pub fn peer(&self) -> MacAddr {
        match self {
            Self::Setup(op) => op.peer,
            Self::Teardown(op) => op.peer,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::Teardown(_) => "teardown",
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        match self {
            Self::Setup(op) => op.to_bytes(),
            Self::Teardown(op) => Ok(op.to_bytes()),
        }
    }

    /// Decodes a command buffer; the kind follows from its length field.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CodecError> {
        ensure_len(buf, COMMAND_HEADER_LEN)?;
        let declared = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        match declared {
            SetupOperation::PAYLOAD_LEN => SetupOperation::from_bytes(buf).map(Self::Setup),
            TeardownOperation::PAYLOAD_LEN => {
                TeardownOperation::from_bytes(buf).map(Self::Teardown)
            }
            _ => Err(CodecError::LengthMismatch {
                declared,
                available: buf.len() - COMMAND_HEADER_LEN,
            }),
        }
    }
}

impl From<SetupOperation> for TwtCommand {
    fn from(op: SetupOperation) -> Self {
        Self::Setup(op)
    }
}

impl From<TeardownOperation> for TwtCommand {
    fn from(op: TeardownOperation) -> Self {
        Self::Teardown(op)
    }
}

fn check_header(buf: &[u8], version: u16, payload_len: usize) -> Result<&[u8], CodecError> {
    ensure_len(buf, COMMAND_HEADER_LEN)?;
    let mut cur = buf;
    let found = cur.get_u16_le();
    if found != version {
        return Err(CodecError::UnknownVariant {
            type_name: "command version",
            value: found as u64,
        });
    }
    let declared = cur.get_u16_le() as usize;
    if declared != payload_len || cur.len() != payload_len {
        return Err(CodecError::LengthMismatch {
            declared,
            available: cur.len(),
        });
    }
    Ok(cur)
}

fn read_peer(cur: &mut &[u8]) -> MacAddr {
    let mut octets = [0u8; MacAddr::LEN];
    cur.copy_to_slice(&mut octets);
    MacAddr(octets)
}

// ── Builders ─────────────────────────────────────────────────────

/// Builds the setup command for the session at `key`.
///
/// Auto-assign ids (0xFF) pass through unmodified.
pub fn build_setup(key: &SessionKey, params: &TwtParameters) -> Result<SetupCommand, TwtError> {
    params.validate_setup()?;
    let flow_flags = params.flow_flags()?;
    // PROTECT survives validation but has no bit in the descriptor.
    flow_flags
        .to_wire()
        .map_err(|e| TwtError::InvalidParameter(e.to_string()))?;

    let descriptor = SetupDescriptor {
        setup_cmd: params.setup_cmd,
        flow_flags,
        flow_id: params.flow_id,
        wake_type: params.wake_time_type(),
        wake_time: params.wake_time(),
        wake_duration: params.wake_duration_us(),
        wake_interval: params.wake_interval_us()?,
        broadcast_persistence: params.broadcast_persistence as u32,
        wake_interval_max: 0,
        duty_cycle_min: 0,
        broadcast_id: params.broadcast_id,
        channel: params.channel,
        negotiation_type: params.negotiation_type,
        frame_recommendation: params.broadcast_recommendation,
    };
    debug!(
        %key,
        setup_cmd = %descriptor.setup_cmd,
        flow_id = descriptor.flow_id,
        bid = descriptor.broadcast_id,
        wake_type = %descriptor.wake_type,
        wake_dur = descriptor.wake_duration,
        wake_int = descriptor.wake_interval,
        "built setup command"
    );

    Ok(SetupOperation {
        peer: key.link.peer,
        descriptor,
    })
}

/// Builds the teardown command for the session at `key`.
pub fn build_teardown(
    key: &SessionKey,
    params: &TwtParameters,
) -> Result<TeardownCommand, TwtError> {
    params.validate_teardown()?;
    let descriptor = TeardownDescriptor {
        negotiation_type: params.negotiation_type,
        flow_id: params.flow_id,
        broadcast_id: params.broadcast_id,
        teardown_all: params.teardown_all,
    };
    debug!(
        %key,
        flow_id = descriptor.flow_id,
        bid = descriptor.broadcast_id,
        all = descriptor.teardown_all,
        "built teardown command"
    );

    Ok(TeardownOperation {
        peer: key.link.peer,
        descriptor,
    })
}
