//! Event parser: completion events from the firmware TWT module.
//!
//! ```text
//! setup:    version:u16 length:u16 dialog:u8 pad:[u8;3] status:i32 [SetupDescriptor]
//! teardown: version:u16 length:u16 status:i32 [TeardownDescriptor]
//! ```
//!
//! `length` counts the bytes after the length field and must match the
//! buffer exactly. A negative status is the negated reason code.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::descriptor::{SetupDescriptor, TeardownDescriptor};
use crate::error::{CodecError, TwtError};

pub const TWT_EVENT_VERSION: u16 = 0;
pub const EVENT_HEADER_LEN: usize = 4;

// ── EventKind ────────────────────────────────────────────────────

/// Which completion event a buffer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SetupComplete,
    TeardownComplete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetupComplete => f.write_str("setup"),
            Self::TeardownComplete => f.write_str("teardown"),
        }
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(Self::SetupComplete),
            "teardown" => Ok(Self::TeardownComplete),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

// ── SetupEvent ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupEvent {
    pub dialog_token: u8,
    pub status: i32,
    /// Negotiated descriptor, when the firmware reports it.
    pub descriptor: Option<SetupDescriptor>,
}

impl SetupEvent {
    /// dialog + pad + status
    pub const BASE_LEN: usize = 8;

    pub fn is_success(&self) -> bool {
        self.status >= 0
    }

    /// Serializes the event the way the firmware emits it.
    pub fn to_bytes(&self) -> Result<Bytes, CodecError> {
        let payload = Self::BASE_LEN + self.descriptor.map_or(0, |_| SetupDescriptor::SIZE);
        let mut buf = BytesMut::with_capacity(EVENT_HEADER_LEN + payload);
        buf.put_u16_le(TWT_EVENT_VERSION);
        buf.put_u16_le(payload as u16);
        buf.put_u8(self.dialog_token);
        buf.put_bytes(0, 3);
        buf.put_i32_le(self.status);
        if let Some(desc) = &self.descriptor {
            desc.encode(&mut buf)?;
        }
        Ok(buf.freeze())
    }
}

// ── TeardownEvent ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownEvent {
    pub status: i32,
    /// Torn-down session, when the firmware reports it.
    pub descriptor: Option<TeardownDescriptor>,
}

impl TeardownEvent {
    /// status
    pub const BASE_LEN: usize = 4;

    pub fn is_success(&self) -> bool {
        self.status >= 0
    }

    pub fn to_bytes(&self) -> Bytes {
        let payload = Self::BASE_LEN + self.descriptor.map_or(0, |_| TeardownDescriptor::SIZE);
        let mut buf = BytesMut::with_capacity(EVENT_HEADER_LEN + payload);
        buf.put_u16_le(TWT_EVENT_VERSION);
        buf.put_u16_le(payload as u16);
        buf.put_i32_le(self.status);
        if let Some(desc) = &self.descriptor {
            desc.encode(&mut buf);
        }
        buf.freeze()
    }
}

// ── TwtEvent ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwtEvent {
    Setup(SetupEvent),
    Teardown(TeardownEvent),
}

impl TwtEvent {
    pub fn parse(kind: EventKind, buf: &[u8]) -> Result<Self, TwtError> {
        match kind {
            EventKind::SetupComplete => parse_setup_event(buf).map(Self::Setup),
            EventKind::TeardownComplete => parse_teardown_event(buf).map(Self::Teardown),
        }
    }

    pub fn status(&self) -> i32 {
        match self {
            Self::Setup(ev) => ev.status,
            Self::Teardown(ev) => ev.status,
        }
    }
}

// ── Parsers ──────────────────────────────────────────────────────

/// Checks version and length; returns the payload after the header.
fn check_header<'a>(
    buf: &'a [u8],
    name: &str,
    base_len: usize,
    trailer_len: usize,
) -> Result<&'a [u8], TwtError> {
    if buf.len() < EVENT_HEADER_LEN + base_len {
        return Err(TwtError::MalformedEvent(format!(
            "{name} event of {} bytes, need at least {}",
            buf.len(),
            EVENT_HEADER_LEN + base_len
        )));
    }
    let mut cur = buf;
    let version = cur.get_u16_le();
    if version != TWT_EVENT_VERSION {
        return Err(TwtError::MalformedEvent(format!(
            "{name} event version {version}"
        )));
    }
    let declared = cur.get_u16_le() as usize;
    if declared != cur.len() {
        return Err(TwtError::MalformedEvent(format!(
            "{name} event declares {declared} bytes, carries {}",
            cur.len()
        )));
    }
    if declared != base_len && declared != base_len + trailer_len {
        return Err(TwtError::MalformedEvent(format!(
            "{name} event length {declared} is neither {base_len} nor {}",
            base_len + trailer_len
        )));
    }
    Ok(cur)
}

fn malformed(name: &str, err: CodecError) -> TwtError {
    TwtError::MalformedEvent(format!("{name} event descriptor: {err}"))
}

pub fn parse_setup_event(buf: &[u8]) -> Result<SetupEvent, TwtError> {
    let mut cur = check_header(buf, "setup", SetupEvent::BASE_LEN, SetupDescriptor::SIZE)?;
    let dialog_token = cur.get_u8();
    cur.advance(3);
    let status = cur.get_i32_le();
    let descriptor = if cur.is_empty() {
        None
    } else {
        Some(SetupDescriptor::decode(cur).map_err(|e| malformed("setup", e))?)
    };

    debug!(
        dialog_token,
        status,
        with_descriptor = descriptor.is_some(),
        "parsed setup event"
    );
    Ok(SetupEvent {
        dialog_token,
        status,
        descriptor,
    })
}

pub fn parse_teardown_event(buf: &[u8]) -> Result<TeardownEvent, TwtError> {
    let mut cur = check_header(
        buf,
        "teardown",
        TeardownEvent::BASE_LEN,
        TeardownDescriptor::SIZE,
    )?;
    let status = cur.get_i32_le();
    let descriptor = if cur.is_empty() {
        None
    } else {
        Some(TeardownDescriptor::decode(cur).map_err(|e| malformed("teardown", e))?)
    };

    debug!(
        status,
        with_descriptor = descriptor.is_some(),
        "parsed teardown event"
    );
    Ok(TeardownEvent { status, descriptor })
}
