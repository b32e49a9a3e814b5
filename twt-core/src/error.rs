//! Domain-specific error types for TWT session management.
//!
//! All fallible operations return `Result<T, TwtError>`.
//! Nothing in this crate is fatal to the process; every failure is a
//! typed value handed back to the caller.

use std::time::Duration;
use thiserror::Error;

use crate::state::{SessionKey, SessionState};

/// The canonical error type for TWT session management.
#[derive(Debug, Error)]
pub enum TwtError {
    // ── Local Validation ─────────────────────────────────────────
    /// A caller-supplied value is outside the protocol range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Setup requested for an identity that already has an active session.
    #[error("session already active: {0}")]
    DuplicateSession(SessionKey),

    /// A teardown request or event references no matching session.
    #[error("no matching session: {0}")]
    UnknownSession(String),

    /// The requested state-machine edge is not permitted.
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The registry refused a new session for this interface.
    #[error("session limit reached on interface {ifidx} (max {limit})")]
    SessionLimit { ifidx: u8, limit: usize },

    // ── Event Errors ─────────────────────────────────────────────
    /// An event buffer was too short or its length field was inconsistent.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A well-formed event carried a failure status.
    #[error("peer rejected the operation (status {status})")]
    PeerRejected { status: i32 },

    // ── Channel Errors ───────────────────────────────────────────
    /// The external channel could not accept the built command.
    #[error("dispatch failed: {0}")]
    DispatchFailure(#[from] DispatchError),

    // ── Wire Errors ──────────────────────────────────────────────
    /// A wire substructure could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl TwtError {
    /// Returns `true` for failures detected locally before anything left
    /// the host. These are never retried automatically.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            TwtError::InvalidParameter(_)
                | TwtError::DuplicateSession(_)
                | TwtError::InvalidTransition { .. }
                | TwtError::MalformedEvent(_)
        )
    }

    /// The raw status carried by a `PeerRejected` error.
    pub fn peer_status(&self) -> Option<i32> {
        match self {
            TwtError::PeerRejected { status } => Some(*status),
            _ => None,
        }
    }

    /// Reason code reported by the peer or firmware (negated status).
    pub fn reason_code(&self) -> Option<u32> {
        self.peer_status().map(|s| s.unsigned_abs())
    }
}

// ── CodecError ────────────────────────────────────────────────────

/// Failure to pack or unpack a TWT wire substructure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A field value does not fit its bit width.
    #[error("{field} out of range: {value} (max {max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The input ended before the structure did.
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A declared length disagrees with the bytes actually present.
    #[error("length mismatch: declared {declared}, available {available}")]
    LengthMismatch { declared: usize, available: usize },

    /// The element id is not the TWT element.
    #[error("unexpected element id {0}")]
    UnexpectedElement(u8),

    /// A flow-flag set that no session can legally carry.
    #[error("illegal flow flags: {0}")]
    IllegalFlags(&'static str),

    /// The action frame is not an S1G TWT frame.
    #[error("unexpected action frame: category {category}, action {action}")]
    UnexpectedAction { category: u8, action: u8 },
}

impl CodecError {
    pub(crate) fn out_of_range(field: &'static str, value: impl Into<u64>, max: u64) -> Self {
        CodecError::FieldOutOfRange {
            field,
            value: value.into(),
            max,
        }
    }

    pub(crate) fn truncated(expected: usize, actual: usize) -> Self {
        CodecError::Truncated { expected, actual }
    }
}

// ── DispatchError ─────────────────────────────────────────────────

/// Typed failure of the external firmware channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The channel to the firmware was closed.
    #[error("firmware channel closed")]
    ChannelClosed,

    /// The channel did not accept the command before the deadline.
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    /// The firmware refused the command synchronously.
    #[error("firmware rejected command (code {code})")]
    Rejected { code: i32 },

    /// TWT is not enabled on the target interface.
    #[error("TWT module disabled on interface")]
    Disabled,

    /// The command could not be serialized for the channel.
    #[error("command encoding failed: {0}")]
    Encoding(#[from] CodecError),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for DispatchError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        DispatchError::ChannelClosed
    }
}
