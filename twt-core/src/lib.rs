//! # twt-core
//!
//! Target Wake Time (TWT) session lifecycle manager and its wire codec.
//!
//! This crate contains:
//! - **Codec**: bit-exact packing of the TWT element, its sub-byte fields
//!   and the S1G TWT action frames
//! - **Descriptors**: the firmware-facing `SetupDescriptor` / `TeardownDescriptor`
//! - **Command builder**: `build_setup` / `build_teardown` producing versioned,
//!   length-prefixed command buffers
//! - **Event parser**: `parse_setup_event` / `parse_teardown_event`
//! - **State**: `SessionRegistry` with the validated `SessionState` machine
//! - **Manager**: `SessionManager`, the façade tying them together over a
//!   `FirmwareChannel`
//! - **Error**: `TwtError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod command;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod flags;
pub mod manager;
pub mod message;
pub mod params;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{TwtActionFrame, TwtElement};
pub use command::{
    SetupCommand, SetupOperation, TeardownCommand, TeardownOperation, TwtCommand, build_setup,
    build_teardown,
};
pub use descriptor::{SetupDescriptor, TeardownDescriptor};
pub use error::{CodecError, DispatchError, TwtError};
pub use event::{
    EventKind, SetupEvent, TeardownEvent, TwtEvent, parse_setup_event, parse_teardown_event,
};
pub use flags::FlowFlags;
pub use manager::{EventOutcome, ManagerConfig, SessionManager};
pub use message::{MacAddr, NegotiationType, SetupCmd, TwtOperation, WakeDurationUnit, WakeTimeType};
pub use params::{AUTO_ASSIGN_ID, TwtParameters};
pub use state::{LinkId, SessionId, SessionKey, SessionRegistry, SessionState, TwtSession};
pub use transport::{ChannelTransport, FirmwareChannel, FirmwareOp, FirmwareRequest, TransportConfig};
