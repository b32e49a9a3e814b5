//! The boundary with the firmware command channel.
//!
//! The session manager talks to firmware only through [`FirmwareChannel`].
//! [`ChannelTransport`] is an mpsc-backed implementation: each request is
//! queued together with a oneshot the firmware side answers, the way an
//! iovar call returns a synchronous status.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::command::TwtCommand;
use crate::error::DispatchError;

// ── FirmwareChannel ──────────────────────────────────────────────

/// An opaque command channel to the radio firmware.
///
/// Both calls only report whether the firmware accepted the request;
/// completion arrives later as an event.
#[async_trait]
pub trait FirmwareChannel: Send + Sync {
    /// Enables the firmware TWT module on `ifidx`.
    async fn enable(&self, ifidx: u8) -> Result<(), DispatchError>;

    /// Hands a built command to the firmware.
    async fn dispatch(&self, ifidx: u8, command: TwtCommand) -> Result<(), DispatchError>;
}

// ── TransportConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Requests buffered before `dispatch` waits for room.
    pub queue_depth: usize,
    /// Upper bound on queueing plus the firmware's synchronous answer.
    pub dispatch_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_depth: 32,
            dispatch_timeout: Duration::from_secs(2),
        }
    }
}

// ── FirmwareRequest ──────────────────────────────────────────────

#[derive(Debug)]
pub enum FirmwareOp {
    Enable,
    Command {
        command: TwtCommand,
        /// The command as it goes over the wire.
        bytes: Bytes,
    },
}

/// One request as seen by the firmware side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct FirmwareRequest {
    pub ifidx: u8,
    pub op: FirmwareOp,
    reply: oneshot::Sender<Result<(), DispatchError>>,
}

impl FirmwareRequest {
    /// Answers the request. A dropped request reads as a closed channel.
    pub fn respond(self, result: Result<(), DispatchError>) {
        // The caller may have timed out and gone away.
        let _ = self.reply.send(result);
    }

    pub fn accept(self) {
        self.respond(Ok(()))
    }

    pub fn reject(self, code: i32) {
        self.respond(Err(DispatchError::Rejected { code }))
    }
}

// ── ChannelTransport ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<FirmwareRequest>,
    timeout: Duration,
}

impl ChannelTransport {
    /// Creates the transport and the receiver the firmware side drains.
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<FirmwareRequest>) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        (
            Self {
                tx,
                timeout: config.dispatch_timeout,
            },
            rx,
        )
    }

    async fn call(&self, ifidx: u8, op: FirmwareOp) -> Result<(), DispatchError> {
        let (reply, answer) = oneshot::channel();
        let request = FirmwareRequest { ifidx, op, reply };

        let exchange = async {
            if let Err(e) = self.tx.send(request).await {
                return Err(DispatchError::from(e));
            }
            answer.await.unwrap_or(Err(DispatchError::ChannelClosed))
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DispatchError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl FirmwareChannel for ChannelTransport {
    async fn enable(&self, ifidx: u8) -> Result<(), DispatchError> {
        self.call(ifidx, FirmwareOp::Enable).await
    }

    async fn dispatch(&self, ifidx: u8, command: TwtCommand) -> Result<(), DispatchError> {
        let bytes = command.to_bytes()?;
        self.call(ifidx, FirmwareOp::Command { command, bytes })
            .await
    }
}
