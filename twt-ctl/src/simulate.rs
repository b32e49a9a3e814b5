//! In-process setup/teardown exchange against a simulated firmware.
//!
//! The firmware side accepts commands on interfaces that were enabled
//! first and reports the commands it saw; the driver answers each one with the
//! completion event a cooperative peer would produce.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use twt_core::{
    AUTO_ASSIGN_ID, ChannelTransport, DispatchError, EventKind, EventOutcome, FirmwareOp,
    FirmwareRequest, LinkId, SessionManager, SetupCmd, SetupDescriptor, SetupEvent,
    TeardownEvent, TwtCommand, TwtError, TwtParameters,
};

use crate::config::CtlConfig;

/// Id the simulated peer hands out for auto-assign requests.
pub const SIMULATED_ASSIGNED_ID: u8 = 1;

/// How long the driver waits for the firmware task to surface a command.
const COMMAND_WAIT: Duration = Duration::from_secs(2);

/// A command as the simulated firmware received it.
#[derive(Debug, Clone)]
pub struct FirmwareCommand {
    pub ifidx: u8,
    pub command: TwtCommand,
    pub wire: Vec<u8>,
}

/// Everything that crossed the firmware boundary during one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeReport {
    pub command: FirmwareCommand,
    pub event_kind: EventKind,
    pub event: Vec<u8>,
    pub outcome: EventOutcome,
}

// ── Simulation ───────────────────────────────────────────────────

pub struct Simulation {
    manager: SessionManager<ChannelTransport>,
    commands: mpsc::UnboundedReceiver<FirmwareCommand>,
    firmware: JoinHandle<()>,
}

impl Simulation {
    pub fn start(config: &CtlConfig) -> Self {
        let (transport, requests) = ChannelTransport::new(config.to_transport_config());
        let (seen_tx, commands) = mpsc::unbounded_channel();
        let firmware = tokio::spawn(run_firmware(requests, seen_tx));
        Self {
            manager: SessionManager::new(transport, config.to_manager_config()),
            commands,
            firmware,
        }
    }

    pub fn manager(&self) -> &SessionManager<ChannelTransport> {
        &self.manager
    }

    /// Requests a setup and completes it with a peer answer of
    /// `peer_status`; a negative status is a rejection.
    pub async fn setup(
        &mut self,
        link: LinkId,
        params: TwtParameters,
        peer_status: i32,
    ) -> Result<ExchangeReport, TwtError> {
        let dialog_token = params.dialog_token;
        self.manager.setup(link, params).await?;
        let command = self.next_command().await?;

        let descriptor = match command.command {
            TwtCommand::Setup(op) => Some(peer_answer(op.descriptor, peer_status)),
            TwtCommand::Teardown(_) => None,
        };
        let event = SetupEvent {
            dialog_token,
            status: peer_status,
            descriptor,
        }
        .to_bytes()?
        .to_vec();
        self.complete(link, command, EventKind::SetupComplete, event)
            .await
    }

    /// Requests a teardown of `params`' session and completes it.
    pub async fn teardown(
        &mut self,
        link: LinkId,
        params: TwtParameters,
    ) -> Result<ExchangeReport, TwtError> {
        self.manager.teardown(link, params).await?;
        let command = self.next_command().await?;

        let descriptor = match command.command {
            TwtCommand::Teardown(op) => Some(op.descriptor),
            TwtCommand::Setup(_) => None,
        };
        let event = TeardownEvent {
            status: 0,
            descriptor,
        }
        .to_bytes()
        .to_vec();
        self.complete(link, command, EventKind::TeardownComplete, event)
            .await
    }

    /// Full lifecycle: setup, then teardown of the established session.
    pub async fn run(
        &mut self,
        link: LinkId,
        params: TwtParameters,
        peer_status: i32,
    ) -> Result<(ExchangeReport, ExchangeReport), TwtError> {
        let setup = self.setup(link, params, peer_status).await?;
        let key = match &setup.outcome {
            EventOutcome::SetupComplete(key) => *key,
            EventOutcome::TeardownComplete(_) => {
                return Err(TwtError::MalformedEvent("setup answered by teardown".into()));
            }
        };
        let established = self
            .manager
            .session(&key)
            .await
            .ok_or_else(|| TwtError::UnknownSession(key.to_string()))?;
        info!(%key, state = %established.state, "simulated session established");

        let teardown = self.teardown(link, established.params.teardown_of()).await?;
        Ok((setup, teardown))
    }

    async fn complete(
        &self,
        link: LinkId,
        command: FirmwareCommand,
        event_kind: EventKind,
        event: Vec<u8>,
    ) -> Result<ExchangeReport, TwtError> {
        debug!(%link, %event_kind, len = event.len(), "delivering simulated event");
        let outcome = self.manager.notify_event(link, event_kind, &event).await?;
        Ok(ExchangeReport {
            command,
            event_kind,
            event,
            outcome,
        })
    }

    async fn next_command(&mut self) -> Result<FirmwareCommand, TwtError> {
        match tokio::time::timeout(COMMAND_WAIT, self.commands.recv()).await {
            Ok(Some(command)) => Ok(command),
            Ok(None) => Err(DispatchError::ChannelClosed.into()),
            Err(_) => Err(DispatchError::Timeout(COMMAND_WAIT).into()),
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.firmware.abort();
    }
}

// ── Simulated firmware ───────────────────────────────────────────

async fn run_firmware(
    mut requests: mpsc::Receiver<FirmwareRequest>,
    seen: mpsc::UnboundedSender<FirmwareCommand>,
) {
    let mut enabled = HashSet::new();
    while let Some(request) = requests.recv().await {
        match &request.op {
            FirmwareOp::Enable => {
                enabled.insert(request.ifidx);
            }
            FirmwareOp::Command { .. } if !enabled.contains(&request.ifidx) => {
                debug!(ifidx = request.ifidx, "command on disabled interface");
                request.respond(Err(DispatchError::Disabled));
                continue;
            }
            FirmwareOp::Command { command, bytes } => {
                debug!(ifidx = request.ifidx, kind = command.name(), len = bytes.len(), "firmware command");
                let _ = seen.send(FirmwareCommand {
                    ifidx: request.ifidx,
                    command: *command,
                    wire: bytes.to_vec(),
                });
            }
        }
        request.accept();
    }
}

/// The descriptor a peer echoes back: requested ids resolved and the
/// setup command turned into Accept or Reject.
fn peer_answer(mut descriptor: SetupDescriptor, peer_status: i32) -> SetupDescriptor {
    if descriptor.negotiation_type.is_broadcast() {
        if descriptor.broadcast_id == AUTO_ASSIGN_ID {
            descriptor.broadcast_id = SIMULATED_ASSIGNED_ID;
        }
    } else if descriptor.flow_id == AUTO_ASSIGN_ID {
        descriptor.flow_id = SIMULATED_ASSIGNED_ID;
    }
    descriptor.setup_cmd = if peer_status < 0 {
        SetupCmd::Reject
    } else {
        SetupCmd::Accept
    };
    descriptor
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use twt_core::{MacAddr, NegotiationType, SessionId, SessionKey};

    fn link() -> LinkId {
        LinkId::new(1, 0, MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]))
    }

    fn request(flow_id: u8) -> TwtParameters {
        TwtParameters {
            flow_id,
            dialog_token: 9,
            ..CtlConfig::default().request_template()
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let mut sim = Simulation::start(&CtlConfig::default());
        let (setup, teardown) = sim.run(link(), request(2), 0).await.unwrap();

        assert_eq!(setup.command.ifidx, 1);
        assert_eq!(setup.command.wire.len(), 46);
        assert_eq!(setup.event.len(), 4 + 8 + 34);
        let key = SessionKey::new(link(), SessionId::Flow(2));
        assert_eq!(setup.outcome, EventOutcome::SetupComplete(key));

        assert_eq!(teardown.command.wire.len(), 14);
        assert_eq!(teardown.outcome, EventOutcome::TeardownComplete(vec![key]));
        assert_eq!(sim.manager().session_count().await, 0);
    }

    #[tokio::test]
    async fn auto_assigned_flow_is_resolved() {
        let mut sim = Simulation::start(&CtlConfig::default());
        let report = sim.setup(link(), request(AUTO_ASSIGN_ID), 0).await.unwrap();
        let key = SessionKey::new(link(), SessionId::Flow(SIMULATED_ASSIGNED_ID));
        assert_eq!(report.outcome, EventOutcome::SetupComplete(key));
        let session = sim.manager().session(&key).await.unwrap();
        assert_eq!(session.params.flow_id, SIMULATED_ASSIGNED_ID);
    }

    #[tokio::test]
    async fn broadcast_membership() {
        let mut cfg = CtlConfig::default();
        cfg.defaults.negotiation_type = NegotiationType::Broadcast;
        let mut sim = Simulation::start(&cfg);
        let params = TwtParameters {
            broadcast_id: 5,
            ..request(0)
        };
        let (setup, _) = sim.run(link(), params, 0).await.unwrap();
        assert_eq!(
            setup.outcome,
            EventOutcome::SetupComplete(SessionKey::new(link(), SessionId::Broadcast(5)))
        );
    }

    #[tokio::test]
    async fn peer_rejection_leaves_nothing_behind() {
        let mut sim = Simulation::start(&CtlConfig::default());
        let err = sim.setup(link(), request(3), -1).await.unwrap_err();
        assert!(matches!(err, TwtError::PeerRejected { status: -1 }));
        assert_eq!(sim.manager().session_count().await, 0);
    }

    #[tokio::test]
    async fn commands_need_an_enabled_interface() {
        let mut cfg = CtlConfig::default();
        cfg.manager.enable_on_first_setup = false;
        let mut sim = Simulation::start(&cfg);
        let err = sim.setup(link(), request(3), 0).await.unwrap_err();
        assert!(matches!(
            err,
            TwtError::DispatchFailure(DispatchError::Disabled)
        ));
        assert_eq!(sim.manager().session_count().await, 0);

        sim.manager().enable(link().ifidx).await.unwrap();
        let (setup, _) = sim.run(link(), request(3), 0).await.unwrap();
        assert!(matches!(setup.outcome, EventOutcome::SetupComplete(_)));
    }

    #[test]
    fn peer_answer_keeps_concrete_ids() {
        let params = request(4);
        let key = SessionKey::for_request(link(), &params);
        let built = twt_core::build_setup(&key, &params).unwrap();
        let answer = peer_answer(built.descriptor, 0);
        assert_eq!(answer.flow_id, 4);
        assert_eq!(answer.setup_cmd, SetupCmd::Accept);
    }
}
