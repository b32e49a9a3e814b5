//! Session manager: the façade the user-request layer and the firmware
//! event path talk to.
//!
//! Registry mutations are serialized under one `RwLock`; command dispatch
//! always happens after the guard is dropped, so a slow firmware channel
//! never blocks event handling.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::command::{build_setup, build_teardown};
use crate::error::TwtError;
use crate::event::{EventKind, SetupEvent, TeardownEvent, TwtEvent};
use crate::message::{SetupCmd, TwtOperation};
use crate::params::TwtParameters;
use crate::state::{LinkId, SessionId, SessionKey, SessionRegistry, SessionState, TwtSession};
use crate::transport::FirmwareChannel;

// ── ManagerConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Live sessions allowed per interface.
    pub max_sessions_per_interface: usize,
    /// Enable the firmware TWT module before the first setup on an
    /// interface.
    pub enable_on_first_setup: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_interface: 8,
            enable_on_first_setup: false,
        }
    }
}

// ── EventOutcome ─────────────────────────────────────────────────

/// What a successfully applied completion event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The session is established, under its final key.
    SetupComplete(SessionKey),
    /// These sessions were torn down and removed.
    TeardownComplete(Vec<SessionKey>),
}

// ── SessionManager ───────────────────────────────────────────────

pub struct SessionManager<T: FirmwareChannel> {
    transport: Arc<T>,
    registry: Arc<RwLock<SessionRegistry>>,
    enabled: Mutex<HashSet<u8>>,
    config: ManagerConfig,
}

impl<T: FirmwareChannel> SessionManager<T> {
    pub fn new(transport: T, config: ManagerConfig) -> Self {
        Self::with_shared_transport(Arc::new(transport), config)
    }

    pub fn with_shared_transport(transport: Arc<T>, config: ManagerConfig) -> Self {
        Self {
            transport,
            registry: Arc::new(RwLock::new(SessionRegistry::with_limit(
                config.max_sessions_per_interface,
            ))),
            enabled: Mutex::new(HashSet::new()),
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ── User requests ────────────────────────────────────────────

    /// Entry point of the user-request layer. `op` must match
    /// `params.operation`.
    pub async fn request_operation(
        &self,
        op: TwtOperation,
        link: LinkId,
        params: TwtParameters,
    ) -> Result<(), TwtError> {
        if op != params.operation {
            return Err(TwtError::InvalidParameter(format!(
                "operation {op} does not match parameters ({})",
                params.operation
            )));
        }
        match op {
            TwtOperation::Enable => self.enable(link.ifidx).await,
            TwtOperation::Setup => self.setup(link, params).await.map(|_| ()),
            TwtOperation::Teardown => self.teardown(link, params).await.map(|_| ()),
        }
    }

    /// Enables the firmware TWT module on `ifidx`.
    pub async fn enable(&self, ifidx: u8) -> Result<(), TwtError> {
        self.transport.enable(ifidx).await?;
        self.enabled.lock().await.insert(ifidx);
        info!(ifidx, "TWT enabled");
        Ok(())
    }

    async fn ensure_enabled(&self, ifidx: u8) -> Result<(), TwtError> {
        if self.enabled.lock().await.contains(&ifidx) {
            return Ok(());
        }
        self.enable(ifidx).await
    }

    /// Registers a pending session, builds its setup command and
    /// dispatches it. Returns the key the session is tracked under.
    ///
    /// A dispatch failure removes the pending session again.
    pub async fn setup(&self, link: LinkId, params: TwtParameters) -> Result<SessionKey, TwtError> {
        if self.config.enable_on_first_setup {
            self.ensure_enabled(link.ifidx).await?;
        }

        let key = SessionKey::for_request(link, &params);
        let command = {
            let mut registry = self.registry.write().await;
            registry.insert_pending(key, params.clone())?;
            match build_setup(&key, &params) {
                Ok(command) => command,
                Err(e) => {
                    registry.remove(&key);
                    return Err(e);
                }
            }
        };
        info!(%key, dialog_token = params.dialog_token, "TWT setup requested");

        if let Err(e) = self.transport.dispatch(link.ifidx, command.into()).await {
            let mut registry = self.registry.write().await;
            // Only undo our own pending record; cleanup may have raced us.
            if registry
                .find(&key)
                .is_some_and(|s| s.state == SessionState::SetupInProgress)
            {
                registry.remove(&key);
            }
            warn!(%key, error = %e, "setup dispatch failed, pending session removed");
            return Err(e.into());
        }
        Ok(key)
    }

    /// Moves the addressed established session (or, with `teardown_all`,
    /// every established session of the link) to `TeardownInProgress` and
    /// dispatches the teardown command.
    ///
    /// A dispatch failure leaves the sessions in `TeardownInProgress`.
    pub async fn teardown(
        &self,
        link: LinkId,
        params: TwtParameters,
    ) -> Result<Vec<SessionKey>, TwtError> {
        let (keys, command) = {
            let mut registry = self.registry.write().await;
            let keys = if params.teardown_all {
                let keys = registry.keys_in_state(&link, SessionState::SetupComplete);
                if keys.is_empty() {
                    return Err(TwtError::UnknownSession(format!(
                        "no established session on {link}"
                    )));
                }
                keys
            } else {
                let key = SessionKey::for_request(link, &params);
                let session = registry
                    .find(&key)
                    .ok_or_else(|| TwtError::UnknownSession(key.to_string()))?;
                if session.state != SessionState::SetupComplete {
                    return Err(TwtError::InvalidTransition {
                        from: session.state,
                        to: SessionState::TeardownInProgress,
                    });
                }
                vec![key]
            };

            // Build before mutating so a bad request leaves state alone.
            let command = build_teardown(&keys[0], &params)?;
            for key in &keys {
                registry.transition(key, SessionState::TeardownInProgress)?;
            }
            (keys, command)
        };
        info!(%link, sessions = keys.len(), all = params.teardown_all, "TWT teardown requested");

        if let Err(e) = self.transport.dispatch(link.ifidx, command.into()).await {
            warn!(
                %link,
                error = %e,
                "teardown dispatch failed, sessions stay in TeardownInProgress"
            );
            return Err(e.into());
        }
        Ok(keys)
    }

    // ── Firmware events ──────────────────────────────────────────

    /// Applies a completion event received for `link`.
    ///
    /// Stale or duplicate events yield `UnknownSession` and leave the
    /// registry untouched.
    pub async fn notify_event(
        &self,
        link: LinkId,
        kind: EventKind,
        buf: &[u8],
    ) -> Result<EventOutcome, TwtError> {
        let event = TwtEvent::parse(kind, buf)?;
        debug!(%link, %kind, status = event.status(), "TWT event");
        match event {
            TwtEvent::Setup(ev) => self.on_setup_event(link, ev).await,
            TwtEvent::Teardown(ev) => self.on_teardown_event(link, ev).await,
        }
    }

    async fn on_setup_event(&self, link: LinkId, ev: SetupEvent) -> Result<EventOutcome, TwtError> {
        let assigned = ev
            .descriptor
            .and_then(|d| SessionId::assigned(d.negotiation_type, d.session_id_value()));
        let mut registry = self.registry.write().await;
        let Some(key) = registry.find_pending_setup(&link, ev.dialog_token, assigned) else {
            warn!(%link, dialog_token = ev.dialog_token, "setup event matches no pending session");
            return Err(TwtError::UnknownSession(format!(
                "{link}/dialog token {}",
                ev.dialog_token
            )));
        };

        let rejected_by_peer = ev
            .descriptor
            .is_some_and(|d| d.setup_cmd == SetupCmd::Reject);
        if !ev.is_success() || rejected_by_peer {
            registry.remove(&key);
            warn!(%key, status = ev.status, "TWT setup rejected");
            return Err(TwtError::PeerRejected { status: ev.status });
        }

        let key = match assigned {
            Some(id) if key.id.is_provisional() => {
                // a live holder of the assigned id keeps it; the request stays pending
                let resolved = registry.rekey(&key, id).inspect_err(|e| {
                    warn!(%key, error = %e, "assigned id already in use");
                })?;
                if let Some(params) = registry.params_mut(&resolved) {
                    match id {
                        SessionId::Broadcast(bid) => params.broadcast_id = bid,
                        SessionId::Flow(flow_id) => params.flow_id = flow_id,
                        _ => {}
                    }
                }
                info!(from = %key.id, to = %resolved.id, "provisional session resolved");
                resolved
            }
            _ => key,
        };

        registry.transition(&key, SessionState::SetupComplete)?;
        info!(%key, status = ev.status, "TWT session established");
        Ok(EventOutcome::SetupComplete(key))
    }

    async fn on_teardown_event(
        &self,
        link: LinkId,
        ev: TeardownEvent,
    ) -> Result<EventOutcome, TwtError> {
        let mut registry = self.registry.write().await;
        let named = ev
            .descriptor
            .filter(|d| !d.teardown_all)
            .and_then(|d| SessionId::assigned(d.negotiation_type, d.session_id_value()));

        let keys: Vec<SessionKey> = if ev.descriptor.is_some_and(|d| d.teardown_all) {
            let mut keys = registry.keys_in_state(&link, SessionState::TeardownInProgress);
            keys.extend(registry.keys_in_state(&link, SessionState::SetupComplete));
            keys
        } else if let Some(id) = named {
            let key = SessionKey::new(link, id);
            match registry.find(&key).map(|s| s.state) {
                Some(SessionState::SetupComplete | SessionState::TeardownInProgress) => vec![key],
                _ => Vec::new(),
            }
        } else {
            registry.keys_in_state(&link, SessionState::TeardownInProgress)
        };

        if keys.is_empty() {
            warn!(%link, status = ev.status, "teardown event matches no session");
            return Err(TwtError::UnknownSession(format!("{link}/teardown")));
        }

        if !ev.is_success() {
            for key in &keys {
                registry.force_complete(key)?;
                registry.remove(key);
            }
            warn!(%link, status = ev.status, sessions = keys.len(), "TWT teardown failed, sessions dropped");
            return Err(TwtError::PeerRejected { status: ev.status });
        }

        for key in &keys {
            if registry.find(key).map(|s| s.state) == Some(SessionState::SetupComplete) {
                warn!(%key, "peer-initiated TWT teardown");
                registry.transition(key, SessionState::TeardownInProgress)?;
            }
            registry.transition(key, SessionState::TeardownComplete)?;
            registry.remove(key);
            info!(%key, "TWT session torn down");
        }
        Ok(EventOutcome::TeardownComplete(keys))
    }

    // ── Interface lifecycle ──────────────────────────────────────

    /// Purges every session on `ifidx` regardless of state. Safe to call
    /// while requests or events for the interface are in flight.
    pub async fn remove_interface(&self, ifidx: u8) -> Vec<TwtSession> {
        let purged = self.registry.write().await.cleanup_all(ifidx);
        self.enabled.lock().await.remove(&ifidx);
        if !purged.is_empty() {
            info!(ifidx, sessions = purged.len(), "TWT sessions purged");
        }
        purged
    }

    // ── Lookup ───────────────────────────────────────────────────

    pub async fn session(&self, key: &SessionKey) -> Option<TwtSession> {
        self.registry.read().await.find(key).cloned()
    }

    pub async fn sessions_for_interface(&self, ifidx: u8) -> Vec<TwtSession> {
        self.registry
            .read()
            .await
            .find_all_for_interface(ifidx)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::command::TwtCommand;
    use crate::descriptor::TeardownDescriptor;
    use crate::error::DispatchError;
    use crate::message::{MacAddr, NegotiationType};

    #[derive(Default)]
    struct Recorder {
        commands: std::sync::Mutex<Vec<(u8, TwtCommand)>>,
        enables: std::sync::Mutex<Vec<u8>>,
        fail_with: Option<DispatchError>,
    }

    #[async_trait]
    impl FirmwareChannel for Recorder {
        async fn enable(&self, ifidx: u8) -> Result<(), DispatchError> {
            self.enables.lock().unwrap().push(ifidx);
            Ok(())
        }

        async fn dispatch(&self, ifidx: u8, command: TwtCommand) -> Result<(), DispatchError> {
            if let Some(e) = &self.fail_with {
                return Err(e.clone());
            }
            self.commands.lock().unwrap().push((ifidx, command));
            Ok(())
        }
    }

    fn link() -> LinkId {
        LinkId::new(1, 0, MacAddr([0x02, 0xaa, 0, 0, 0, 1]))
    }

    fn manager() -> SessionManager<Recorder> {
        SessionManager::new(Recorder::default(), ManagerConfig::default())
    }

    fn setup_params(flow_id: u8, dialog_token: u8) -> TwtParameters {
        TwtParameters {
            flow_id,
            dialog_token,
            min_wake_duration: 32,
            mantissa: 1024,
            exponent: 8,
            ..TwtParameters::default()
        }
    }

    fn setup_event(dialog_token: u8, status: i32) -> Vec<u8> {
        SetupEvent {
            dialog_token,
            status,
            descriptor: None,
        }
        .to_bytes()
        .unwrap()
        .to_vec()
    }

    fn teardown_event(status: i32, descriptor: Option<TeardownDescriptor>) -> Vec<u8> {
        TeardownEvent { status, descriptor }.to_bytes().to_vec()
    }

    async fn established(mgr: &SessionManager<Recorder>, flow_id: u8, token: u8) -> SessionKey {
        let key = mgr.setup(link(), setup_params(flow_id, token)).await.unwrap();
        mgr.notify_event(link(), EventKind::SetupComplete, &setup_event(token, 0))
            .await
            .unwrap();
        key
    }

    #[tokio::test]
    async fn setup_then_complete() {
        let mgr = manager();
        let key = mgr.setup(link(), setup_params(3, 10)).await.unwrap();
        assert_eq!(key.id, SessionId::Flow(3));
        assert_eq!(
            mgr.session(&key).await.unwrap().state,
            SessionState::SetupInProgress
        );
        assert_eq!(mgr.transport.commands.lock().unwrap().len(), 1);

        let outcome = mgr
            .notify_event(link(), EventKind::SetupComplete, &setup_event(10, 0))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::SetupComplete(key));
        assert_eq!(
            mgr.session(&key).await.unwrap().state,
            SessionState::SetupComplete
        );
    }

    #[tokio::test]
    async fn positive_status_is_success() {
        let mgr = manager();
        let key = mgr.setup(link(), setup_params(2, 4)).await.unwrap();
        mgr.notify_event(link(), EventKind::SetupComplete, &setup_event(4, 17))
            .await
            .unwrap();
        assert_eq!(
            mgr.session(&key).await.unwrap().state,
            SessionState::SetupComplete
        );
    }

    #[tokio::test]
    async fn negative_status_removes_session() {
        let mgr = manager();
        let key = mgr.setup(link(), setup_params(1, 5)).await.unwrap();
        let err = mgr
            .notify_event(link(), EventKind::SetupComplete, &setup_event(5, -1))
            .await
            .unwrap_err();
        assert!(matches!(err, TwtError::PeerRejected { status: -1 }));
        assert!(mgr.session(&key).await.is_none());
    }

    #[tokio::test]
    async fn operation_must_match_parameters() {
        let mgr = manager();
        let err = mgr
            .request_operation(TwtOperation::Teardown, link(), setup_params(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TwtError::InvalidParameter(_)));
        assert_eq!(mgr.session_count().await, 0);
    }

    #[tokio::test]
    async fn enable_forwards_to_firmware() {
        let mgr = manager();
        let params = TwtParameters {
            operation: TwtOperation::Enable,
            ..TwtParameters::default()
        };
        mgr.request_operation(TwtOperation::Enable, link(), params)
            .await
            .unwrap();
        assert_eq!(*mgr.transport.enables.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn enable_on_first_setup_only_once() {
        let config = ManagerConfig {
            enable_on_first_setup: true,
            ..ManagerConfig::default()
        };
        let mgr = SessionManager::new(Recorder::default(), config);
        mgr.setup(link(), setup_params(0, 1)).await.unwrap();
        mgr.setup(link(), setup_params(1, 2)).await.unwrap();
        assert_eq!(*mgr.transport.enables.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn invalid_setup_leaves_no_session() {
        let mgr = manager();
        let err = mgr.setup(link(), setup_params(9, 0)).await.unwrap_err();
        assert!(matches!(err, TwtError::InvalidParameter(_)));
        assert_eq!(mgr.session_count().await, 0);
    }

    #[tokio::test]
    async fn setup_dispatch_failure_rolls_back() {
        let recorder = Recorder {
            fail_with: Some(DispatchError::ChannelClosed),
            ..Recorder::default()
        };
        let mgr = SessionManager::new(recorder, ManagerConfig::default());
        let err = mgr.setup(link(), setup_params(2, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            TwtError::DispatchFailure(DispatchError::ChannelClosed)
        ));
        assert_eq!(mgr.session_count().await, 0);
    }

    #[tokio::test]
    async fn teardown_requires_established_session() {
        let mgr = manager();
        let params = setup_params(4, 1);
        mgr.setup(link(), params.clone()).await.unwrap();
        let err = mgr.teardown(link(), params.teardown_of()).await.unwrap_err();
        assert!(matches!(
            err,
            TwtError::InvalidTransition {
                from: SessionState::SetupInProgress,
                ..
            }
        ));

        let err = mgr
            .teardown(link(), setup_params(5, 1).teardown_of())
            .await
            .unwrap_err();
        assert!(matches!(err, TwtError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn teardown_round_trip() {
        let mgr = manager();
        let key = established(&mgr, 6, 2).await;
        let keys = mgr
            .teardown(link(), setup_params(6, 2).teardown_of())
            .await
            .unwrap();
        assert_eq!(keys, vec![key]);
        assert_eq!(
            mgr.session(&key).await.unwrap().state,
            SessionState::TeardownInProgress
        );

        let outcome = mgr
            .notify_event(link(), EventKind::TeardownComplete, &teardown_event(0, None))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::TeardownComplete(vec![key]));
        assert!(mgr.session(&key).await.is_none());

        // the key is free again
        mgr.setup(link(), setup_params(6, 3)).await.unwrap();
    }

    #[tokio::test]
    async fn peer_initiated_teardown() {
        let mgr = manager();
        let key = established(&mgr, 0, 1).await;
        let descriptor = TeardownDescriptor {
            negotiation_type: NegotiationType::Individual,
            flow_id: 0,
            broadcast_id: 0,
            teardown_all: false,
        };
        mgr.notify_event(
            link(),
            EventKind::TeardownComplete,
            &teardown_event(0, Some(descriptor)),
        )
        .await
        .unwrap();
        assert!(mgr.session(&key).await.is_none());
    }

    #[tokio::test]
    async fn teardown_all_covers_link() {
        let mgr = manager();
        let a = established(&mgr, 1, 1).await;
        let b = established(&mgr, 2, 2).await;
        let params = TwtParameters {
            teardown_all: true,
            ..setup_params(1, 0).teardown_of()
        };
        let mut keys = mgr.teardown(link(), params).await.unwrap();
        keys.sort_by_key(|k| k.to_string());
        assert_eq!(keys, vec![a, b]);

        let outcome = mgr
            .notify_event(link(), EventKind::TeardownComplete, &teardown_event(0, None))
            .await
            .unwrap();
        let EventOutcome::TeardownComplete(done) = outcome else {
            panic!("expected teardown outcome");
        };
        assert_eq!(done.len(), 2);
        assert_eq!(mgr.session_count().await, 0);
    }

    #[tokio::test]
    async fn stale_event_is_not_fatal() {
        let mgr = manager();
        let key = mgr.setup(link(), setup_params(3, 8)).await.unwrap();
        let err = mgr
            .notify_event(link(), EventKind::SetupComplete, &setup_event(9, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TwtError::UnknownSession(_)));
        assert_eq!(
            mgr.session(&key).await.unwrap().state,
            SessionState::SetupInProgress
        );

        let err = mgr
            .notify_event(link(), EventKind::TeardownComplete, &teardown_event(0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, TwtError::UnknownSession(_)));
        assert_eq!(mgr.session_count().await, 1);
    }

    /// Accepting setup event whose descriptor reports `flow_id`.
    fn answered_event(dialog_token: u8, flow_id: u8) -> Vec<u8> {
        let requested = setup_params(flow_id, dialog_token);
        let key = SessionKey::for_request(link(), &requested);
        let mut descriptor = build_setup(&key, &requested).unwrap().descriptor;
        descriptor.setup_cmd = SetupCmd::Accept;
        SetupEvent {
            dialog_token,
            status: 0,
            descriptor: Some(descriptor),
        }
        .to_bytes()
        .unwrap()
        .to_vec()
    }

    #[tokio::test]
    async fn assigned_id_held_by_live_session() {
        let mgr = manager();
        let held = mgr.setup(link(), setup_params(1, 3)).await.unwrap();
        let provisional = mgr.setup(link(), setup_params(0xFF, 5)).await.unwrap();

        let err = mgr
            .notify_event(link(), EventKind::SetupComplete, &answered_event(5, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TwtError::DuplicateSession(k) if k == held));
        assert_eq!(mgr.session_count().await, 2);
        let session = mgr.session(&held).await.unwrap();
        assert_eq!(session.params.dialog_token, 3);
        assert_eq!(session.state, SessionState::SetupInProgress);
        assert_eq!(
            mgr.session(&provisional).await.unwrap().state,
            SessionState::SetupInProgress
        );

        // the holder's own answer still completes it
        let outcome = mgr
            .notify_event(link(), EventKind::SetupComplete, &answered_event(3, 1))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::SetupComplete(held));
    }

    #[tokio::test]
    async fn shared_token_completes_named_flow() {
        let mgr = manager();
        let flow1 = mgr.setup(link(), setup_params(1, 0)).await.unwrap();
        let flow2 = mgr.setup(link(), setup_params(2, 0)).await.unwrap();

        let outcome = mgr
            .notify_event(link(), EventKind::SetupComplete, &answered_event(0, 2))
            .await
            .unwrap();
        assert_eq!(outcome, EventOutcome::SetupComplete(flow2));
        assert_eq!(
            mgr.session(&flow1).await.unwrap().state,
            SessionState::SetupInProgress
        );
        assert_eq!(
            mgr.session(&flow2).await.unwrap().state,
            SessionState::SetupComplete
        );
    }

    #[tokio::test]
    async fn remove_interface_purges() {
        let mgr = manager();
        established(&mgr, 1, 1).await;
        mgr.setup(link(), setup_params(2, 2)).await.unwrap();
        let other = LinkId::new(2, 0, MacAddr([0x02, 0xbb, 0, 0, 0, 2]));
        mgr.setup(other, setup_params(1, 1)).await.unwrap();

        let purged = mgr.remove_interface(1).await;
        assert_eq!(purged.len(), 2);
        assert!(mgr.sessions_for_interface(1).await.is_empty());
        assert_eq!(mgr.sessions_for_interface(2).await.len(), 1);
    }
}
