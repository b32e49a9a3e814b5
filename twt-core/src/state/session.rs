//! Session identity and lifecycle.
//!
//! Provides the `SessionState` machine with validated transitions that
//! return `Result` instead of panicking, and the composite key every
//! session is indexed under.

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::TwtError;
use crate::message::{MacAddr, NegotiationType};
use crate::params::{AUTO_ASSIGN_ID, TwtParameters};

// ── LinkId ───────────────────────────────────────────────────────

/// The (interface, BSS config, peer) triple a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId {
    pub ifidx: u8,
    pub bsscfgidx: i32,
    pub peer: MacAddr,
}

impl LinkId {
    pub fn new(ifidx: u8, bsscfgidx: i32, peer: MacAddr) -> Self {
        Self {
            ifidx,
            bsscfgidx,
            peer,
        }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}/bss{}/{}", self.ifidx, self.bsscfgidx, self.peer)
    }
}

// ── SessionId ────────────────────────────────────────────────────

/// Negotiation-scoped session id.
///
/// Requests carrying the auto-assign sentinel are registered under a
/// provisional id derived from their dialog token. The setup completion
/// event resolves it to the concrete id when it carries a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionId {
    /// Individual or wake-TBTT session, 3-bit flow id.
    Flow(u8),
    /// Broadcast session, 5-bit broadcast TWT id.
    Broadcast(u8),
    /// Individual session awaiting a firmware-assigned flow id.
    AutoFlow { dialog_token: u8 },
    /// Broadcast session awaiting a firmware-assigned broadcast id.
    AutoBroadcast { dialog_token: u8 },
}

impl SessionId {
    /// The id a request is registered under.
    pub fn for_request(params: &TwtParameters) -> Self {
        let broadcast = params.negotiation_type.is_broadcast();
        match (params.session_id_value(), broadcast) {
            (AUTO_ASSIGN_ID, false) => Self::AutoFlow {
                dialog_token: params.dialog_token,
            },
            (AUTO_ASSIGN_ID, true) => Self::AutoBroadcast {
                dialog_token: params.dialog_token,
            },
            (id, false) => Self::Flow(id),
            (id, true) => Self::Broadcast(id),
        }
    }

    /// A concrete id reported by the firmware, `None` for the sentinel.
    pub fn assigned(negotiation: NegotiationType, id: u8) -> Option<Self> {
        match id {
            AUTO_ASSIGN_ID => None,
            id if negotiation.is_broadcast() => Some(Self::Broadcast(id)),
            id => Some(Self::Flow(id)),
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::AutoFlow { .. } | Self::AutoBroadcast { .. })
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast(_) | Self::AutoBroadcast { .. })
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flow(id) => write!(f, "flow {id}"),
            Self::Broadcast(id) => write!(f, "bcast {id}"),
            Self::AutoFlow { dialog_token } => write!(f, "flow auto (token {dialog_token})"),
            Self::AutoBroadcast { dialog_token } => {
                write!(f, "bcast auto (token {dialog_token})")
            }
        }
    }
}

// ── SessionKey ───────────────────────────────────────────────────

/// Identity of a session: at most one live session exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub link: LinkId,
    pub id: SessionId,
}

impl SessionKey {
    pub fn new(link: LinkId, id: SessionId) -> Self {
        Self { link, id }
    }

    /// The key a setup or teardown request addresses.
    pub fn for_request(link: LinkId, params: &TwtParameters) -> Self {
        Self::new(link, SessionId::for_request(params))
    }

    pub fn ifidx(&self) -> u8 {
        self.link.ifidx
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.link, self.id)
    }
}

// ── SessionState ─────────────────────────────────────────────────

/// Lifecycle of a TWT session.
///
/// ```text
///  Unspecified ──► SetupInProgress ──► SetupComplete
///                                           │
///                                           ▼
///            TeardownComplete ◄── TeardownInProgress
/// ```
///
/// `TeardownComplete` is terminal; the registry drops a session as soon
/// as it gets there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Unspecified,
    SetupInProgress,
    SetupComplete,
    TeardownInProgress,
    TeardownComplete,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unspecified => "Unspecified",
            Self::SetupInProgress => "SetupInProgress",
            Self::SetupComplete => "SetupComplete",
            Self::TeardownInProgress => "TeardownInProgress",
            Self::TeardownComplete => "TeardownComplete",
        };
        f.write_str(name)
    }
}

impl SessionState {
    /// Whether `self → next` is one of the four lifecycle edges.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Unspecified, Self::SetupInProgress)
                | (Self::SetupInProgress, Self::SetupComplete)
                | (Self::SetupComplete, Self::TeardownInProgress)
                | (Self::TeardownInProgress, Self::TeardownComplete)
        )
    }

    /// Moves to `next` if the edge is allowed; otherwise leaves the state
    /// untouched.
    pub fn advance(&mut self, next: SessionState) -> Result<(), TwtError> {
        if !self.can_transition_to(next) {
            return Err(TwtError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(self) -> bool {
        self == Self::TeardownComplete
    }

    /// A session that is established or on its way to being established.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

// ── TwtSession ───────────────────────────────────────────────────

/// One tracked TWT session.
#[derive(Debug, Clone)]
pub struct TwtSession {
    pub key: SessionKey,
    pub state: SessionState,
    /// Parameters that established the session.
    pub params: TwtParameters,
    /// When `state` last changed.
    pub updated_at: Instant,
}

impl TwtSession {
    /// A session whose setup has just been accepted for encoding.
    pub fn pending(key: SessionKey, params: TwtParameters) -> Self {
        Self {
            key,
            state: SessionState::SetupInProgress,
            params,
            updated_at: Instant::now(),
        }
    }

    pub fn advance(&mut self, next: SessionState) -> Result<SessionState, TwtError> {
        let previous = self.state;
        self.state.advance(next)?;
        self.updated_at = Instant::now();
        Ok(previous)
    }

    /// Administrative shortcut to the terminal state, bypassing the edge set.
    pub(crate) fn force_terminal(&mut self) {
        self.state = SessionState::TeardownComplete;
        self.updated_at = Instant::now();
    }

    /// Time spent in the current state.
    pub fn in_state_for(&self) -> Duration {
        self.updated_at.elapsed()
    }
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> LinkId {
        LinkId::new(0, 0, MacAddr([0x02, 0, 0, 0, 0, 1]))
    }

    #[test]
    fn lifecycle_edges() {
        let mut state = SessionState::default();
        assert_eq!(state, SessionState::Unspecified);
        state.advance(SessionState::SetupInProgress).unwrap();
        state.advance(SessionState::SetupComplete).unwrap();
        state.advance(SessionState::TeardownInProgress).unwrap();
        state.advance(SessionState::TeardownComplete).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn rejected_edge_leaves_state() {
        let mut state = SessionState::SetupInProgress;
        let err = state.advance(SessionState::TeardownInProgress).unwrap_err();
        assert!(matches!(
            err,
            TwtError::InvalidTransition {
                from: SessionState::SetupInProgress,
                to: SessionState::TeardownInProgress
            }
        ));
        assert_eq!(state, SessionState::SetupInProgress);
    }

    #[test]
    fn no_way_back_from_teardown() {
        let mut state = SessionState::TeardownInProgress;
        assert!(state.advance(SessionState::SetupComplete).is_err());
        assert_eq!(state, SessionState::TeardownInProgress);
    }

    #[test]
    fn request_ids() {
        let individual = TwtParameters {
            flow_id: 5,
            ..TwtParameters::default()
        };
        assert_eq!(SessionId::for_request(&individual), SessionId::Flow(5));

        let auto = TwtParameters {
            flow_id: AUTO_ASSIGN_ID,
            dialog_token: 9,
            ..TwtParameters::default()
        };
        let id = SessionId::for_request(&auto);
        assert_eq!(id, SessionId::AutoFlow { dialog_token: 9 });
        assert!(id.is_provisional());

        let bcast = TwtParameters {
            negotiation_type: NegotiationType::Broadcast,
            broadcast_id: 20,
            ..TwtParameters::default()
        };
        assert_eq!(SessionId::for_request(&bcast), SessionId::Broadcast(20));
    }

    #[test]
    fn assigned_ignores_sentinel() {
        assert_eq!(
            SessionId::assigned(NegotiationType::Individual, AUTO_ASSIGN_ID),
            None
        );
        assert_eq!(
            SessionId::assigned(NegotiationType::Broadcast, 3),
            Some(SessionId::Broadcast(3))
        );
    }

    #[test]
    fn key_display() {
        let key = SessionKey::new(link(), SessionId::Flow(2));
        assert_eq!(key.to_string(), "if0/bss0/02:00:00:00:00:01/flow 2");
    }

    #[test]
    fn session_advance_reports_previous() {
        let key = SessionKey::new(link(), SessionId::Flow(1));
        let mut session = TwtSession::pending(key, TwtParameters::default());
        let previous = session.advance(SessionState::SetupComplete).unwrap();
        assert_eq!(previous, SessionState::SetupInProgress);
        session.force_terminal();
        assert_eq!(session.state, SessionState::TeardownComplete);
    }
}
