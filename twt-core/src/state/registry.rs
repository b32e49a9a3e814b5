//! Keyed storage of every tracked TWT session.
//!
//! The registry enforces the uniqueness invariant (one live session per
//! `SessionKey`) and the lifecycle edge set. It does no locking itself;
//! the session manager owns it behind a `RwLock`.

use std::collections::HashMap;

use tracing::debug;

use crate::error::TwtError;
use crate::params::TwtParameters;
use crate::state::session::{LinkId, SessionId, SessionKey, SessionState, TwtSession};

// ── SessionRegistry ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionKey, TwtSession>,
    /// Cap on live sessions per interface; `None` is unbounded.
    limit_per_interface: Option<usize>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit_per_interface: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            limit_per_interface: Some(limit_per_interface),
        }
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Registers a session in `SetupInProgress`.
    ///
    /// Fails with `DuplicateSession` while a non-terminal session holds
    /// the key.
    pub fn insert_pending(
        &mut self,
        key: SessionKey,
        params: TwtParameters,
    ) -> Result<&TwtSession, TwtError> {
        if self.sessions.get(&key).is_some_and(|s| s.state.is_active()) {
            return Err(TwtError::DuplicateSession(key));
        }
        if let Some(limit) = self.limit_per_interface {
            let live = self
                .sessions
                .values()
                .filter(|s| s.key.ifidx() == key.ifidx() && s.key != key)
                .count();
            if live >= limit {
                return Err(TwtError::SessionLimit {
                    ifidx: key.ifidx(),
                    limit,
                });
            }
        }

        let session = TwtSession::pending(key, params);
        self.sessions.insert(key, session);
        Ok(&self.sessions[&key])
    }

    /// Applies one lifecycle edge and returns the state it left.
    pub fn transition(
        &mut self,
        key: &SessionKey,
        next: SessionState,
    ) -> Result<SessionState, TwtError> {
        let session = self
            .sessions
            .get_mut(key)
            .ok_or_else(|| TwtError::UnknownSession(key.to_string()))?;
        session.advance(next)
    }

    /// Administrative `* → TeardownComplete` used by forced cleanup.
    pub fn force_complete(&mut self, key: &SessionKey) -> Result<SessionState, TwtError> {
        let session = self
            .sessions
            .get_mut(key)
            .ok_or_else(|| TwtError::UnknownSession(key.to_string()))?;
        let previous = session.state;
        session.force_terminal();
        Ok(previous)
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<TwtSession> {
        self.sessions.remove(key)
    }

    /// Moves a session to a new id, keeping its state.
    ///
    /// Fails with `DuplicateSession` while a non-terminal session holds
    /// the target key; the registry is left untouched in that case.
    pub fn rekey(&mut self, key: &SessionKey, id: SessionId) -> Result<SessionKey, TwtError> {
        let new_key = SessionKey::new(key.link, id);
        if new_key == *key {
            return Ok(new_key);
        }
        if self.sessions.get(&new_key).is_some_and(|s| s.state.is_active()) {
            return Err(TwtError::DuplicateSession(new_key));
        }
        let mut session = self
            .sessions
            .remove(key)
            .ok_or_else(|| TwtError::UnknownSession(key.to_string()))?;
        session.key = new_key;
        if let Some(stale) = self.sessions.insert(new_key, session) {
            debug!(key = %new_key, state = %stale.state, "re-key dropped a terminal session");
        }
        Ok(new_key)
    }

    /// Mutable access to the stored parameters of a session.
    pub fn params_mut(&mut self, key: &SessionKey) -> Option<&mut TwtParameters> {
        self.sessions.get_mut(key).map(|s| &mut s.params)
    }

    /// Drops every session on `ifidx`, whatever its state, and returns
    /// them.
    pub fn cleanup_all(&mut self, ifidx: u8) -> Vec<TwtSession> {
        let keys: Vec<SessionKey> = self
            .sessions
            .keys()
            .filter(|k| k.ifidx() == ifidx)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| {
                let mut session = self.sessions.remove(&key)?;
                session.force_terminal();
                Some(session)
            })
            .collect()
    }

    // ── Lookup ───────────────────────────────────────────────────

    pub fn find(&self, key: &SessionKey) -> Option<&TwtSession> {
        self.sessions.get(key)
    }

    pub fn find_all_for_interface(&self, ifidx: u8) -> Vec<&TwtSession> {
        self.sessions
            .values()
            .filter(|s| s.key.ifidx() == ifidx)
            .collect()
    }

    /// Keys of the sessions on `link` currently in `state`.
    pub fn keys_in_state(&self, link: &LinkId, state: SessionState) -> Vec<SessionKey> {
        self.sessions
            .values()
            .filter(|s| s.key.link == *link && s.state == state)
            .map(|s| s.key)
            .collect()
    }

    /// The pending setup a completion event on `link` answers.
    ///
    /// `assigned` is the concrete id the event's descriptor reports. A
    /// pending session under exactly that id and token wins; otherwise the
    /// oldest auto-assigned session sent with `dialog_token` is picked.
    /// Without an id any pending session with the token may match.
    pub fn find_pending_setup(
        &self,
        link: &LinkId,
        dialog_token: u8,
        assigned: Option<SessionId>,
    ) -> Option<SessionKey> {
        let pending = |s: &&TwtSession| {
            s.key.link == *link
                && s.state == SessionState::SetupInProgress
                && s.params.dialog_token == dialog_token
        };
        if let Some(id) = assigned {
            let exact = SessionKey::new(*link, id);
            if self.sessions.get(&exact).is_some_and(|s| pending(&s)) {
                return Some(exact);
            }
        }
        self.sessions
            .values()
            .filter(pending)
            .filter(|s| assigned.is_none() || s.key.id.is_provisional())
            .min_by_key(|s| s.updated_at)
            .map(|s| s.key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TwtSession> {
        self.sessions.values()
    }
}

// ── Tests ─────────────────────────────────────────────────────────
