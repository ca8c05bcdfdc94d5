//! Subscription session state machine: `created → started → stopped`.
//!
//! `stopped` is terminal. A stopped session never resumes; resuming a view
//! opens a new session with a new id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::topic::Topic;

/// Identifier of one subscription session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Started,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Stopped => "stopped",
        })
    }
}

/// One topic subscription's identity and lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionSession {
    pub id: SessionId,
    pub topic: Topic,
    state: SessionState,
    started_unix_ms: Option<u64>,
    stopped_unix_ms: Option<u64>,
}

impl SubscriptionSession {
    pub fn new(topic: Topic) -> Self {
        Self {
            id: SessionId::new(),
            topic,
            state: SessionState::Created,
            started_unix_ms: None,
            stopped_unix_ms: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state == SessionState::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    pub fn started_unix_ms(&self) -> Option<u64> {
        self.started_unix_ms
    }

    pub fn stopped_unix_ms(&self) -> Option<u64> {
        self.stopped_unix_ms
    }

    /// `created → started`, once the provider acknowledged the start request.
    pub fn mark_started(&mut self, now_ms: u64) -> Result<()> {
        self.transition(SessionState::Started)?;
        self.started_unix_ms = Some(now_ms);
        Ok(())
    }

    /// Move to `stopped`. Returns false when the session was already stopped,
    /// so callers can issue side effects exactly once.
    pub fn mark_stopped(&mut self, now_ms: u64) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.state = SessionState::Stopped;
        self.stopped_unix_ms = Some(now_ms);
        true
    }

    fn transition(&mut self, to: SessionState) -> Result<()> {
        let allowed = matches!(
            (self.state, to),
            (SessionState::Created, SessionState::Started)
                | (SessionState::Created, SessionState::Stopped)
                | (SessionState::Started, SessionState::Stopped)
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        log::debug!("session {} ({}): {} -> {}", self.id, self.topic, self.state, to);
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut s = SubscriptionSession::new(Topic::Processes);
        assert_eq!(s.state(), SessionState::Created);
        s.mark_started(10).unwrap();
        assert!(s.is_started());
        assert_eq!(s.started_unix_ms(), Some(10));
        assert!(s.mark_stopped(20));
        assert!(s.is_stopped());
        assert_eq!(s.stopped_unix_ms(), Some(20));
    }

    #[test]
    fn test_stop_is_reported_once() {
        let mut s = SubscriptionSession::new(Topic::Memory);
        s.mark_started(1).unwrap();
        assert!(s.mark_stopped(2));
        assert!(!s.mark_stopped(3));
        assert_eq!(s.stopped_unix_ms(), Some(2));
    }

    #[test]
    fn test_no_exit_from_stopped() {
        let mut s = SubscriptionSession::new(Topic::CpuCores);
        s.mark_stopped(1);
        let err = s.mark_started(2).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidTransition {
                from: SessionState::Stopped,
                to: SessionState::Started,
            }
        );
    }

    #[test]
    fn test_double_start_rejected() {
        let mut s = SubscriptionSession::new(Topic::CpuCores);
        s.mark_started(1).unwrap();
        assert!(s.mark_started(2).is_err());
        assert_eq!(s.started_unix_ms(), Some(1));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SubscriptionSession::new(Topic::Processes);
        let b = SubscriptionSession::new(Topic::Processes);
        assert_ne!(a.id, b.id);
    }
}
