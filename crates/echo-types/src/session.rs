//! Chat session types.
//!
//! A session is a bounded conversation between two participants. It is
//! tracked for lifecycle and activity purposes only; message analysis does
//! not require a session to exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a session.
///
/// Transitions are monotonic: `Pending -> Active -> Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Active,
    Ended,
}

impl SessionState {
    /// Whether moving from `self` to `next` respects the lifecycle order.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        next >= self
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Pending => write!(f, "pending"),
            SessionState::Active => write!(f, "active"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SessionState::Pending),
            "active" => Ok(SessionState::Active),
            "ended" => Ok(SessionState::Ended),
            other => Err(format!("invalid session state: '{other}'")),
        }
    }
}

/// A two-party chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub participant_ids: [String; 2],
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub state: SessionState,
}

impl Session {
    /// A fresh `Pending` session created now.
    pub fn new(id: impl Into<String>, participant_ids: [String; 2]) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            participant_ids,
            created_at: now,
            last_activity_at: now,
            state: SessionState::Pending,
        }
    }

    /// Whether the session has been idle for longer than `idle_timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        now - self.last_activity_at > idle_timeout
    }

    pub fn is_ended(&self) -> bool {
        self.state == SessionState::Ended
    }
}
