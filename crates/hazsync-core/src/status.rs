//! Collaboration session status and the legal-transition map.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a collaboration session.
///
/// Legal transitions: `Active` ↔ `Paused`, `Active` → `Ended`,
/// `Paused` → `Ended`. `Ended` is terminal — no transition leaves it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session is live; participants may join and mutate entries.
    Active,
    /// Session is suspended; joins are rejected until resumed.
    Paused,
    /// Session is over. Terminal.
    Ended,
}

impl SessionStatus {
    /// Whether a transition from `self` to `target` is legal.
    ///
    /// Self-transitions are not legal; they would be no-ops that mask
    /// caller bugs.
    pub fn can_transition_to(self, target: SessionStatus) -> bool {
        matches!(
            (self, target),
            (SessionStatus::Active, SessionStatus::Paused)
                | (SessionStatus::Active, SessionStatus::Ended)
                | (SessionStatus::Paused, SessionStatus::Active)
                | (SessionStatus::Paused, SessionStatus::Ended)
        )
    }

    /// Canonical storage string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "ended" => Ok(SessionStatus::Ended),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Error for unrecognized status strings read from storage or the wire.
#[derive(Debug, thiserror::Error)]
#[error("unknown session status: {0}")]
pub struct UnknownStatus(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_can_pause_and_end() {
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Paused));
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Ended));
    }

    #[test]
    fn paused_can_resume_and_end() {
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Active));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Ended));
    }

    #[test]
    fn ended_is_terminal() {
        for target in [
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Ended,
        ] {
            assert!(!SessionStatus::Ended.can_transition_to(target));
        }
    }

    #[test]
    fn self_transitions_rejected() {
        assert!(!SessionStatus::Active.can_transition_to(SessionStatus::Active));
        assert!(!SessionStatus::Paused.can_transition_to(SessionStatus::Paused));
    }

    #[test]
    fn round_trips_through_storage_string() {
        for status in [
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Ended,
        ] {
            let parsed: SessionStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_string_fails() {
        let err = "archived".parse::<SessionStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown session status: archived");
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
        let back: SessionStatus = serde_json::from_str("\"ended\"").unwrap();
        assert_eq!(back, SessionStatus::Ended);
    }
}
