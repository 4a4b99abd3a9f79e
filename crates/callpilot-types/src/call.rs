//! Call lifecycle state and credential types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a voice call.
///
/// `Error` is transient: the controller publishes it when an attempt fails
/// and resets to `Idle` immediately afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No call and no pending request.
    #[default]
    Idle,
    /// A credential request or SDK start is in flight.
    Connecting,
    /// The voice session is live.
    Active,
    /// The last attempt failed.
    Error,
}

impl CallState {
    /// Returns the canonical lowercase label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Error => "error",
        }
    }

    /// Whether a call is either being set up or running.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the controller's session, handed to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub state: CallState,
    pub muted: bool,
}

/// Credentials returned by the call registration endpoint.
///
/// Valid for a single call attempt and never persisted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCredentials {
    pub call_id: String,
    pub access_token: String,
}

impl CallCredentials {
    pub fn new(call_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            access_token: access_token.into(),
        }
    }
}

impl fmt::Debug for CallCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallCredentials")
            .field("call_id", &self.call_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}
