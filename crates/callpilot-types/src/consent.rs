//! Data-collection consent types.

use serde::{Deserialize, Serialize};

/// Outcome of a consent lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Granted,
    Denied,
    /// No usable record: never asked, incomplete, or invalidated.
    Unknown,
}

impl ConsentStatus {
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

impl From<bool> for ConsentStatus {
    fn from(granted: bool) -> Self {
        if granted {
            Self::Granted
        } else {
            Self::Denied
        }
    }
}

/// The persisted consent answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub granted: bool,
    /// RFC 3339 / ISO 8601 timestamp of when the answer was recorded.
    pub timestamp: String,
    /// Identified user the answer is bound to, if any.
    pub email: Option<String>,
}

impl ConsentRecord {
    pub fn status(&self) -> ConsentStatus {
        ConsentStatus::from(self.granted)
    }
}
