//! Conversation transcript entries shared by the voice session and the
//! text guide.

use serde::{Deserialize, Serialize};

/// Speaker of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    /// The AI agent. Voice SDKs report this speaker as `agent`.
    #[serde(alias = "agent")]
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" | "agent" => Ok(Self::Assistant),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown role string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown transcript role: {0}")]
pub struct ParseRoleError(pub String);

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A transcript entry that changed or was appended, with its position in
/// the full transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptChange {
    pub index: usize,
    pub entry: TranscriptEntry,
}
