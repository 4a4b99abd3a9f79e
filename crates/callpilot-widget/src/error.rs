//! Error taxonomy for the widget.

use crate::config::ConfigError;
use callpilot_store::StoreError;
use callpilot_voice::VoiceError;
use thiserror::Error;

/// Everything that can go wrong between a click and the agent.
///
/// Only `Config` is fatal; the controller turns every other variant into a
/// reset to idle plus a user-visible notice.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure, timeout, or a non-2xx status.
    #[error("network error: {0}")]
    Network(String),

    /// The registration endpoint answered without usable credentials.
    #[error("invalid call credentials: {0}")]
    Credential(String),

    #[error("voice session error: {0}")]
    Session(#[from] VoiceError),

    #[error("local storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("call controller has shut down")]
    ControllerClosed,
}

impl From<reqwest::Error> for WidgetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl WidgetError {
    /// The alert text shown to the visitor for a failed call attempt.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Session(_) => "An error occurred during the conversation.",
            _ => "An error occurred while starting the call.",
        }
    }
}
