//! The contract a real-time voice SDK client has to provide.

use crate::error::VoiceError;
use callpilot_types::TranscriptEntry;
use std::future::Future;

/// Event names emitted by the SDK client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkEventKind {
    CallStarted,
    CallEnded,
    Error,
    Update,
}

impl SdkEventKind {
    pub const ALL: [SdkEventKind; 4] = [
        SdkEventKind::CallStarted,
        SdkEventKind::CallEnded,
        SdkEventKind::Error,
        SdkEventKind::Update,
    ];

    /// The event name as the SDK spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallStarted => "call_started",
            Self::CallEnded => "call_ended",
            Self::Error => "error",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for SdkEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as emitted by the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkEvent {
    CallStarted,
    CallEnded,
    Error(String),
    /// Carries the whole transcript so far, not just the latest turn.
    Update { transcript: Vec<TranscriptEntry> },
}

impl SdkEvent {
    pub fn kind(&self) -> SdkEventKind {
        match self {
            Self::CallStarted => SdkEventKind::CallStarted,
            Self::CallEnded => SdkEventKind::CallEnded,
            Self::Error(_) => SdkEventKind::Error,
            Self::Update { .. } => SdkEventKind::Update,
        }
    }
}

/// Callback registered for one event kind.
pub type Listener = Box<dyn Fn(SdkEvent) + Send + Sync>;

/// A single persistent SDK client instance.
///
/// Listeners accumulate: registering twice for the same kind means both
/// fire, which is why [`crate::VoiceSessionAdapter`] clears them before
/// every session.
pub trait VoiceSdk: Send {
    fn on(&mut self, kind: SdkEventKind, listener: Listener);

    fn remove_all_listeners(&mut self, kind: SdkEventKind);

    /// Opens a session with the given access token. Resolving `Ok` only
    /// means the request was accepted; the session counts as started once
    /// `call_started` fires.
    fn start_call(
        &mut self,
        access_token: &str,
    ) -> impl Future<Output = Result<(), VoiceError>> + Send;

    /// Ends the current session, if any.
    fn stop_call(&mut self);

    fn mute(&mut self);

    fn unmute(&mut self);
}
