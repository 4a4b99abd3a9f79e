//! Voice session plumbing for the callpilot widget.
//!
//! The real-time audio session itself belongs to a third-party SDK. This
//! crate pins down the contract that SDK has to satisfy ([`VoiceSdk`]) and
//! wraps one long-lived SDK client in a [`VoiceSessionAdapter`], which
//! turns the SDK's callback events into a small closed set of
//! [`SessionEvent`]s for the call controller.
//!
//! Two rules are enforced here rather than left to callers:
//!
//! - listeners from a previous session are removed before a new session
//!   starts, and events that still arrive for an old session are dropped;
//! - transcript updates are diffed against the previous snapshot so only
//!   new or edited turns are surfaced.

pub mod adapter;
pub mod error;
pub mod loopback;
pub mod sdk;
pub mod transcript;

pub use adapter::{SessionEvent, VoiceSessionAdapter};
pub use error::VoiceError;
pub use loopback::{LoopbackRemote, LoopbackSdk, LoopbackStats};
pub use sdk::{Listener, SdkEvent, SdkEventKind, VoiceSdk};
pub use transcript::TranscriptDiff;
