//! Shared types for the callpilot widget.
//!
//! This crate holds the data model every other callpilot crate speaks:
//! the call lifecycle state, the credentials returned by call
//! registration, transcript entries, and the persisted consent record.
//! It has no runtime dependencies beyond `serde`, so the store, voice and
//! widget crates can all depend on it without cycles.

pub mod call;
pub mod consent;
pub mod transcript;

pub use call::{CallCredentials, CallSnapshot, CallState};
pub use consent::{ConsentRecord, ConsentStatus};
pub use transcript::{ParseRoleError, Role, TranscriptChange, TranscriptEntry};
