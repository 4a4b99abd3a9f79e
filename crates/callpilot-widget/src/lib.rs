//! The callpilot widget: a "talk to our AI agent" entry point.
//!
//! A visitor can open a real-time voice call with an AI agent or ask it
//! text questions. This crate holds everything between the visitor's
//! clicks and the outside world:
//!
//! - [`api`]: the HTTP collaborators (`register-call`, `get-guide`,
//!   `is_whitelisted`, account lookup);
//! - [`controller`]: the call session state machine that sequences
//!   credential fetch and the voice SDK;
//! - [`guide`]: the text question/answer conversation;
//! - [`access`]: the optional whitelist gate in front of the widget;
//! - [`widget`]: the presentation model a renderer consumes, including the
//!   consent gate.
//!
//! The `callpilot` binary drives all of it from a terminal.

pub mod access;
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod guide;
pub mod widget;

pub use access::{AccessDecision, AccessGate};
pub use api::{extract_email, ApiClient, CredentialFetcher, GuideFetcher};
pub use config::{load_config, Config, ConfigError};
pub use controller::{CallSessionController, Command, ControllerHandle, Notice};
pub use error::WidgetError;
pub use guide::GuideConversation;
pub use widget::{ButtonAppearance, Icon, PendingAction, Tint, Widget};
