//! Local persisted state for the callpilot widget.
//!
//! The browser widget keeps a handful of values in local storage; here the
//! same key/value surface is backed by a single SQLite file. The only
//! consumer today is the [`ConsentStore`], which records whether the
//! visitor agreed to data collection.
//!
//! # Design decisions
//!
//! - **SQLite key/value table**: one `local_storage` table keyed by string,
//!   so values written by older releases stay readable.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` and tracked in `_callpilot_migrations`.

mod consent;
mod error;
mod migrations;
mod storage;

pub use consent::{ConsentStore, CONSENT_EMAIL_KEY, CONSENT_STATUS_KEY, CONSENT_TIMESTAMP_KEY};
pub use error::StoreError;
pub use migrations::{run_migrations, MigrationError};
pub use storage::LocalStorage;
