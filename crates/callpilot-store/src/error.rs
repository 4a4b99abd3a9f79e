//! Error types for the local store.

use crate::migrations::MigrationError;

/// Errors that can occur while reading or writing local state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("local storage database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The schema could not be brought up to date.
    #[error("local storage migration error: {0}")]
    Migration(#[from] MigrationError),
}
