//! Persisted data-collection consent.
//!
//! Three keys mirror what the browser widget writes to local storage. When
//! a record was bound to an identified user and a different user is now
//! signed in, the record is discarded and consent reverts to unknown.

use crate::error::StoreError;
use crate::storage::LocalStorage;
use callpilot_types::{ConsentRecord, ConsentStatus};
use chrono::{SecondsFormat, Utc};

pub const CONSENT_STATUS_KEY: &str = "dataConsentGiven";
pub const CONSENT_TIMESTAMP_KEY: &str = "dataConsentTimestamp";
pub const CONSENT_EMAIL_KEY: &str = "dataConsentEmail";

/// Gatekeeper for the consent flag.
#[derive(Debug)]
pub struct ConsentStore {
    storage: LocalStorage,
}

impl ConsentStore {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    /// Resolves the consent status for the currently identified user.
    ///
    /// With `current_email` set, a complete record whose email matches is
    /// honoured and a mismatching one is cleared. Without an identified
    /// user, status and timestamp are enough.
    pub fn get(&self, current_email: Option<&str>) -> Result<ConsentStatus, StoreError> {
        let status = self.storage.get(CONSENT_STATUS_KEY)?;
        let timestamp = self.storage.get(CONSENT_TIMESTAMP_KEY)?;

        let (Some(status), Some(_)) = (status, timestamp) else {
            return Ok(ConsentStatus::Unknown);
        };

        let Some(current) = current_email else {
            return Ok(parse_status(&status));
        };

        match self.storage.get(CONSENT_EMAIL_KEY)? {
            Some(stored) if stored == current => Ok(parse_status(&status)),
            Some(stored) => {
                tracing::info!(
                    stored_email = %stored,
                    current_email = %current,
                    "consent belongs to another user, clearing"
                );
                self.clear()?;
                Ok(ConsentStatus::Unknown)
            }
            None => Ok(ConsentStatus::Unknown),
        }
    }

    /// Returns the raw stored record, if complete, without applying the
    /// identity check.
    pub fn record(&self) -> Result<Option<ConsentRecord>, StoreError> {
        let status = self.storage.get(CONSENT_STATUS_KEY)?;
        let timestamp = self.storage.get(CONSENT_TIMESTAMP_KEY)?;
        let (Some(status), Some(timestamp)) = (status, timestamp) else {
            return Ok(None);
        };
        Ok(Some(ConsentRecord {
            granted: status == "true",
            timestamp,
            email: self.storage.get(CONSENT_EMAIL_KEY)?,
        }))
    }

    /// Records the visitor's answer.
    ///
    /// Acceptance stores the flag, the current time and the identified
    /// email (or drops a previously stored one). Refusal clears everything.
    pub fn set(&self, granted: bool, email: Option<&str>) -> Result<(), StoreError> {
        if !granted {
            return self.clear();
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.storage.set(CONSENT_STATUS_KEY, "true")?;
        self.storage.set(CONSENT_TIMESTAMP_KEY, &now)?;
        match email {
            Some(email) => self.storage.set(CONSENT_EMAIL_KEY, email)?,
            None => self.storage.remove(CONSENT_EMAIL_KEY)?,
        }
        tracing::debug!(bound = email.is_some(), "consent granted");
        Ok(())
    }

    /// Turns data sharing off while keeping when the answer was last given.
    pub fn revoke(&self) -> Result<(), StoreError> {
        self.storage.set(CONSENT_STATUS_KEY, "false")
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.storage.remove(CONSENT_STATUS_KEY)?;
        self.storage.remove(CONSENT_TIMESTAMP_KEY)?;
        self.storage.remove(CONSENT_EMAIL_KEY)
    }

    /// Direct access to the underlying storage.
    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }
}

fn parse_status(value: &str) -> ConsentStatus {
    ConsentStatus::from(value == "true")
}
