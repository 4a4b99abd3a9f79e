//! Optional gate deciding whether the widget is shown to a visitor.
//!
//! When not open to everyone, the visitor must be signed in to the host
//! site and their email must be whitelisted by the call server. Any failure
//! along the way denies access.

use crate::api::ApiClient;
use crate::config::AccessConfig;
use tracing::{error, info};

/// Outcome of the access check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessDecision {
    pub allowed: bool,
    /// The identified visitor, when the host site revealed one.
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    api: ApiClient,
    config: AccessConfig,
}

impl AccessGate {
    pub fn new(api: ApiClient, config: AccessConfig) -> Self {
        Self { api, config }
    }

    /// Resolves the signed-in visitor's email from the host site, if an
    /// account page and session token are configured.
    pub async fn identify(&self) -> Option<String> {
        let (Some(url), Some(token)) = (&self.config.account_url, &self.config.token) else {
            return None;
        };
        match self.api.fetch_account_email(url, token).await {
            Ok(email) => email,
            Err(e) => {
                error!(error = %e, "error fetching account document");
                None
            }
        }
    }

    pub async fn check(&self) -> AccessDecision {
        let email = self.identify().await;

        if self.config.allow_all {
            return AccessDecision {
                allowed: true,
                email,
            };
        }

        let Some(address) = email.as_deref() else {
            info!("no signed-in visitor, widget disabled");
            return AccessDecision::default();
        };

        let allowed = match self.api.is_whitelisted(&self.config.origin, address).await {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(error = %e, "error checking whitelist status");
                false
            }
        };
        info!(allowed, "access check complete");
        AccessDecision { allowed, email }
    }
}
