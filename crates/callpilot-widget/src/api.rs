//! HTTP client for the call server.
//!
//! Every endpoint gets exactly one attempt. Transport errors, timeouts and
//! non-2xx statuses surface as [`WidgetError::Network`]; a registration
//! response without usable credentials is a [`WidgetError::Credential`].

use crate::config::ApiConfig;
use crate::error::WidgetError;
use callpilot_types::{CallCredentials, TranscriptEntry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of call credentials for the controller.
pub trait CredentialFetcher: Send + Sync + 'static {
    fn register_call(
        &self,
        agent_id: &str,
    ) -> impl Future<Output = Result<CallCredentials, WidgetError>> + Send;
}

/// Source of text answers for the guide conversation.
pub trait GuideFetcher: Send + Sync {
    fn get_guide(
        &self,
        agent_id: &str,
        conversation: &[TranscriptEntry],
    ) -> impl Future<Output = Result<TranscriptEntry, WidgetError>> + Send;
}

#[derive(Serialize)]
struct RegisterCallRequest<'a> {
    agent_id: &'a str,
}

#[derive(Deserialize)]
struct RegisterCallResponse {
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Serialize)]
struct GetGuideRequest<'a> {
    agent_id: &'a str,
    conversation: &'a [TranscriptEntry],
}

#[derive(Deserialize)]
struct GetGuideResponse {
    content: String,
}

#[derive(Serialize)]
struct WhitelistRequest<'a> {
    origin: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct WhitelistResponse {
    #[serde(default)]
    whitelisted: bool,
}

/// Client for the call server's `/api` endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, WidgetError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/api/{}", self.base_url, name)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<reqwest::Response, WidgetError> {
        let url = self.endpoint(name);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WidgetError::Network(format!(
                "{name} returned HTTP {status}"
            )));
        }
        Ok(response)
    }

    /// `POST /api/register-call`.
    pub async fn register_call(&self, agent_id: &str) -> Result<CallCredentials, WidgetError> {
        let response = self
            .post("register-call", &RegisterCallRequest { agent_id })
            .await?;
        let body = response.bytes().await?;

        let parsed: RegisterCallResponse = serde_json::from_slice(&body)
            .map_err(|e| WidgetError::Credential(format!("response is not valid JSON: {e}")))?;

        let call_id = non_empty(parsed.call_id)
            .ok_or_else(|| WidgetError::Credential("response has no call_id".to_string()))?;
        let access_token = non_empty(parsed.access_token)
            .ok_or_else(|| WidgetError::Credential("response has no access_token".to_string()))?;

        debug!(%call_id, "call registered");
        Ok(CallCredentials {
            call_id,
            access_token,
        })
    }

    /// `POST /api/get-guide`. The reply is always attributed to the
    /// assistant, whatever role the server reports.
    pub async fn get_guide(
        &self,
        agent_id: &str,
        conversation: &[TranscriptEntry],
    ) -> Result<TranscriptEntry, WidgetError> {
        let response = self
            .post(
                "get-guide",
                &GetGuideRequest {
                    agent_id,
                    conversation,
                },
            )
            .await?;
        let reply: GetGuideResponse = response
            .json()
            .await
            .map_err(|e| WidgetError::Network(format!("invalid get-guide response: {e}")))?;
        Ok(TranscriptEntry::assistant(reply.content))
    }

    /// `POST /api/is_whitelisted`. A non-2xx answer counts as "no".
    pub async fn is_whitelisted(&self, origin: &str, email: &str) -> Result<bool, WidgetError> {
        let url = self.endpoint("is_whitelisted");
        let response = self
            .http
            .post(&url)
            .json(&WhitelistRequest { origin, email })
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "whitelist check failed");
            return Ok(false);
        }

        let body: WhitelistResponse = response.json().await?;
        Ok(body.whitelisted)
    }

    /// Fetches the host site's account page with the visitor's session
    /// token and pulls the signed-in email out of it.
    pub async fn fetch_account_email(
        &self,
        account_url: &str,
        token: &str,
    ) -> Result<Option<String>, WidgetError> {
        let response = self
            .http
            .get(account_url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::COOKIE, format!("token_jwt={token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WidgetError::Network(format!(
                "account page returned HTTP {status}"
            )));
        }

        let document = response.text().await?;
        Ok(extract_email(&document))
    }
}

impl CredentialFetcher for ApiClient {
    fn register_call(
        &self,
        agent_id: &str,
    ) -> impl Future<Output = Result<CallCredentials, WidgetError>> + Send {
        ApiClient::register_call(self, agent_id)
    }
}

impl GuideFetcher for ApiClient {
    fn get_guide(
        &self,
        agent_id: &str,
        conversation: &[TranscriptEntry],
    ) -> impl Future<Output = Result<TranscriptEntry, WidgetError>> + Send {
        ApiClient::get_guide(self, agent_id, conversation)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""email"\s*:\s*"([^"]+)""#).expect("valid email regex"));

/// Finds the first `"email": "..."` pair in an account document.
pub fn extract_email(document: &str) -> Option<String> {
    EMAIL_RE
        .captures(document)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}
