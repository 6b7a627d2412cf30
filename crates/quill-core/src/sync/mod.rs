//! Remote note service client.
//!
//! Two concerns live here: exchanging an out-of-band authorization code for a
//! [`Credential`], and fetching note deltas page by page. Wire payloads are
//! parsed leniently (alternate field names, optional expiry forms) and
//! converted into the crate's models, stripping the service's markup from
//! note bodies along the way.

mod engine;
mod retry;

pub use engine::{pull, DeltaPage, DeltaSource, SyncOutcome};
pub use retry::{with_retries, RetryPolicy};

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::models::{strip_markup, Credential, Note, NoteChange, Usn};
use crate::util::compact_text;

const DELTA_PAGE_LIMIT: usize = 100;

/// Exchanges authorization codes for credentials. Holds no session state.
#[derive(Clone)]
pub struct AuthClient {
    token_url: String,
    client: reqwest::Client,
    retry_policy: RetryPolicy,
}

impl AuthClient {
    pub fn new(config: &DataConfig) -> Result<Self> {
        Ok(Self {
            token_url: format!("{}/v1/auth/token", config.api_base_url),
            client: reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()?,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Override the retry policy for the code exchange.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Exchange an out-of-band authorization code for a credential.
    ///
    /// Invalid or expired codes fail with [`Error::AuthRejected`]. Transient
    /// network failures are retried; exhaustion surfaces as
    /// [`Error::SyncFailed`].
    pub async fn exchange_code(&self, auth_code: &str) -> Result<Credential> {
        let auth_code = auth_code.trim();
        if auth_code.is_empty() {
            return Err(Error::AuthRejected(
                "authorization code must not be empty".to_string(),
            ));
        }

        let payload = serde_json::json!({ "authorization_code": auth_code });
        with_retries(self.retry_policy, || self.request_token(&payload)).await
    }

    async fn request_token(&self, payload: &serde_json::Value) -> Result<Credential> {
        let response = self
            .client
            .post(&self.token_url)
            .json(payload)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            return if status.is_client_error() {
                Err(Error::AuthRejected(message))
            } else {
                Err(Error::NetworkTransient(message))
            };
        }

        let payload = response
            .json::<TokenResponse>()
            .await
            .map_err(map_transport_error)?;
        payload.try_into()
    }
}

/// Authenticated delta-fetch client; the HTTP-backed [`DeltaSource`].
pub struct HttpSyncClient {
    deltas_url: String,
    access_token: String,
    client: reqwest::Client,
}

impl HttpSyncClient {
    pub fn new(config: &DataConfig, credential: &Credential) -> Result<Self> {
        Ok(Self {
            deltas_url: format!("{}/v1/sync/deltas", config.api_base_url),
            access_token: credential.access_token.clone(),
            client: reqwest::Client::builder()
                .timeout(config.http_timeout)
                .build()?,
        })
    }
}

impl DeltaSource for HttpSyncClient {
    async fn fetch_page(&self, since: Usn) -> Result<DeltaPage> {
        let response = self
            .client
            .get(&self.deltas_url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("since", since.to_string()),
                ("limit", DELTA_PAGE_LIMIT.to_string()),
            ])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::AuthExpired);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status, &body);
            return if status.is_server_error() {
                Err(Error::NetworkTransient(message))
            } else {
                Err(Error::SyncFailed(message))
            };
        }

        let payload = response
            .json::<DeltaResponse>()
            .await
            .map_err(map_transport_error)?;
        payload.try_into()
    }
}

fn map_transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() || error.is_connect() {
        Error::NetworkTransient(error.to_string())
    } else {
        Error::Http(error)
    }
}

// ---------------------------------------------------------------------------
// Wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
}

impl TryFrom<TokenResponse> for Credential {
    type Error = Error;

    fn try_from(value: TokenResponse) -> Result<Self> {
        let access_token = value
            .access_token
            .or(value.token)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                Error::AuthRejected("response did not include an access token".to_string())
            })?;

        let expires_at = value.expires_at.or_else(|| {
            value
                .expires_in
                .map(|expires_in| crate::util::unix_timestamp_now().saturating_add(expires_in))
        });

        Ok(Self {
            access_token,
            refresh_token: value
                .refresh_token
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty()),
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DeltaResponse {
    changes: Vec<WireChange>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireChange {
    Upsert { note: WireNote },
    Delete { id: String, usn: Usn },
}

#[derive(Debug, Deserialize)]
struct WireNote {
    id: String,
    title: String,
    /// Body in the service's native markup
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    created_at: i64,
    updated_at: i64,
    usn: Usn,
}

impl TryFrom<DeltaResponse> for DeltaPage {
    type Error = Error;

    fn try_from(value: DeltaResponse) -> Result<Self> {
        let changes = value
            .changes
            .into_iter()
            .map(WireChange::into_change)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            changes,
            has_more: value.has_more,
        })
    }
}

impl WireChange {
    fn into_change(self) -> Result<NoteChange> {
        match self {
            Self::Upsert { note } => {
                let mut note = Note {
                    id: note.id.parse()?,
                    title: note.title.trim().to_string(),
                    body: strip_markup(&note.content),
                    tags: note.tags,
                    created_at: note.created_at,
                    updated_at: note.updated_at,
                    usn: note.usn,
                };
                note.normalize_tags();
                Ok(NoteChange::Upsert { note })
            }
            Self::Delete { id, usn } => Ok(NoteChange::Delete {
                id: id.parse()?,
                usn,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
