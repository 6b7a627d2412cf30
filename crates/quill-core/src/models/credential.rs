//! Stored API credential

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::unix_timestamp_now;

const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Access token for the remote note service, with an optional refresh token.
///
/// Mutated only through the authentication flow; `Debug` output redacts the
/// token material so it can never leak into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` means the token does not expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Credential {
    /// Whether the access token is expired (with a small clock-skew margin).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_tokens() {
        let credential = Credential {
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_at: Some(1_700_000_000),
        };
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn credential_without_expiry_never_expires() {
        let credential = Credential {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at: None,
        };
        assert!(!credential.is_expired());
    }

    #[test]
    fn credential_with_past_expiry_is_expired() {
        let credential = Credential {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at: Some(1),
        };
        assert!(credential.is_expired());
    }
}
