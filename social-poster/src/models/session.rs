use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tower_sessions::Session;
use uuid::Uuid;

use crate::utils::CodeVerifier;

/// Cookie-session field holding the key of this browser's [`SessionRecord`].
pub const SESSION_KEY_FIELD: &str = "sid";

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Opaque identifier of a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the session key from the signed session cookie, minting one on
/// the first request of a browser.
#[async_trait]
impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to extract session",
                )
                    .into_response()
            })?;

        let existing: Option<SessionKey> = session.get(SESSION_KEY_FIELD).await.map_err(|e| {
            tracing::error!("Failed to read session key: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Session unavailable").into_response()
        })?;

        if let Some(key) = existing {
            return Ok(key);
        }

        let key = SessionKey::generate();
        session.insert(SESSION_KEY_FIELD, &key).await.map_err(|e| {
            tracing::error!("Failed to store session key: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Session unavailable").into_response()
        })?;
        tracing::debug!(session = %key, "New session created");

        Ok(key)
    }
}

/// Verifier and state waiting for the provider to redirect back.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub code_verifier: CodeVerifier,
    pub state: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Credentials obtained from a successful token exchange.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

impl TokenRecord {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| at <= now + Duration::seconds(EXPIRY_SKEW_SECS))
            .unwrap_or(false)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Everything the server keeps for one session key.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub pending: Option<PendingAuthorization>,
    pub token: Option<TokenRecord>,
    pub touched_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            pending: None,
            token: None,
            touched_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_never_expires() {
        let token = TokenRecord::bearer("tok1");
        assert!(!token.is_expired(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn token_expiry_includes_skew() {
        let now = Utc::now();
        let mut token = TokenRecord::bearer("tok1");

        token.expires_at = Some(now + Duration::seconds(30));
        assert!(token.is_expired(now));

        token.expires_at = Some(now + Duration::hours(2));
        assert!(!token.is_expired(now));
    }

    #[test]
    fn pending_goes_stale_after_ttl() {
        let now = Utc::now();
        let pending = PendingAuthorization {
            code_verifier: CodeVerifier::generate(),
            state: "s".to_string(),
            created_at: now - Duration::minutes(11),
        };
        assert!(pending.is_stale(now, Duration::minutes(10)));
        assert!(!pending.is_stale(now, Duration::minutes(15)));
    }

    #[test]
    fn debug_redacts_tokens() {
        let mut token = TokenRecord::bearer("secret-access");
        token.refresh_token = Some("secret-refresh".to_string());
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
