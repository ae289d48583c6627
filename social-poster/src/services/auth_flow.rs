//! OAuth 2.0 authorization-code flow with PKCE, bound to the server-side session.

use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::PosterError;
use crate::models::{PendingAuthorization, SessionKey, TokenRecord};
use crate::services::metrics;
use crate::services::provider_client::ProviderClient;
use crate::services::session_store::SessionStore;
use crate::utils::{generate_state, Clock, CodeVerifier};

/// Query string the provider appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub struct AuthFlow {
    provider: Arc<ProviderClient>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    pending_ttl: Duration,
}

impl AuthFlow {
    pub fn new(
        provider: Arc<ProviderClient>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            sessions,
            clock,
            pending_ttl,
        }
    }

    /// Begin authorization: persist a fresh verifier and state for `session`
    /// and return the provider URL to redirect the browser to.
    #[tracing::instrument(skip_all, fields(session = %session))]
    pub async fn start(&self, session: &SessionKey) -> Result<String, PosterError> {
        let code_verifier = CodeVerifier::generate();
        let state = generate_state();
        let url = self
            .provider
            .authorization_url(&state, &code_verifier.challenge());

        self.sessions
            .stash_pending(
                session,
                PendingAuthorization {
                    code_verifier,
                    state,
                    created_at: self.clock.now(),
                },
            )
            .await?;

        tracing::info!("Authorization started");
        Ok(url)
    }

    /// Handle the provider redirect.
    pub async fn complete(
        &self,
        session: &SessionKey,
        params: &CallbackParams,
    ) -> Result<TokenRecord, PosterError> {
        if let Some(error) = &params.error {
            // The attempt is over either way; a retry must start from /auth/start.
            self.sessions.take_pending(session).await?;
            let description = params.error_description.as_deref().unwrap_or("");
            tracing::warn!(session = %session, error = %error, description, "Provider denied authorization");
            return Err(PosterError::AuthorizationDenied(
                if description.is_empty() {
                    error.clone()
                } else {
                    format!("{}: {}", error, description)
                },
            ));
        }

        self.exchange(session, params.code.as_deref(), params.state.as_deref())
            .await
    }

    /// Exchange `code` for an access token using the verifier stored for `session`.
    ///
    /// The verifier is consumed before the token endpoint is called, so a
    /// replayed callback fails with [`PosterError::MissingCodeVerifier`].
    #[tracing::instrument(skip_all, fields(session = %session))]
    pub async fn exchange(
        &self,
        session: &SessionKey,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<TokenRecord, PosterError> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or(PosterError::MissingAuthorizationCode)?;

        let pending = self
            .sessions
            .take_pending(session)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Callback without a pending code verifier");
                PosterError::MissingCodeVerifier
            })?;

        let now = self.clock.now();
        if pending.is_stale(now, self.pending_ttl) {
            tracing::warn!(created_at = %pending.created_at, "Pending code verifier expired");
            return Err(PosterError::MissingCodeVerifier);
        }

        if !pending.state.is_empty() && state != Some(pending.state.as_str()) {
            tracing::warn!("State mismatch on callback");
            return Err(PosterError::StateMismatch);
        }

        let result = self
            .provider
            .exchange_code(code, &pending.code_verifier)
            .await
            .and_then(|response| response.into_record(self.clock.now()));
        metrics::record_token_exchange(if result.is_ok() { "success" } else { "failure" });

        let token = result?;
        self.sessions.put(session, token.clone()).await?;

        tracing::info!(expires_at = ?token.expires_at, "Access token stored");
        Ok(token)
    }

    /// The session's usable token, refreshing it when it has expired.
    ///
    /// Without a token, or with an expired token and no refresh token, the
    /// session is cleared and [`PosterError::NotAuthenticated`] is returned.
    pub async fn access_token(&self, session: &SessionKey) -> Result<TokenRecord, PosterError> {
        let token = self
            .sessions
            .get(session)
            .await?
            .filter(|t| !t.access_token.is_empty())
            .ok_or(PosterError::NotAuthenticated)?;

        if !token.is_expired(self.clock.now()) {
            return Ok(token);
        }

        let Some(refresh_token) = token.refresh_token.as_deref() else {
            tracing::info!(session = %session, "Access token expired without refresh token");
            self.sessions.clear(session).await?;
            return Err(PosterError::NotAuthenticated);
        };

        let refreshed = self
            .provider
            .refresh(refresh_token)
            .await
            .and_then(|response| response.into_record(self.clock.now()));

        match refreshed {
            Ok(mut renewed) => {
                if renewed.refresh_token.is_none() {
                    renewed.refresh_token = token.refresh_token.clone();
                }
                self.sessions.put(session, renewed.clone()).await?;
                metrics::record_token_exchange("refreshed");
                tracing::info!(session = %session, "Access token refreshed");
                Ok(renewed)
            }
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Token refresh failed");
                metrics::record_token_exchange("refresh_failed");
                self.sessions.clear(session).await?;
                Err(PosterError::NotAuthenticated)
            }
        }
    }

    pub async fn logout(&self, session: &SessionKey) -> Result<(), PosterError> {
        self.sessions.clear(session).await?;
        tracing::info!(session = %session, "Session cleared");
        Ok(())
    }
}
