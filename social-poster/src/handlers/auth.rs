use axum::{
    extract::{Query, State},
    response::Redirect,
};
use service_core::error::AppError;
use tower_sessions::Session;

use crate::models::SessionKey;
use crate::services::CallbackParams;
use crate::AppState;

/// Redirect the browser to the provider's consent screen.
pub async fn auth_start(
    State(state): State<AppState>,
    session: SessionKey,
) -> Result<Redirect, AppError> {
    let url = state.auth_flow.start(&session).await?;
    Ok(Redirect::to(&url))
}

/// Provider redirect target. Never renders an error body; the outcome is
/// carried to `/success` or `/failure`.
pub async fn auth_callback(
    State(state): State<AppState>,
    session: SessionKey,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    match state.auth_flow.complete(&session, &params).await {
        Ok(_) => Redirect::to("/success?auth=1"),
        Err(e) => {
            tracing::error!(session = %session, error = %e, "OAuth callback failed");
            Redirect::to(&format!("/failure?error={}", e.kind()))
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    key: SessionKey,
    session: Session,
) -> Result<Redirect, AppError> {
    state.auth_flow.logout(&key).await?;
    session
        .flush()
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to flush session: {}", e)))?;
    Ok(Redirect::to("/"))
}
