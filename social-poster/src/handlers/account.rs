use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::error::PosterError;
use crate::models::SessionKey;
use crate::AppState;

/// The platform's view of the signed-in account.
///
/// A provider rate limit is reported as a warning with status 200 rather
/// than as an error, so pages polling this endpoint keep working.
pub async fn me(
    State(state): State<AppState>,
    session: SessionKey,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth_flow.access_token(&session).await?;

    match state.provider.get_me(&token.access_token).await {
        Ok(profile) => Ok(Json(profile)),
        Err(PosterError::RateLimited { retry_after }) => Ok(Json(json!({
            "warning": "Rate limited by provider, profile unavailable for now",
            "retry_after": retry_after,
        }))),
        Err(e) => {
            tracing::error!(session = %session, error = %e, "Profile lookup failed");
            Err(e.into())
        }
    }
}
