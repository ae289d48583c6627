use axum::{extract::State, http::StatusCode, response::IntoResponse, Form, Json};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::error::PosterError;
use crate::models::SessionKey;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleForm {
    #[validate(length(min = 1, max = 280, message = "caption must be 1-280 characters"))]
    pub caption: String,
    #[serde(rename = "scheduleTime")]
    #[validate(length(min = 1, message = "scheduleTime is required"))]
    pub schedule_time: String,
}

/// Accepts RFC 3339, or the zone-less `datetime-local` format read as UTC.
pub fn parse_schedule_time(raw: &str) -> Result<DateTime<Utc>, PosterError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| PosterError::InvalidInput(format!("Unrecognised scheduleTime: {}", raw)))
}

/// `POST /schedule`: queue a text post for later with the session's current token.
pub async fn schedule_post(
    State(state): State<AppState>,
    session: SessionKey,
    Form(form): Form<ScheduleForm>,
) -> Result<impl IntoResponse, AppError> {
    form.validate()?;
    let schedule_time = parse_schedule_time(&form.schedule_time)?;
    let token = state.auth_flow.access_token(&session).await?;

    let pending = state
        .scheduler
        .schedule(
            session,
            form.caption.trim().to_string(),
            schedule_time,
            token.access_token,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(pending)))
}

/// `GET /schedule`: this session's queued posts, soonest first.
pub async fn list_scheduled(
    State(state): State<AppState>,
    session: SessionKey,
) -> Result<impl IntoResponse, AppError> {
    let items = state.scheduler.queue().list_for(&session).await?;
    Ok(Json(items))
}
