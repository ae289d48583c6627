use axum::{
    extract::{multipart::Multipart, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::error::PosterError;
use crate::models::{PostResult, SessionKey, StagedImage};
use crate::AppState;

#[derive(Debug, Validate)]
pub struct PostForm {
    #[validate(length(min = 1, max = 280, message = "caption must be 1-280 characters"))]
    pub caption: String,
}

/// `POST /post`: multipart `caption` plus an optional `image` file.
///
/// Clients that accept JSON get the created post (or an error document);
/// browsers submitting the form are redirected to `/success` or `/failure`.
pub async fn create_post(
    State(state): State<AppState>,
    session: SessionKey,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let result = submit(&state, &session, multipart).await;

    if let Err(e) = &result {
        tracing::error!(session = %session, error = %e, "Post failed");
    }

    if wants_json(&headers) {
        match result {
            Ok(post) => Json(post).into_response(),
            Err(e) => AppError::from(e).into_response(),
        }
    } else {
        match result {
            Ok(_) => Redirect::to("/success").into_response(),
            Err(e) => Redirect::to(&format!("/failure?error={}", e.kind())).into_response(),
        }
    }
}

async fn submit(
    state: &AppState,
    session: &SessionKey,
    multipart: Multipart,
) -> Result<PostResult, PosterError> {
    let (form, image) = read_form(multipart, state.upload_max_bytes).await?;
    form.validate()?;
    state.poster.post(session, &form.caption, image).await
}

async fn read_form(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<(PostForm, Option<StagedImage>), PosterError> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        PosterError::InvalidInput(format!("Malformed multipart body: {}", e))
    };

    let mut caption = String::new();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("caption") => {
                caption = field.text().await.map_err(malformed)?.trim().to_string();
            }
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(malformed)?;

                // Browsers send an empty part when no file was chosen.
                if bytes.is_empty() {
                    continue;
                }
                if !content_type.starts_with("image/") {
                    return Err(PosterError::InvalidInput(format!(
                        "Unsupported image type: {}",
                        content_type
                    )));
                }
                if bytes.len() > max_bytes {
                    return Err(PosterError::InvalidInput(format!(
                        "Image exceeds {} bytes",
                        max_bytes
                    )));
                }

                image = Some(StagedImage::stage(&bytes, file_name, content_type).await?);
            }
            _ => {}
        }
    }

    Ok((PostForm { caption }, image))
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}
