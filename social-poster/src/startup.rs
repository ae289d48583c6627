use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::middleware::{security_headers_middleware, tracing::request_id_middleware};
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{
    cookie::{Key, SameSite},
    Expiry, MemoryStore, SessionManagerLayer,
};

use crate::config::Settings;
use crate::handlers::{
    account::me,
    app::{failure, health_check, index, success},
    auth::{auth_callback, auth_start, logout},
    metrics::metrics,
    post::create_post,
    schedule::{list_scheduled, schedule_post},
};
use crate::middleware::metrics_middleware;
use crate::AppState;

/// Room for the caption and multipart framing on top of the image limit.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState, settings: &Settings) -> anyhow::Result<Router> {
    // The cookie only carries the signed session key; tokens stay server-side.
    let key = Key::try_from(settings.server.session_secret.expose_secret().as_bytes())
        .map_err(|e| anyhow::anyhow!("server.session_secret must be at least 64 bytes: {}", e))?;
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_name("social_poster.sid")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(settings.server.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            settings.server.session_idle_hours,
        )))
        .with_signed(key);

    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/success", get(success))
        .route("/failure", get(failure))
        .route("/auth/start", get(auth_start))
        .route("/auth/callback", get(auth_callback))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .route("/post", post(create_post))
        .route("/schedule", get(list_scheduled).post(schedule_post))
        .route_layer(from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(
            settings.uploads.max_bytes + FORM_OVERHEAD_BYTES,
        ))
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state);

    Ok(router)
}
