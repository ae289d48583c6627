use axum::{extract::Query, response::Html, Json};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, Default, Deserialize)]
pub struct OutcomeQuery {
    pub auth: Option<String>,
    pub error: Option<String>,
}

/// Landing page after a successful redirect-style action.
pub async fn success(Query(query): Query<OutcomeQuery>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "authenticated": query.auth.is_some(),
    }))
}

pub async fn failure(Query(query): Query<OutcomeQuery>) -> Json<Value> {
    Json(json!({
        "status": "error",
        "error": query.error.unwrap_or_else(|| "unknown".to_string()),
    }))
}
