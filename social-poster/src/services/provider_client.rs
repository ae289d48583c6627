//! HTTP client for the OAuth2 authorization server and the platform API.
//!
//! Every call is made once with the configured timeout. Non-2xx responses are
//! turned into the matching [`PosterError`] with the upstream body preserved.

use chrono::{DateTime, Duration, Utc};
use reqwest::{multipart, Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use service_core::observability::TracedClientExt;

use crate::config::ProviderSettings;
use crate::error::PosterError;
use crate::models::{StagedImage, TokenRecord};
use crate::utils::{AuthorizationRequest, CodeVerifier};

/// Successful response from the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Fails with [`PosterError::TokenExchangeFailed`] when `expires_in` is
    /// negative or too large to place on the calendar.
    pub fn into_record(self, now: DateTime<Utc>) -> Result<TokenRecord, PosterError> {
        let expires_at = self
            .expires_in
            .map(|secs| {
                Duration::try_seconds(secs)
                    .filter(|_| secs >= 0)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        tracing::error!(expires_in = secs, "Token response expiry out of range");
                        PosterError::TokenExchangeFailed {
                            status: None,
                            body: format!("expires_in out of range: {}", secs),
                        }
                    })
            })
            .transpose()?;

        Ok(TokenRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scope: self.scope,
        })
    }
}

pub struct ProviderClient {
    client: Client,
    settings: ProviderSettings,
}

impl ProviderClient {
    pub fn new(settings: ProviderSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self { client, settings })
    }

    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        AuthorizationRequest {
            authorize_url: &self.settings.authorize_url,
            client_id: &self.settings.client_id,
            redirect_uri: &self.settings.redirect_uri,
            scopes: &self.settings.scopes,
            state,
            code_challenge,
        }
        .to_url()
    }

    /// Trade an authorization code for tokens (`grant_type=authorization_code`).
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &CodeVerifier,
    ) -> Result<TokenResponse, PosterError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.settings.redirect_uri),
            ("code_verifier", verifier.as_str()),
            ("client_id", &self.settings.client_id),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, PosterError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.settings.client_id),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, PosterError> {
        let mut request = self.client.traced_post(&self.settings.token_url).form(params);
        if let Some(secret) = &self.settings.client_secret {
            request = request.basic_auth(&self.settings.client_id, Some(secret.expose_secret()));
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send token request to {}: {}", self.settings.token_url, e);
            PosterError::TokenExchangeFailed {
                status: None,
                body: e.to_string(),
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PosterError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Token endpoint returned an error");
            return Err(PosterError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
            tracing::error!(error = %e, body = %body, "Malformed token response");
            PosterError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                body,
            }
        })
    }

    /// Upload image bytes and return the platform's media id.
    pub async fn upload_media(
        &self,
        access_token: &str,
        image: &StagedImage,
    ) -> Result<String, PosterError> {
        let upload_failed = |status: Option<StatusCode>, body: String| PosterError::MediaUploadFailed {
            status: status.map(|s| s.as_u16()),
            body,
        };

        let bytes = image.read().await?;
        let size = bytes.len();
        let part = multipart::Part::bytes(bytes)
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)
            .map_err(|e| upload_failed(None, format!("Invalid content type: {}", e)))?;
        let form = multipart::Form::new()
            .text("media_category", "tweet_image")
            .part("media", part);

        let url = self.settings.api_url(&self.settings.media_upload_path);
        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send media upload to {}: {}", url, e);
                upload_failed(None, e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| upload_failed(Some(status), e.to_string()))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Media upload rejected");
            return Err(upload_failed(Some(status), body));
        }

        let media_id = serde_json::from_str::<Value>(&body)
            .ok()
            .as_ref()
            .and_then(extract_media_id)
            .ok_or_else(|| {
                tracing::error!(body = %body, "Media upload response has no media id");
                upload_failed(Some(status), body.clone())
            })?;

        tracing::info!(media_id = %media_id, size, "Media uploaded");
        Ok(media_id)
    }

    /// Create a post. The response JSON is returned untouched.
    pub async fn create_post(
        &self,
        access_token: &str,
        text: &str,
        media_id: Option<&str>,
    ) -> Result<Value, PosterError> {
        let mut payload = json!({ "text": text });
        if let Some(id) = media_id {
            payload["media"] = json!({ "media_ids": [id] });
        }

        let url = self.settings.api_url(&self.settings.post_path);
        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send post creation to {}: {}", url, e);
                PosterError::PostCreationFailed {
                    status: None,
                    body: e.to_string(),
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PosterError::PostCreationFailed {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Post creation rejected");
            return Err(PosterError::PostCreationFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, body = %body, "Post creation returned non-JSON body");
            PosterError::PostCreationFailed {
                status: Some(status.as_u16()),
                body,
            }
        })
    }

    /// Fetch the authenticated account. 429 becomes [`PosterError::RateLimited`].
    pub async fn get_me(&self, access_token: &str) -> Result<Value, PosterError> {
        let url = self.settings.api_url(&self.settings.me_path);
        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PosterError::UpstreamFailed {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_secs(response.headers());
            tracing::warn!(?retry_after, "Provider rate limit hit on profile read");
            return Err(PosterError::RateLimited { retry_after });
        }

        let body = response.text().await.map_err(|e| PosterError::UpstreamFailed {
            status: Some(status.as_u16()),
            body: e.to_string(),
        })?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(PosterError::NotAuthenticated);
        }
        if !status.is_success() {
            return Err(PosterError::UpstreamFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| PosterError::UpstreamFailed {
            status: Some(status.as_u16()),
            body,
        })
    }
}

/// Accepts v1.1 (`media_id_string` / `media_id`) and v2 (`data.id`) shapes.
fn extract_media_id(body: &Value) -> Option<String> {
    let candidate = body
        .get("media_id_string")
        .or_else(|| body.pointer("/data/id"))
        .or_else(|| body.get("media_id"))
        .or_else(|| body.get("id"))?;

    match candidate {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `Retry-After` in seconds, falling back to the `x-rate-limit-reset` epoch.
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    header("retry-after").or_else(|| {
        header("x-rate-limit-reset").map(|reset| {
            let now = Utc::now().timestamp().max(0) as u64;
            reset.saturating_sub(now)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_id_shapes() {
        assert_eq!(
            extract_media_id(&json!({"media_id": 710511363345354753_u64, "media_id_string": "710511363345354753"})),
            Some("710511363345354753".to_string())
        );
        assert_eq!(
            extract_media_id(&json!({"data": {"id": "1880028106020515840"}})),
            Some("1880028106020515840".to_string())
        );
        assert_eq!(
            extract_media_id(&json!({"media_id": 42})),
            Some("42".to_string())
        );
        assert_eq!(extract_media_id(&json!({"media_id": ""})), None);
        assert_eq!(extract_media_id(&json!({"errors": []})), None);
    }

    #[test]
    fn token_response_computes_expiry() {
        let now = Utc::now();
        let record = TokenResponse {
            access_token: "tok1".to_string(),
            token_type: Some("bearer".to_string()),
            expires_in: Some(7200),
            refresh_token: Some("r1".to_string()),
            scope: None,
        }
        .into_record(now)
        .unwrap();

        assert_eq!(record.access_token, "tok1");
        assert_eq!(record.expires_at, Some(now + Duration::seconds(7200)));
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn unrepresentable_expiry_is_rejected() {
        let response = |expires_in| TokenResponse {
            access_token: "tok1".to_string(),
            token_type: None,
            expires_in: Some(expires_in),
            refresh_token: None,
            scope: None,
        };

        for expires_in in [9_000_000_000_000_000, i64::MAX, -1] {
            let err = response(expires_in).into_record(Utc::now()).unwrap_err();
            assert!(matches!(err, PosterError::TokenExchangeFailed { status: None, .. }));
        }
    }

    #[test]
    fn retry_after_prefers_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("retry-after", "30".parse().unwrap());
        assert_eq!(retry_after_secs(&headers), Some(30));

        let mut headers = reqwest::header::HeaderMap::new();
        let reset = Utc::now().timestamp() as u64 + 120;
        headers.insert("x-rate-limit-reset", reset.to_string().parse().unwrap());
        let secs = retry_after_secs(&headers).unwrap();
        assert!((118..=120).contains(&secs));

        assert_eq!(retry_after_secs(&reqwest::header::HeaderMap::new()), None);
    }
}
