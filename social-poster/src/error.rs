use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PosterError {
    #[error("Authorization code missing from callback")]
    MissingAuthorizationCode,

    #[error("No pending code verifier for this session")]
    MissingCodeVerifier,

    #[error("State parameter does not match the pending authorization")]
    StateMismatch,

    #[error("Authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("Token exchange failed: {body}")]
    TokenExchangeFailed { status: Option<u16>, body: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Media upload failed: {body}")]
    MediaUploadFailed { status: Option<u16>, body: String },

    #[error("Post creation failed: {body}")]
    PostCreationFailed { status: Option<u16>, body: String },

    #[error("Provider request failed: {body}")]
    UpstreamFailed { status: Option<u16>, body: String },

    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<u64> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PosterError {
    /// Short machine-readable name, used in failure redirects and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            PosterError::MissingAuthorizationCode => "missing_authorization_code",
            PosterError::MissingCodeVerifier => "missing_code_verifier",
            PosterError::StateMismatch => "state_mismatch",
            PosterError::AuthorizationDenied(_) => "authorization_denied",
            PosterError::TokenExchangeFailed { .. } => "token_exchange_failed",
            PosterError::NotAuthenticated => "not_authenticated",
            PosterError::MediaUploadFailed { .. } => "media_upload_failed",
            PosterError::PostCreationFailed { .. } => "post_creation_failed",
            PosterError::UpstreamFailed { .. } => "upstream_failed",
            PosterError::RateLimited { .. } => "rate_limited",
            PosterError::InvalidInput(_) => "invalid_input",
            PosterError::SessionStore(_) => "session_store",
            PosterError::Io(_) => "io",
        }
    }
}

impl From<validator::ValidationErrors> for PosterError {
    fn from(err: validator::ValidationErrors) -> Self {
        PosterError::InvalidInput(err.to_string())
    }
}

impl From<PosterError> for AppError {
    fn from(err: PosterError) -> Self {
        match err {
            PosterError::MissingAuthorizationCode
            | PosterError::MissingCodeVerifier
            | PosterError::StateMismatch
            | PosterError::InvalidInput(_) => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            PosterError::AuthorizationDenied(_) | PosterError::NotAuthenticated => {
                AppError::Unauthorized(anyhow::anyhow!(err.to_string()))
            }
            PosterError::TokenExchangeFailed { body, .. } => {
                AppError::BadGateway("Token exchange failed".to_string(), Some(body))
            }
            PosterError::MediaUploadFailed { body, .. } => {
                AppError::BadGateway("Media upload failed".to_string(), Some(body))
            }
            PosterError::PostCreationFailed { body, .. } => {
                AppError::BadGateway("Post creation failed".to_string(), Some(body))
            }
            PosterError::UpstreamFailed { body, .. } => {
                AppError::BadGateway("Provider request failed".to_string(), Some(body))
            }
            PosterError::RateLimited { retry_after } => AppError::TooManyRequests(
                "Rate limited by provider, try again later".to_string(),
                retry_after,
            ),
            PosterError::SessionStore(e) => AppError::InternalError(anyhow::anyhow!(e)),
            PosterError::Io(e) => AppError::from(e),
        }
    }
}
