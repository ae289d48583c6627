use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub uploads: UploadSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Signs the session cookie. Must be at least 64 bytes.
    pub session_secret: Secret<String>,
    /// Set the `Secure` attribute on the session cookie. Enable behind HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
    #[serde(default = "default_session_idle_hours")]
    pub session_idle_hours: i64,
}

fn default_session_idle_hours() -> i64 {
    24
}

/// The OAuth2 authorization server and the platform API it protects.
#[derive(Deserialize, Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    /// Confidential clients authenticate the token request with HTTP Basic.
    /// Leave unset for a public client.
    #[serde(default)]
    pub client_secret: Option<Secret<String>>,
    /// Must be byte-identical to the redirect URI registered with the provider.
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    #[serde(default = "default_media_upload_path")]
    pub media_upload_path: String,
    #[serde(default = "default_post_path")]
    pub post_path: String,
    #[serde(default = "default_me_path")]
    pub me_path: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ProviderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }
}

fn default_media_upload_path() -> String {
    "/2/media/upload".to_string()
}

fn default_post_path() -> String {
    "/2/tweets".to_string()
}

fn default_me_path() -> String {
    "/2/users/me".to_string()
}

fn default_scopes() -> Vec<String> {
    ["tweet.read", "tweet.write", "users.read", "media.write", "offline.access"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_request_timeout_secs() -> u64 {
    15
}

#[derive(Deserialize, Clone)]
pub struct OAuthSettings {
    /// How long a code verifier waits for its callback before it is treated as missing.
    pub pending_ttl_secs: i64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 600,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct UploadSettings {
    pub max_bytes: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    /// Attempts per scheduled post before it is marked failed.
    pub max_attempts: u32,
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 30,
            max_attempts: 3,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;

    // Check if we're already in social-poster directory or need to navigate to it
    let configuration_directory = if base_path.ends_with("social-poster") {
        base_path.join("config")
    } else {
        base_path.join("social-poster").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("provider.scopes")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
