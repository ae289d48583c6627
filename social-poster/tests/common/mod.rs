#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use secrecy::Secret;
use social_poster::config::{
    OAuthSettings, ProviderSettings, SchedulerSettings, ServerSettings, Settings,
    TelemetrySettings, UploadSettings,
};
use social_poster::services::{MemoryPostQueue, MemorySessionStore};
use social_poster::utils::Clock;
use social_poster::AppState;
use std::sync::{Arc, Mutex};

pub const CLIENT_ID: &str = "client-abc";
pub const CLIENT_SECRET: &str = "s3cret";

/// A clock the test moves by hand.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Settings whose provider endpoints all live on `base_url` (a wiremock server).
pub fn settings_for(base_url: &str) -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            session_secret: Secret::new("k".repeat(64)),
            secure_cookies: false,
            session_idle_hours: 24,
        },
        provider: ProviderSettings {
            client_id: CLIENT_ID.to_string(),
            client_secret: Some(Secret::new(CLIENT_SECRET.to_string())),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
            authorize_url: format!("{}/i/oauth2/authorize", base_url),
            token_url: format!("{}/2/oauth2/token", base_url),
            api_base_url: base_url.to_string(),
            media_upload_path: "/2/media/upload".to_string(),
            post_path: "/2/tweets".to_string(),
            me_path: "/2/users/me".to_string(),
            scopes: vec!["tweet.write".to_string(), "offline.access".to_string()],
            request_timeout_secs: 5,
        },
        oauth: OAuthSettings::default(),
        uploads: UploadSettings::default(),
        scheduler: SchedulerSettings::default(),
        telemetry: TelemetrySettings::default(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub sessions: Arc<MemorySessionStore>,
    pub queue: Arc<MemoryPostQueue>,
    pub clock: Arc<FixedClock>,
    pub settings: Settings,
}

pub fn test_app(base_url: &str) -> TestApp {
    let settings = settings_for(base_url);
    let sessions = Arc::new(MemorySessionStore::new());
    let queue = Arc::new(MemoryPostQueue::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));

    let state = AppState::with_parts(&settings, sessions.clone(), queue.clone(), clock.clone())
        .expect("state builds");

    TestApp {
        state,
        sessions,
        queue,
        clock,
        settings,
    }
}
