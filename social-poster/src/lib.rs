pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use crate::config::Settings;
use crate::services::{
    AuthFlow, MemoryPostQueue, MemorySessionStore, PostQueue, Poster, ProviderClient, Scheduler,
    SessionStore,
};
use std::sync::Arc;
use crate::utils::{Clock, SystemClock};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub provider: Arc<ProviderClient>,
    pub auth_flow: Arc<AuthFlow>,
    pub poster: Arc<Poster>,
    pub scheduler: Arc<Scheduler>,
    pub upload_max_bytes: usize,
}

impl AppState {
    /// Wire the default in-memory stores and the system clock.
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Self::with_parts(
            settings,
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryPostQueue::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        settings: &Settings,
        sessions: Arc<dyn SessionStore>,
        queue: Arc<dyn PostQueue>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let provider = Arc::new(
            ProviderClient::new(settings.provider.clone())
                .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?,
        );

        let auth_flow = Arc::new(AuthFlow::new(
            provider.clone(),
            sessions.clone(),
            clock.clone(),
            chrono::Duration::seconds(settings.oauth.pending_ttl_secs),
        ));
        let poster = Arc::new(Poster::new(provider.clone(), auth_flow.clone()));
        let scheduler = Arc::new(Scheduler::new(
            queue,
            poster.clone(),
            clock,
            settings.scheduler.poll_interval(),
            settings.scheduler.max_attempts,
        ));

        Ok(Self {
            sessions,
            provider,
            auth_flow,
            poster,
            scheduler,
            upload_max_bytes: settings.uploads.max_bytes,
        })
    }
}
