//! Deferred posting: a queue of pending posts and a periodic sweep over it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PosterError;
use crate::models::{NewScheduledPost, PendingPost, PostStatus, SessionKey};
use crate::services::metrics;
use crate::services::poster::Poster;
use crate::utils::Clock;

/// Storage for scheduled posts.
///
/// `dequeue_due` claims items (status `posting`) inside one critical section,
/// so two sweeps never publish the same item.
#[async_trait]
pub trait PostQueue: Send + Sync {
    async fn enqueue(
        &self,
        post: NewScheduledPost,
        now: DateTime<Utc>,
    ) -> Result<PendingPost, PosterError>;

    /// Claim every `scheduled` item whose time is `<= now`.
    async fn dequeue_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingPost>, PosterError>;

    async fn mark_posted(&self, id: Uuid, post_id: Option<String>) -> Result<(), PosterError>;

    /// Record a failed attempt. The item returns to `scheduled` until
    /// `max_attempts` is reached, then becomes `failed`. Returns the new status.
    async fn mark_failed(
        &self,
        id: Uuid,
        error: String,
        max_attempts: u32,
    ) -> Result<PostStatus, PosterError>;

    async fn list_for(&self, owner: &SessionKey) -> Result<Vec<PendingPost>, PosterError>;
}

/// In-process queue. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryPostQueue {
    items: Mutex<Vec<PendingPost>>,
}

impl MemoryPostQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<PendingPost> {
        self.items.lock().await.iter().find(|p| p.id == id).cloned()
    }
}

#[async_trait]
impl PostQueue for MemoryPostQueue {
    async fn enqueue(
        &self,
        post: NewScheduledPost,
        now: DateTime<Utc>,
    ) -> Result<PendingPost, PosterError> {
        let pending = PendingPost::new(post, now);
        self.items.lock().await.push(pending.clone());
        Ok(pending)
    }

    async fn dequeue_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingPost>, PosterError> {
        let mut items = self.items.lock().await;
        let mut due = Vec::new();
        for item in items.iter_mut().filter(|p| p.is_due(now)) {
            item.status = PostStatus::Posting;
            item.attempts += 1;
            due.push(item.clone());
        }
        Ok(due)
    }

    async fn mark_posted(&self, id: Uuid, post_id: Option<String>) -> Result<(), PosterError> {
        let mut items = self.items.lock().await;
        if let Some(item) = items.iter_mut().find(|p| p.id == id) {
            item.status = PostStatus::Posted;
            item.post_id = post_id;
            item.last_error = None;
            // The token is no longer needed once the item is terminal.
            item.access_token.clear();
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: String,
        max_attempts: u32,
    ) -> Result<PostStatus, PosterError> {
        let mut items = self.items.lock().await;
        let item = items
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| PosterError::InvalidInput(format!("unknown scheduled post {}", id)))?;

        item.last_error = Some(error);
        item.status = if item.attempts >= max_attempts {
            item.access_token.clear();
            PostStatus::Failed
        } else {
            PostStatus::Scheduled
        };
        Ok(item.status)
    }

    async fn list_for(&self, owner: &SessionKey) -> Result<Vec<PendingPost>, PosterError> {
        let items = self.items.lock().await;
        let mut owned: Vec<_> = items.iter().filter(|p| &p.owner == owner).cloned().collect();
        owned.sort_by_key(|p| p.schedule_time);
        Ok(owned)
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub posted: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Items published or attempted whose outcome the queue failed to record.
    pub unrecorded: usize,
}

pub struct Scheduler {
    queue: Arc<dyn PostQueue>,
    poster: Arc<Poster>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl Scheduler {
    pub fn new(
        queue: Arc<dyn PostQueue>,
        poster: Arc<Poster>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            poster,
            clock,
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<dyn PostQueue> {
        &self.queue
    }

    /// Queue a post for `schedule_time` using the token the session holds now.
    pub async fn schedule(
        &self,
        owner: SessionKey,
        caption: String,
        schedule_time: DateTime<Utc>,
        access_token: String,
    ) -> Result<PendingPost, PosterError> {
        let pending = self
            .queue
            .enqueue(
                NewScheduledPost {
                    owner,
                    caption,
                    schedule_time,
                    access_token,
                },
                self.clock.now(),
            )
            .await?;

        tracing::info!(
            post_id = %pending.id,
            schedule_time = %pending.schedule_time,
            "Post scheduled"
        );
        Ok(pending)
    }

    /// Publish every due item once.
    pub async fn sweep(&self) -> Result<SweepReport, PosterError> {
        let due = self.queue.dequeue_due(self.clock.now()).await?;
        let mut report = SweepReport::default();

        for item in due {
            match self.poster.publish(&item.access_token, &item.caption, None).await {
                Ok(result) => {
                    metrics::record_post("scheduler", "success");
                    if let Err(e) = self.queue.mark_posted(item.id, result.post_id()).await {
                        tracing::error!(post_id = %item.id, error = %e, "Failed to record published post");
                        report.unrecorded += 1;
                        continue;
                    }
                    tracing::info!(post_id = %item.id, attempt = item.attempts, "Scheduled post published");
                    report.posted += 1;
                }
                Err(e) => {
                    metrics::record_post("scheduler", e.kind());
                    let status = match self
                        .queue
                        .mark_failed(item.id, e.to_string(), self.max_attempts)
                        .await
                    {
                        Ok(status) => status,
                        Err(record_err) => {
                            tracing::error!(
                                post_id = %item.id,
                                error = %e,
                                record_error = %record_err,
                                "Failed to record failed attempt"
                            );
                            report.unrecorded += 1;
                            continue;
                        }
                    };
                    tracing::warn!(
                        post_id = %item.id,
                        attempt = item.attempts,
                        status = ?status,
                        error = %e,
                        "Scheduled post failed"
                    );
                    match status {
                        PostStatus::Failed => report.failed += 1,
                        _ => report.retrying += 1,
                    }
                }
            }
        }

        Ok(report)
    }

    /// Sweep every `poll_interval` until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            max_attempts = self.max_attempts,
            "Starting post scheduler"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Post scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(report) if report != SweepReport::default() => {
                            tracing::info!(?report, "Sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Sweep failed"),
                    }
                }
            }
        }
    }
}
