use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::SessionKey;

/// The platform's representation of a created post, passed through unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostResult(pub serde_json::Value);

impl PostResult {
    /// Best-effort id of the created post (`data.id` or `id`).
    pub fn post_id(&self) -> Option<String> {
        self.0
            .pointer("/data/id")
            .or_else(|| self.0.get("id"))
            .or_else(|| self.0.get("id_str"))
            .and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    /// Claimed by a sweep; the publish call is in flight.
    Posting,
    Posted,
    Failed,
}

/// Input for [`crate::services::scheduler::PostQueue::enqueue`].
#[derive(Debug, Clone)]
pub struct NewScheduledPost {
    pub owner: SessionKey,
    pub caption: String,
    pub schedule_time: DateTime<Utc>,
    /// Captured at scheduling time; not refreshed before posting.
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPost {
    pub id: Uuid,
    #[serde(skip)]
    pub owner: SessionKey,
    pub caption: String,
    pub schedule_time: DateTime<Utc>,
    pub status: PostStatus,
    #[serde(skip)]
    pub access_token: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub post_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingPost {
    pub fn new(post: NewScheduledPost, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: post.owner,
            caption: post.caption,
            schedule_time: post.schedule_time,
            status: PostStatus::Scheduled,
            access_token: post.access_token,
            attempts: 0,
            last_error: None,
            post_id: None,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PostStatus::Scheduled && self.schedule_time <= now
    }
}
