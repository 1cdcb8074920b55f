use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

/// Links older than this are no longer considered for approval.
pub const RECENCY_WINDOW_HOURS: i64 = 24;

/// Oldest `created_at` still inside the recency window ending at `now`.
#[inline]
pub fn recency_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(RECENCY_WINDOW_HOURS)
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: i64, // assigned by the db on insert
    pub url: String,

    // identifies the chat message the link was posted in, used to look the
    // reactions back up
    pub message_timestamp: String,

    // provenance, never changes after insert
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,

    pub created_at: DateTime<Utc>,

    // only ever flips from false to true
    pub is_approved: bool,
}

impl Ord for Link {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for Link {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Link {}

/// A link observed in chat that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub url: String,
    pub message_timestamp: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApprovalUpdate {
    pub id: i64,
    pub is_approved: bool,
}

impl ApprovalUpdate {
    #[inline(always)]
    pub const fn approve(id: i64) -> ApprovalUpdate {
        ApprovalUpdate {
            id,
            is_approved: true,
        }
    }
}
