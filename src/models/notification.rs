use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared payload carried by both personal notifications and broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub topic: Option<String>,
    pub severity: Severity,
    /// Caller-supplied identity key used for deduplication together with
    /// `origin` (and `user` for personal notifications).
    pub scope: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Normal => "normal",
            Severity::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "normal" => Some(Severity::Normal),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// A notification owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user: String,
    pub origin: String,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    /// Presence means read; the value is when it was marked.
    pub read: Option<DateTime<Utc>>,
    pub saved: Option<DateTime<Utc>>,
    pub payload: NotificationPayload,
}

/// A notification visible to all users. Per-user read/saved state lives in
/// the `broadcast_user_status` overlay, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: String,
    pub origin: String,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub payload: NotificationPayload,
}

/// Per-user overlay row for a broadcast, created lazily on first mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastUserStatus {
    pub broadcast_id: String,
    pub user: String,
    pub read: Option<DateTime<Utc>>,
    pub saved: Option<DateTime<Utc>>,
}

/// Initial per-user state recorded while saving a broadcast, so the
/// creating user can start out with it read or saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialBroadcastStatus {
    pub user: String,
    pub read: Option<DateTime<Utc>>,
    pub saved: Option<DateTime<Utc>>,
}

/// The query-time projection merging both record types into one shape.
///
/// `user` is `None` exactly when the row is a broadcast; `read`/`saved`
/// then reflect the requesting user's overlay row, if any. `icon` is
/// stored on both tables but is not part of this projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedNotification {
    pub id: String,
    pub user: Option<String>,
    pub origin: String,
    pub created: DateTime<Utc>,
    pub updated: Option<DateTime<Utc>>,
    pub read: Option<DateTime<Utc>>,
    pub saved: Option<DateTime<Utc>>,
    pub title: String,
    pub description: Option<String>,
    pub link: Option<String>,
    pub topic: Option<String>,
    pub severity: Severity,
    pub scope: Option<String>,
}

/// Aggregate read/unread counts for one user's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStatus {
    pub read: i64,
    pub unread: i64,
}
