//! Storage contract for the notification feed.
//!
//! The facade merges two physical record types (per-user rows in
//! `notification`, shared rows in `broadcast`) into one logical feed per
//! user, with per-user read/saved state for broadcasts kept in the
//! `broadcast_user_status` overlay table.

pub mod db;
pub mod dialect;
pub(crate) mod query;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::models::notification::{
    Broadcast, InitialBroadcastStatus, Notification, NotificationStatus, UnifiedNotification,
};

/// Sort selection for feed queries.
///
/// `Unsorted` is distinct from "not provided": it suppresses ORDER BY
/// entirely and is used internally by count and status queries where
/// ordering is wasted work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Sort {
    /// Sort by `created`, newest first (unless overridden by `sort_order`).
    #[default]
    Default,
    /// No ORDER BY at all.
    Unsorted,
    /// Sort by a named column of the unified projection. Unknown columns
    /// are rejected with `InvalidArgument` before any statement runs.
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Three-way filter on a nullable status timestamp.
///
/// An explicit tri-state rather than `Option<bool>`, so "not provided"
/// cannot be confused with "must be absent".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlagFilter {
    /// No filtering; matches rows with and without the timestamp.
    #[default]
    Any,
    /// Only rows where the timestamp is set.
    Present,
    /// Only rows where the timestamp is NULL.
    Absent,
}

/// Options accepted by the feed read queries.
#[derive(Debug, Clone)]
pub struct NotificationGetOptions {
    /// The requesting user. Every query scopes to rows visible to this
    /// user: their own notifications plus all broadcasts.
    pub user: String,
    pub sort: Sort,
    /// Defaults to descending when unset.
    pub sort_order: Option<SortOrder>,
    /// Inclusive lower bound on `created`, compared in the backend's
    /// native representation (see `Dialect`).
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Case-insensitive substring match on title or description.
    pub search: Option<String>,
    /// Set-membership filter on id. `Some(vec![])` matches nothing.
    pub ids: Option<Vec<String>>,
    pub read: FlagFilter,
    pub saved: FlagFilter,
}

impl NotificationGetOptions {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            sort: Sort::Default,
            sort_order: None,
            created_after: None,
            limit: None,
            offset: None,
            search: None,
            ids: None,
            read: FlagFilter::Any,
            saved: FlagFilter::Any,
        }
    }
}

/// Public contract of the notification storage engine, consumed in-process
/// by the service layer.
#[async_trait]
pub trait NotificationsStore: Send + Sync {
    /// The merged feed visible to `options.user`, filtered and sorted.
    async fn get_notifications(
        &self,
        options: &NotificationGetOptions,
    ) -> Result<Vec<UnifiedNotification>>;

    /// Row count for the same filter set; `options.sort` is ignored.
    async fn get_notifications_count(&self, options: &NotificationGetOptions) -> Result<i64>;

    /// Read/unread counts computed in a single pass over the feed.
    async fn get_status(&self, options: &NotificationGetOptions) -> Result<NotificationStatus>;

    /// Lookup by id across both tables. No user context: for broadcasts
    /// the overlay join is unconstrained and `read`/`saved` reflect an
    /// arbitrary overlay row when several users have marked the row.
    async fn get_notification(&self, id: &str) -> Result<Option<UnifiedNotification>>;

    async fn save_notification(&self, notification: &Notification) -> Result<()>;

    /// Persist a broadcast. When `initial_status` carries a read or saved
    /// timestamp, the overlay row for the creating user is inserted in the
    /// same call.
    async fn save_broadcast(
        &self,
        broadcast: &Broadcast,
        initial_status: Option<&InitialBroadcastStatus>,
    ) -> Result<()>;

    /// Dedup lookup: the first existing personal notification with this
    /// (user, scope, origin) identity, if any. Duplicates may coexist;
    /// which one is returned is unspecified.
    async fn get_existing_scope_notification(
        &self,
        user: &str,
        scope: &str,
        origin: &str,
    ) -> Result<Option<Notification>>;

    /// Dedup lookup for broadcasts by (scope, origin).
    async fn get_existing_scope_broadcast(
        &self,
        scope: &str,
        origin: &str,
    ) -> Result<Option<Broadcast>>;

    /// Refresh an existing row in place instead of inserting a duplicate:
    /// content fields and `updated` are overwritten, `read` is cleared so
    /// the notification surfaces as unread again. Both tables are targeted
    /// unconditionally; the non-matching update is a no-op. Returns the
    /// re-read unified row, or `None` if the id does not exist.
    async fn restore_existing_notification(
        &self,
        id: &str,
        replacement: &Notification,
    ) -> Result<Option<UnifiedNotification>>;

    async fn mark_read(&self, ids: &[String], user: &str) -> Result<()>;
    async fn mark_unread(&self, ids: &[String], user: &str) -> Result<()>;
    async fn mark_saved(&self, ids: &[String], user: &str) -> Result<()>;
    async fn mark_unsaved(&self, ids: &[String], user: &str) -> Result<()>;
}
