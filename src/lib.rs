//! notistore: notification storage engine.
//!
//! Presents a single logical feed per user by merging two physical record
//! types: per-user rows in `notification` and shared rows in `broadcast`,
//! with per-user read/saved state for broadcasts kept in the
//! `broadcast_user_status` overlay table. Supports filtering, sorting,
//! pagination and substring search over the merged view, dedup lookups by
//! (scope, origin) identity, in-place restore of re-fired notifications,
//! and idempotent read/saved transitions on both record types.
//!
//! The same store runs against PostgreSQL or SQLite; backend differences
//! (upsert support, timestamp representation, placeholder syntax) are
//! resolved once at construction. See [`store::NotificationsStore`] for
//! the public contract and [`store::db::DbNotificationsStore`] for the
//! implementation.

pub mod config;
pub mod errors;
pub mod models;
pub mod store;

pub use errors::{Result, StoreError};
pub use models::notification::{
    Broadcast, BroadcastUserStatus, InitialBroadcastStatus, Notification, NotificationPayload,
    NotificationStatus, Severity, UnifiedNotification,
};
pub use store::db::DbNotificationsStore;
pub use store::dialect::Dialect;
pub use store::{FlagFilter, NotificationGetOptions, NotificationsStore, Sort, SortOrder};
