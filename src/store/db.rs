//! Database-backed implementation of the store facade.
//!
//! One implementation serves both supported backends through the sqlx
//! `Any` driver; everything dialect-specific is resolved once at
//! construction into a [`Dialect`] and injected from there.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use crate::config::Config;
use crate::errors::Result;
use crate::models::notification::{
    Broadcast, InitialBroadcastStatus, Notification, NotificationPayload, NotificationStatus,
    Severity, UnifiedNotification,
};

use super::dialect::Dialect;
use super::query::{feed_query, lookup_query, BuiltQuery, FeedProjection, SqlArg, SqlBuilder};
use super::schema;
use super::{NotificationGetOptions, NotificationsStore};

/// Requested transition for one status axis. The two axes are
/// independent: every mark operation touches exactly one and leaves the
/// other unchanged.
#[derive(Debug, Clone, Copy)]
enum StatusChange {
    Set(DateTime<Utc>),
    Clear,
    Keep,
}

impl StatusChange {
    fn is_touched(self) -> bool {
        !matches!(self, StatusChange::Keep)
    }
}

#[derive(Clone)]
pub struct DbNotificationsStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl DbNotificationsStore {
    /// Connect with a default-sized pool. The dialect is derived from the
    /// URL scheme before any connection is made.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, 5).await
    }

    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let dialect = Dialect::from_url(database_url)?;
        sqlx::any::install_default_drivers();

        // An in-memory SQLite database exists per connection; a larger
        // pool would hand out statements against different databases.
        let max_connections = if dialect == Dialect::Sqlite && database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool, dialect })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect_with(&config.database_url, config.max_connections).await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Apply the bootstrap DDL for the three relations. Versioned
    /// migrations are the embedding service's responsibility.
    pub async fn migrate(&self) -> Result<()> {
        for statement in schema::ddl(self.dialect) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_unified(&self, built: &BuiltQuery) -> Result<Vec<UnifiedNotification>> {
        let rows = bind_args(&built.sql, &built.args).fetch_all(&self.pool).await?;
        let mut notifications = Vec::with_capacity(rows.len());
        for row in &rows {
            notifications.push(unified_from_row(self.dialect, row)?);
        }
        Ok(notifications)
    }

    /// Shared mark algorithm: update owned rows in `notification`, then
    /// upsert overlay rows for any ids that turn out to be broadcasts.
    async fn set_status(
        &self,
        ids: &[String],
        user: &str,
        read: StatusChange,
        saved: StatusChange,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        tracing::debug!(user, ids = ids.len(), "applying notification status change");

        let mut builder = SqlBuilder::new(self.dialect);
        builder.push("UPDATE notification SET ");
        push_status_assignments(&mut builder, self.dialect, read, saved);
        builder.push(" WHERE \"user\" = ");
        builder.push_bind(SqlArg::Text(user.to_string()));
        builder.push(" AND id IN (");
        push_id_list(&mut builder, ids);
        builder.push(")");
        let update = builder.finish();
        bind_args(&update.sql, &update.args)
            .execute(&self.pool)
            .await?;

        let mut builder = SqlBuilder::new(self.dialect);
        builder.push("SELECT id FROM broadcast WHERE id IN (");
        push_id_list(&mut builder, ids);
        builder.push(")");
        let select = builder.finish();
        let rows = bind_args(&select.sql, &select.args)
            .fetch_all(&self.pool)
            .await?;
        let broadcast_ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        if broadcast_ids.is_empty() {
            return Ok(());
        }

        if self.dialect.supports_upsert() {
            self.merge_overlay(&broadcast_ids, user, read, saved).await
        } else {
            self.overlay_read_modify_write(&broadcast_ids, user, read, saved)
                .await
        }
    }

    /// Native path: one atomic multi-row insert that merges only the
    /// columns touched by this call on conflict.
    async fn merge_overlay(
        &self,
        broadcast_ids: &[String],
        user: &str,
        read: StatusChange,
        saved: StatusChange,
    ) -> Result<()> {
        let mut builder = SqlBuilder::new(self.dialect);
        builder.push("INSERT INTO broadcast_user_status (broadcast_id, \"user\", read, saved) VALUES ");
        for (i, broadcast_id) in broadcast_ids.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push("(");
            builder.push_bind(SqlArg::Text(broadcast_id.clone()));
            builder.push(", ");
            builder.push_bind(SqlArg::Text(user.to_string()));
            builder.push(", ");
            builder.push_bind(overlay_insert_value(self.dialect, read));
            builder.push(", ");
            builder.push_bind(overlay_insert_value(self.dialect, saved));
            builder.push(")");
        }
        builder.push(" ON CONFLICT (broadcast_id, \"user\") DO UPDATE SET ");
        let mut first = true;
        for (column, change) in [("read", read), ("saved", saved)] {
            if !change.is_touched() {
                continue;
            }
            if !first {
                builder.push(", ");
            }
            builder.push(column);
            builder.push(" = EXCLUDED.");
            builder.push(column);
            first = false;
        }
        let upsert = builder.finish();
        bind_args(&upsert.sql, &upsert.args)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fallback for backends without atomic upsert. Concurrent first
    /// marks of the same (broadcast, user) pair can both observe "absent"
    /// between the existence check and the insert; this path is reserved
    /// for single-writer and test deployments. A failure mid-loop leaves
    /// earlier ids updated and later ones untouched.
    async fn overlay_read_modify_write(
        &self,
        broadcast_ids: &[String],
        user: &str,
        read: StatusChange,
        saved: StatusChange,
    ) -> Result<()> {
        for broadcast_id in broadcast_ids {
            let mut builder = SqlBuilder::new(self.dialect);
            builder.push(
                "SELECT broadcast_id FROM broadcast_user_status WHERE broadcast_id = ",
            );
            builder.push_bind(SqlArg::Text(broadcast_id.clone()));
            builder.push(" AND \"user\" = ");
            builder.push_bind(SqlArg::Text(user.to_string()));
            builder.push(" LIMIT 1");
            let probe = builder.finish();
            let exists = bind_args(&probe.sql, &probe.args)
                .fetch_optional(&self.pool)
                .await?
                .is_some();

            let statement = if exists {
                let mut builder = SqlBuilder::new(self.dialect);
                builder.push("UPDATE broadcast_user_status SET ");
                push_status_assignments(&mut builder, self.dialect, read, saved);
                builder.push(" WHERE broadcast_id = ");
                builder.push_bind(SqlArg::Text(broadcast_id.clone()));
                builder.push(" AND \"user\" = ");
                builder.push_bind(SqlArg::Text(user.to_string()));
                builder.finish()
            } else {
                let mut builder = SqlBuilder::new(self.dialect);
                builder.push(
                    "INSERT INTO broadcast_user_status (broadcast_id, \"user\", read, saved) VALUES (",
                );
                builder.push_bind(SqlArg::Text(broadcast_id.clone()));
                builder.push(", ");
                builder.push_bind(SqlArg::Text(user.to_string()));
                builder.push(", ");
                builder.push_bind(overlay_insert_value(self.dialect, read));
                builder.push(", ");
                builder.push_bind(overlay_insert_value(self.dialect, saved));
                builder.push(")");
                builder.finish()
            };
            bind_args(&statement.sql, &statement.args)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationsStore for DbNotificationsStore {
    // -- Feed queries --

    async fn get_notifications(
        &self,
        options: &NotificationGetOptions,
    ) -> Result<Vec<UnifiedNotification>> {
        let built = feed_query(self.dialect, options, FeedProjection::Rows)?;
        self.fetch_unified(&built).await
    }

    async fn get_notifications_count(&self, options: &NotificationGetOptions) -> Result<i64> {
        let built = feed_query(self.dialect, options, FeedProjection::Count)?;
        let row = bind_args(&built.sql, &built.args)
            .fetch_one(&self.pool)
            .await?;
        Ok(count_from_row(&row, "total"))
    }

    async fn get_status(&self, options: &NotificationGetOptions) -> Result<NotificationStatus> {
        let built = feed_query(self.dialect, options, FeedProjection::Status)?;
        let row = bind_args(&built.sql, &built.args)
            .fetch_one(&self.pool)
            .await?;
        Ok(NotificationStatus {
            read: count_from_row(&row, "read_count"),
            unread: count_from_row(&row, "unread_count"),
        })
    }

    async fn get_notification(&self, id: &str) -> Result<Option<UnifiedNotification>> {
        let built = lookup_query(self.dialect, id);
        let row = bind_args(&built.sql, &built.args)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(unified_from_row(self.dialect, &row)?)),
            None => Ok(None),
        }
    }

    // -- Writes --

    async fn save_notification(&self, notification: &Notification) -> Result<()> {
        let mut builder = SqlBuilder::new(self.dialect);
        builder.push(
            "INSERT INTO notification (id, \"user\", origin, created, updated, read, saved, \
             title, description, link, topic, severity, scope, icon) VALUES (",
        );
        push_values(
            &mut builder,
            vec![
                SqlArg::Text(notification.id.clone()),
                SqlArg::Text(notification.user.clone()),
                SqlArg::Text(notification.origin.clone()),
                self.dialect.encode_timestamp(notification.created),
                self.dialect.encode_timestamp_opt(notification.updated),
                self.dialect.encode_timestamp_opt(notification.read),
                self.dialect.encode_timestamp_opt(notification.saved),
                SqlArg::Text(notification.payload.title.clone()),
                SqlArg::NullableText(notification.payload.description.clone()),
                SqlArg::NullableText(notification.payload.link.clone()),
                SqlArg::NullableText(notification.payload.topic.clone()),
                SqlArg::Text(notification.payload.severity.as_str().to_string()),
                SqlArg::NullableText(notification.payload.scope.clone()),
                SqlArg::NullableText(notification.payload.icon.clone()),
            ],
        );
        builder.push(")");
        let insert = builder.finish();
        bind_args(&insert.sql, &insert.args)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_broadcast(
        &self,
        broadcast: &Broadcast,
        initial_status: Option<&InitialBroadcastStatus>,
    ) -> Result<()> {
        let mut builder = SqlBuilder::new(self.dialect);
        builder.push(
            "INSERT INTO broadcast (id, origin, created, updated, title, description, link, \
             topic, severity, scope, icon) VALUES (",
        );
        push_values(
            &mut builder,
            vec![
                SqlArg::Text(broadcast.id.clone()),
                SqlArg::Text(broadcast.origin.clone()),
                self.dialect.encode_timestamp(broadcast.created),
                self.dialect.encode_timestamp_opt(broadcast.updated),
                SqlArg::Text(broadcast.payload.title.clone()),
                SqlArg::NullableText(broadcast.payload.description.clone()),
                SqlArg::NullableText(broadcast.payload.link.clone()),
                SqlArg::NullableText(broadcast.payload.topic.clone()),
                SqlArg::Text(broadcast.payload.severity.as_str().to_string()),
                SqlArg::NullableText(broadcast.payload.scope.clone()),
                SqlArg::NullableText(broadcast.payload.icon.clone()),
            ],
        );
        builder.push(")");
        let insert = builder.finish();
        bind_args(&insert.sql, &insert.args)
            .execute(&self.pool)
            .await?;

        // The overlay row is only worth writing when the creating user
        // starts out with one of the flags set.
        if let Some(status) = initial_status {
            if status.read.is_some() || status.saved.is_some() {
                let mut builder = SqlBuilder::new(self.dialect);
                builder.push(
                    "INSERT INTO broadcast_user_status (broadcast_id, \"user\", read, saved) VALUES (",
                );
                push_values(
                    &mut builder,
                    vec![
                        SqlArg::Text(broadcast.id.clone()),
                        SqlArg::Text(status.user.clone()),
                        self.dialect.encode_timestamp_opt(status.read),
                        self.dialect.encode_timestamp_opt(status.saved),
                    ],
                );
                builder.push(")");
                let insert = builder.finish();
                bind_args(&insert.sql, &insert.args)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    // -- Dedup lookups & restore --

    async fn get_existing_scope_notification(
        &self,
        user: &str,
        scope: &str,
        origin: &str,
    ) -> Result<Option<Notification>> {
        let mut builder = SqlBuilder::new(self.dialect);
        builder.push(
            "SELECT id, \"user\", origin, created, updated, read, saved, title, description, \
             link, topic, severity, scope, icon FROM notification WHERE \"user\" = ",
        );
        builder.push_bind(SqlArg::Text(user.to_string()));
        builder.push(" AND scope = ");
        builder.push_bind(SqlArg::Text(scope.to_string()));
        builder.push(" AND origin = ");
        builder.push_bind(SqlArg::Text(origin.to_string()));
        builder.push(" LIMIT 1");
        let select = builder.finish();
        let row = bind_args(&select.sql, &select.args)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(notification_from_row(self.dialect, &row)?)),
            None => Ok(None),
        }
    }

    async fn get_existing_scope_broadcast(
        &self,
        scope: &str,
        origin: &str,
    ) -> Result<Option<Broadcast>> {
        let mut builder = SqlBuilder::new(self.dialect);
        builder.push(
            "SELECT id, origin, created, updated, title, description, link, topic, severity, \
             scope, icon FROM broadcast WHERE scope = ",
        );
        builder.push_bind(SqlArg::Text(scope.to_string()));
        builder.push(" AND origin = ");
        builder.push_bind(SqlArg::Text(origin.to_string()));
        builder.push(" LIMIT 1");
        let select = builder.finish();
        let row = bind_args(&select.sql, &select.args)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(broadcast_from_row(self.dialect, &row)?)),
            None => Ok(None),
        }
    }

    async fn restore_existing_notification(
        &self,
        id: &str,
        replacement: &Notification,
    ) -> Result<Option<UnifiedNotification>> {
        tracing::debug!(id, user = %replacement.user, "restoring existing notification");
        let now = Utc::now();

        // The caller does not know which table holds the row, so both are
        // targeted; the non-matching update affects zero rows.
        let mut builder = SqlBuilder::new(self.dialect);
        builder.push("UPDATE notification SET ");
        push_restore_assignments(&mut builder, self.dialect, replacement, now);
        builder.push(", read = NULL WHERE id = ");
        builder.push_bind(SqlArg::Text(id.to_string()));
        builder.push(" AND \"user\" = ");
        builder.push_bind(SqlArg::Text(replacement.user.clone()));
        let notification_update = builder.finish();

        let mut builder = SqlBuilder::new(self.dialect);
        builder.push("UPDATE broadcast SET ");
        push_restore_assignments(&mut builder, self.dialect, replacement, now);
        builder.push(" WHERE id = ");
        builder.push_bind(SqlArg::Text(id.to_string()));
        let broadcast_update = builder.finish();

        tokio::try_join!(
            bind_args(&notification_update.sql, &notification_update.args).execute(&self.pool),
            bind_args(&broadcast_update.sql, &broadcast_update.args).execute(&self.pool),
        )?;

        self.get_notification(id).await
    }

    // -- Mark state --

    async fn mark_read(&self, ids: &[String], user: &str) -> Result<()> {
        self.set_status(ids, user, StatusChange::Set(Utc::now()), StatusChange::Keep)
            .await
    }

    async fn mark_unread(&self, ids: &[String], user: &str) -> Result<()> {
        self.set_status(ids, user, StatusChange::Clear, StatusChange::Keep)
            .await
    }

    async fn mark_saved(&self, ids: &[String], user: &str) -> Result<()> {
        self.set_status(ids, user, StatusChange::Keep, StatusChange::Set(Utc::now()))
            .await
    }

    async fn mark_unsaved(&self, ids: &[String], user: &str) -> Result<()> {
        self.set_status(ids, user, StatusChange::Keep, StatusChange::Clear)
            .await
    }
}

fn bind_args<'q>(
    sql: &'q str,
    args: &'q [SqlArg],
) -> sqlx::query::Query<'q, sqlx::Any, AnyArguments<'q>> {
    let mut query = sqlx::query(sql);
    for arg in args {
        query = match arg {
            SqlArg::Text(value) => query.bind(value.as_str()),
            SqlArg::NullableText(value) => query.bind(value.as_deref()),
            SqlArg::Int(value) => query.bind(*value),
            SqlArg::NullableInt(value) => query.bind(*value),
        };
    }
    query
}

fn push_values(builder: &mut SqlBuilder, args: Vec<SqlArg>) {
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push_bind(arg);
    }
}

fn push_id_list(builder: &mut SqlBuilder, ids: &[String]) {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push_bind(SqlArg::Text(id.clone()));
    }
}

/// SET clause for the touched status columns only.
fn push_status_assignments(
    builder: &mut SqlBuilder,
    dialect: Dialect,
    read: StatusChange,
    saved: StatusChange,
) {
    let mut first = true;
    for (column, change) in [("read", read), ("saved", saved)] {
        if !change.is_touched() {
            continue;
        }
        if !first {
            builder.push(", ");
        }
        builder.push(column);
        builder.push(" = ");
        match change {
            StatusChange::Set(at) => {
                builder.push_bind(dialect.encode_timestamp(at));
            }
            StatusChange::Clear => {
                builder.push("NULL");
            }
            StatusChange::Keep => unreachable!("untouched axis filtered above"),
        }
        first = false;
    }
}

/// Value for an overlay INSERT: the untouched axis starts out absent.
fn overlay_insert_value(dialect: Dialect, change: StatusChange) -> SqlArg {
    match change {
        StatusChange::Set(at) => dialect.encode_timestamp(at),
        StatusChange::Clear | StatusChange::Keep => dialect.encode_timestamp_opt(None),
    }
}

/// Content refresh shared by the two restore updates: payload fields and
/// the `updated` stamp. `scope` and `icon` keep their original values.
fn push_restore_assignments(
    builder: &mut SqlBuilder,
    dialect: Dialect,
    replacement: &Notification,
    now: DateTime<Utc>,
) {
    builder.push("title = ");
    builder.push_bind(SqlArg::Text(replacement.payload.title.clone()));
    builder.push(", description = ");
    builder.push_bind(SqlArg::NullableText(replacement.payload.description.clone()));
    builder.push(", link = ");
    builder.push_bind(SqlArg::NullableText(replacement.payload.link.clone()));
    builder.push(", topic = ");
    builder.push_bind(SqlArg::NullableText(replacement.payload.topic.clone()));
    builder.push(", severity = ");
    builder.push_bind(SqlArg::Text(replacement.payload.severity.as_str().to_string()));
    builder.push(", updated = ");
    builder.push_bind(dialect.encode_timestamp(now));
}

fn unified_from_row(dialect: Dialect, row: &AnyRow) -> Result<UnifiedNotification> {
    Ok(UnifiedNotification {
        id: row.try_get("id")?,
        user: row.try_get("user")?,
        origin: row.try_get("origin")?,
        created: dialect.decode_timestamp(row, "created")?,
        updated: dialect.decode_timestamp_opt(row, "updated")?,
        read: dialect.decode_timestamp_opt(row, "read")?,
        saved: dialect.decode_timestamp_opt(row, "saved")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        link: row.try_get("link")?,
        topic: row.try_get("topic")?,
        severity: decode_severity(row)?,
        scope: row.try_get("scope")?,
    })
}

fn notification_from_row(dialect: Dialect, row: &AnyRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user: row.try_get("user")?,
        origin: row.try_get("origin")?,
        created: dialect.decode_timestamp(row, "created")?,
        updated: dialect.decode_timestamp_opt(row, "updated")?,
        read: dialect.decode_timestamp_opt(row, "read")?,
        saved: dialect.decode_timestamp_opt(row, "saved")?,
        payload: payload_from_row(row)?,
    })
}

fn broadcast_from_row(dialect: Dialect, row: &AnyRow) -> Result<Broadcast> {
    Ok(Broadcast {
        id: row.try_get("id")?,
        origin: row.try_get("origin")?,
        created: dialect.decode_timestamp(row, "created")?,
        updated: dialect.decode_timestamp_opt(row, "updated")?,
        payload: payload_from_row(row)?,
    })
}

fn payload_from_row(row: &AnyRow) -> Result<NotificationPayload> {
    Ok(NotificationPayload {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        link: row.try_get("link")?,
        topic: row.try_get("topic")?,
        severity: decode_severity(row)?,
        scope: row.try_get("scope")?,
        icon: row.try_get("icon")?,
    })
}

fn decode_severity(row: &AnyRow) -> Result<Severity> {
    let raw: String = row.try_get("severity")?;
    Severity::parse(&raw).ok_or_else(|| {
        sqlx::Error::ColumnDecode {
            index: "severity".to_string(),
            source: format!("unknown severity `{raw}`").into(),
        }
        .into()
    })
}

/// Drivers disagree on the type of aggregate counts; coerce with a
/// fallback chain and default missing values to zero.
fn count_from_row(row: &AnyRow, column: &str) -> i64 {
    if let Ok(count) = row.try_get::<i64, _>(column) {
        return count;
    }
    if let Ok(count) = row.try_get::<i32, _>(column) {
        return i64::from(count);
    }
    row.try_get::<String, _>(column)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0)
}
