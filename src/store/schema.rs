//! Table definitions for both backends.
//!
//! Timestamps are kept in the backend's comparable form: integer epoch
//! milliseconds on SQLite, fixed-width RFC 3339 UTC text on PostgreSQL
//! (which orders lexicographically). `user` is quoted because it is a
//! reserved word in PostgreSQL.
//!
//! Versioned migration tooling is the embedding service's concern; this
//! DDL is the bootstrap applied by [`migrate`](super::db::DbNotificationsStore::migrate)
//! for tests and local development. Note that no uniqueness constraint is
//! placed on (scope, origin, user): deduplication is a best-effort lookup,
//! not an enforced invariant.

use super::dialect::Dialect;

const SQLITE_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS notification (
        id TEXT PRIMARY KEY,
        \"user\" TEXT NOT NULL,
        origin TEXT NOT NULL,
        created INTEGER NOT NULL,
        updated INTEGER,
        read INTEGER,
        saved INTEGER,
        title TEXT NOT NULL,
        description TEXT,
        link TEXT,
        topic TEXT,
        severity TEXT NOT NULL DEFAULT 'normal',
        scope TEXT,
        icon TEXT
    )",
    "CREATE INDEX IF NOT EXISTS ix_notification_user_created ON notification (\"user\", created)",
    "CREATE INDEX IF NOT EXISTS ix_notification_identity ON notification (\"user\", scope, origin)",
    "CREATE TABLE IF NOT EXISTS broadcast (
        id TEXT PRIMARY KEY,
        origin TEXT NOT NULL,
        created INTEGER NOT NULL,
        updated INTEGER,
        title TEXT NOT NULL,
        description TEXT,
        link TEXT,
        topic TEXT,
        severity TEXT NOT NULL DEFAULT 'normal',
        scope TEXT,
        icon TEXT
    )",
    "CREATE INDEX IF NOT EXISTS ix_broadcast_identity ON broadcast (scope, origin)",
    "CREATE TABLE IF NOT EXISTS broadcast_user_status (
        broadcast_id TEXT NOT NULL,
        \"user\" TEXT NOT NULL,
        read INTEGER,
        saved INTEGER,
        PRIMARY KEY (broadcast_id, \"user\")
    )",
];

const POSTGRES_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS notification (
        id TEXT PRIMARY KEY,
        \"user\" TEXT NOT NULL,
        origin TEXT NOT NULL,
        created TEXT NOT NULL,
        updated TEXT,
        read TEXT,
        saved TEXT,
        title TEXT NOT NULL,
        description TEXT,
        link TEXT,
        topic TEXT,
        severity TEXT NOT NULL DEFAULT 'normal',
        scope TEXT,
        icon TEXT
    )",
    "CREATE INDEX IF NOT EXISTS ix_notification_user_created ON notification (\"user\", created)",
    "CREATE INDEX IF NOT EXISTS ix_notification_identity ON notification (\"user\", scope, origin)",
    "CREATE TABLE IF NOT EXISTS broadcast (
        id TEXT PRIMARY KEY,
        origin TEXT NOT NULL,
        created TEXT NOT NULL,
        updated TEXT,
        title TEXT NOT NULL,
        description TEXT,
        link TEXT,
        topic TEXT,
        severity TEXT NOT NULL DEFAULT 'normal',
        scope TEXT,
        icon TEXT
    )",
    "CREATE INDEX IF NOT EXISTS ix_broadcast_identity ON broadcast (scope, origin)",
    "CREATE TABLE IF NOT EXISTS broadcast_user_status (
        broadcast_id TEXT NOT NULL,
        \"user\" TEXT NOT NULL,
        read TEXT,
        saved TEXT,
        PRIMARY KEY (broadcast_id, \"user\")
    )",
];

pub(crate) fn ddl(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::Sqlite => SQLITE_DDL,
        Dialect::Postgres => POSTGRES_DDL,
    }
}
