//! SQL assembly for the unified feed view.
//!
//! Both read paths build the same base: the `notification` table and the
//! `broadcast` table (left-joined with its per-user status overlay)
//! reduced to one fixed column list via UNION ALL, then filtered to rows
//! visible to the requesting user.

use crate::errors::{Result, StoreError};

use super::dialect::Dialect;
use super::{FlagFilter, NotificationGetOptions, Sort, SortOrder};

/// Columns of the unified projection. Sort selectors are validated
/// against this list before any statement executes.
pub(crate) const UNIFIED_COLUMNS: [&str; 13] = [
    "id",
    "title",
    "description",
    "severity",
    "link",
    "origin",
    "scope",
    "topic",
    "created",
    "updated",
    "user",
    "read",
    "saved",
];

// `user` is reserved in PostgreSQL, so the identifier is quoted wherever
// it appears.
const UNIFIED_SELECT: &str =
    "id, title, description, severity, link, origin, scope, topic, created, updated, \"user\", read, saved";

const BROADCAST_SELECT: &str =
    "b.id, b.title, b.description, b.severity, b.link, b.origin, b.scope, b.topic, b.created, b.updated, NULL, s.read, s.saved";

/// A positional bind argument. The Any driver carries no chrono support,
/// so timestamps arrive here already encoded by the dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SqlArg {
    Text(String),
    NullableText(Option<String>),
    Int(i64),
    NullableInt(Option<i64>),
}

#[derive(Debug)]
pub(crate) struct BuiltQuery {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

/// Accumulates SQL text and bind arguments, emitting the dialect's
/// placeholder syntax as values are pushed.
pub(crate) struct SqlBuilder {
    dialect: Dialect,
    sql: String,
    args: Vec<SqlArg>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            args: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    pub fn push_bind(&mut self, arg: SqlArg) -> &mut Self {
        self.args.push(arg);
        let placeholder = self.dialect.placeholder(self.args.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn finish(self) -> BuiltQuery {
        BuiltQuery {
            sql: self.sql,
            args: self.args,
        }
    }
}

/// What the caller wants out of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeedProjection {
    Rows,
    Count,
    Status,
}

/// The UNION ALL base. When `user` is given, the overlay join is
/// constrained to that user so nobody else's read/saved state leaks into
/// the feed; the id lookup passes `None` and takes whatever overlay row
/// the join finds first.
fn push_unified_base(builder: &mut SqlBuilder, user: Option<&str>) {
    builder.push("SELECT ");
    builder.push(UNIFIED_SELECT);
    builder.push(" FROM notification UNION ALL SELECT ");
    builder.push(BROADCAST_SELECT);
    builder.push(" FROM broadcast b LEFT JOIN broadcast_user_status s ON s.broadcast_id = b.id");
    if let Some(user) = user {
        builder.push(" AND s.\"user\" = ");
        builder.push_bind(SqlArg::Text(user.to_string()));
    }
}

/// Builds the list/count/status query for one user's feed.
pub(crate) fn feed_query(
    dialect: Dialect,
    options: &NotificationGetOptions,
    projection: FeedProjection,
) -> Result<BuiltQuery> {
    let mut builder = SqlBuilder::new(dialect);

    match projection {
        FeedProjection::Rows => {
            builder.push("SELECT ");
            builder.push(UNIFIED_SELECT);
            builder.push(" FROM (");
        }
        FeedProjection::Count => {
            builder.push("SELECT COUNT(id) AS total FROM (");
        }
        FeedProjection::Status => {
            builder.push(
                "SELECT COUNT(CASE WHEN read IS NOT NULL THEN id END) AS read_count, \
                 COUNT(CASE WHEN read IS NULL THEN id END) AS unread_count FROM (",
            );
        }
    }

    push_unified_base(&mut builder, Some(&options.user));

    builder.push(") AS feed WHERE (\"user\" = ");
    builder.push_bind(SqlArg::Text(options.user.clone()));
    builder.push(" OR \"user\" IS NULL)");

    if let Some(created_after) = options.created_after {
        builder.push(" AND created >= ");
        builder.push_bind(dialect.encode_timestamp(created_after));
    }

    if let Some(search) = options.search.as_deref() {
        let pattern = format!("%{search}%");
        builder.push(" AND (LOWER(title) LIKE LOWER(");
        builder.push_bind(SqlArg::Text(pattern.clone()));
        builder.push(") OR LOWER(description) LIKE LOWER(");
        builder.push_bind(SqlArg::Text(pattern));
        builder.push("))");
    }

    if let Some(ids) = options.ids.as_deref() {
        if ids.is_empty() {
            // an explicit empty set matches nothing
            builder.push(" AND 1 = 0");
        } else {
            builder.push(" AND id IN (");
            for (i, id) in ids.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder.push_bind(SqlArg::Text(id.clone()));
            }
            builder.push(")");
        }
    }

    match options.read {
        FlagFilter::Any => {}
        FlagFilter::Present => {
            builder.push(" AND read IS NOT NULL");
        }
        FlagFilter::Absent => {
            builder.push(" AND read IS NULL");
        }
    }

    match options.saved {
        FlagFilter::Any => {}
        FlagFilter::Present => {
            builder.push(" AND saved IS NOT NULL");
        }
        FlagFilter::Absent => {
            builder.push(" AND saved IS NULL");
        }
    }

    // Count and status projections never sort or paginate.
    if projection == FeedProjection::Rows {
        push_order_by(&mut builder, &options.sort, options.sort_order)?;
        push_pagination(&mut builder, dialect, options.limit, options.offset);
    }

    Ok(builder.finish())
}

/// Lookup of a single unified row by id, from either table, without a
/// user context.
pub(crate) fn lookup_query(dialect: Dialect, id: &str) -> BuiltQuery {
    let mut builder = SqlBuilder::new(dialect);
    builder.push("SELECT ");
    builder.push(UNIFIED_SELECT);
    builder.push(" FROM (");
    push_unified_base(&mut builder, None);
    builder.push(") AS feed WHERE id = ");
    builder.push_bind(SqlArg::Text(id.to_string()));
    builder.push(" LIMIT 1");
    builder.finish()
}

fn push_order_by(
    builder: &mut SqlBuilder,
    sort: &Sort,
    sort_order: Option<SortOrder>,
) -> Result<()> {
    let order = sort_order.unwrap_or(SortOrder::Desc);
    match sort {
        Sort::Unsorted => {}
        Sort::Default => {
            builder.push(" ORDER BY created ");
            builder.push(order.as_sql());
        }
        Sort::Field(name) => {
            if !UNIFIED_COLUMNS.contains(&name.as_str()) {
                return Err(StoreError::InvalidArgument(format!(
                    "unknown sort column `{name}`"
                )));
            }
            builder.push(" ORDER BY ");
            builder.push(&quote_ident(name));
            builder.push(" ");
            builder.push(order.as_sql());
        }
    }
    Ok(())
}

fn push_pagination(
    builder: &mut SqlBuilder,
    dialect: Dialect,
    limit: Option<i64>,
    offset: Option<i64>,
) {
    match (limit, offset) {
        (Some(limit), Some(offset)) => {
            builder.push(" LIMIT ");
            builder.push_bind(SqlArg::Int(limit));
            builder.push(" OFFSET ");
            builder.push_bind(SqlArg::Int(offset));
        }
        (Some(limit), None) => {
            builder.push(" LIMIT ");
            builder.push_bind(SqlArg::Int(limit));
        }
        (None, Some(offset)) => {
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            if dialect == Dialect::Sqlite {
                builder.push(" LIMIT -1");
            }
            builder.push(" OFFSET ");
            builder.push_bind(SqlArg::Int(offset));
        }
        (None, None) => {}
    }
}

fn quote_ident(name: &str) -> String {
    if name == "user" {
        "\"user\"".to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(user: &str) -> NotificationGetOptions {
        NotificationGetOptions::for_user(user)
    }

    #[test]
    fn feed_defaults_to_created_desc() {
        let built = feed_query(Dialect::Sqlite, &options("alice"), FeedProjection::Rows).unwrap();
        assert!(built.sql.ends_with("ORDER BY created DESC"));
        // join user + visibility user
        assert_eq!(built.args.len(), 2);
    }

    #[test]
    fn postgres_placeholders_are_numbered_in_bind_order() {
        let mut opts = options("alice");
        opts.ids = Some(vec!["a".into(), "b".into()]);
        let built = feed_query(Dialect::Postgres, &opts, FeedProjection::Rows).unwrap();
        assert!(built.sql.contains("s.\"user\" = $1"));
        assert!(built.sql.contains("(\"user\" = $2"));
        assert!(built.sql.contains("id IN ($3, $4)"));
    }

    #[test]
    fn unknown_sort_column_is_rejected() {
        let mut opts = options("alice");
        opts.sort = Sort::Field("payload".into());
        let err = feed_query(Dialect::Sqlite, &opts, FeedProjection::Rows).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn unsorted_feed_has_no_order_by() {
        let mut opts = options("alice");
        opts.sort = Sort::Unsorted;
        let built = feed_query(Dialect::Sqlite, &opts, FeedProjection::Rows).unwrap();
        assert!(!built.sql.contains("ORDER BY"));
    }

    #[test]
    fn empty_id_set_matches_nothing() {
        let mut opts = options("alice");
        opts.ids = Some(vec![]);
        let built = feed_query(Dialect::Sqlite, &opts, FeedProjection::Rows).unwrap();
        assert!(built.sql.contains("1 = 0"));
    }

    #[test]
    fn bare_offset_gets_a_limit_on_sqlite() {
        let mut opts = options("alice");
        opts.offset = Some(10);
        let built = feed_query(Dialect::Sqlite, &opts, FeedProjection::Rows).unwrap();
        assert!(built.sql.contains("LIMIT -1 OFFSET ?"));

        let built = feed_query(Dialect::Postgres, &opts, FeedProjection::Rows).unwrap();
        assert!(!built.sql.contains("LIMIT"));
        assert!(built.sql.contains("OFFSET $3"));
    }

    #[test]
    fn count_projection_ignores_sort_and_pagination() {
        let mut opts = options("alice");
        opts.limit = Some(5);
        opts.offset = Some(5);
        let built = feed_query(Dialect::Sqlite, &opts, FeedProjection::Count).unwrap();
        assert!(built.sql.starts_with("SELECT COUNT(id) AS total"));
        assert!(!built.sql.contains("ORDER BY"));
        assert!(!built.sql.contains("LIMIT"));
    }
}
