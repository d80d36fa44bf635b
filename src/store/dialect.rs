use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;

use crate::errors::StoreError;

use super::query::SqlArg;

/// Backend capabilities, resolved once from the database URL at store
/// construction and injected into the query and mark-state engines.
///
/// The two backends differ in three ways this crate cares about:
/// placeholder syntax, native upsert support, and the comparable form of
/// timestamps. SQLite stores timestamps as integer epoch milliseconds;
/// PostgreSQL stores them as fixed-width RFC 3339 UTC text, which orders
/// lexicographically. A `created_after` bound is always encoded to the
/// backend's own form so comparisons stay meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(database_url: &str) -> Result<Self, StoreError> {
        let scheme = database_url.split(':').next().unwrap_or("");
        match scheme {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            other => Err(StoreError::InvalidArgument(format!(
                "unsupported database url scheme `{other}`"
            ))),
        }
    }

    /// Whether the backend performs insert-or-update atomically via
    /// ON CONFLICT. The embedded backend takes the read-modify-write
    /// fallback instead.
    pub fn supports_upsert(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Positional placeholder for the 1-based parameter `index`.
    pub(crate) fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Encode a timestamp into the backend's comparable form.
    pub(crate) fn encode_timestamp(self, value: DateTime<Utc>) -> SqlArg {
        match self {
            Dialect::Sqlite => SqlArg::Int(value.timestamp_millis()),
            Dialect::Postgres => {
                SqlArg::Text(value.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
    }

    pub(crate) fn encode_timestamp_opt(self, value: Option<DateTime<Utc>>) -> SqlArg {
        match self {
            Dialect::Sqlite => SqlArg::NullableInt(value.map(|v| v.timestamp_millis())),
            Dialect::Postgres => SqlArg::NullableText(
                value.map(|v| v.to_rfc3339_opts(SecondsFormat::Micros, true)),
            ),
        }
    }

    pub(crate) fn decode_timestamp(
        self,
        row: &AnyRow,
        column: &str,
    ) -> Result<DateTime<Utc>, sqlx::Error> {
        self.decode_timestamp_opt(row, column)?
            .ok_or_else(|| decode_error(column, format!("unexpected NULL in `{column}`")))
    }

    pub(crate) fn decode_timestamp_opt(
        self,
        row: &AnyRow,
        column: &str,
    ) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        match self {
            Dialect::Sqlite => {
                let millis: Option<i64> = row.try_get(column)?;
                millis
                    .map(|ms| {
                        Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                            decode_error(column, format!("timestamp out of range: {ms}"))
                        })
                    })
                    .transpose()
            }
            Dialect::Postgres => {
                let text: Option<String> = row.try_get(column)?;
                text.map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| decode_error(column, e.to_string()))
                })
                .transpose()
            }
        }
    }
}

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_resolves_from_url_scheme() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/feed").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://localhost/feed").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert!(matches!(
            Dialect::from_url("mysql://localhost/feed"),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn only_postgres_upserts_natively() {
        assert!(Dialect::Postgres.supports_upsert());
        assert!(!Dialect::Sqlite.supports_upsert());
    }

    #[test]
    fn timestamps_encode_to_native_comparable_forms() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert!(matches!(
            Dialect::Sqlite.encode_timestamp(ts),
            SqlArg::Int(1_700_000_000_000)
        ));
        match Dialect::Postgres.encode_timestamp(ts) {
            SqlArg::Text(s) => assert_eq!(s, "2023-11-14T22:13:20.000000Z"),
            other => panic!("expected text encoding, got {other:?}"),
        }
    }
}
