use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Connection URL for the backing database. Both `postgres://` and
    /// `sqlite:` URLs are accepted; the dialect is derived from the scheme.
    pub database_url: String,
    /// Pool size. Ignored for in-memory SQLite, which is pinned to a
    /// single connection so every statement sees the same database.
    pub max_connections: u32,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        database_url: std::env::var("NOTISTORE_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "postgres://localhost/notistore".into()),
        max_connections: std::env::var("NOTISTORE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5),
    })
}
