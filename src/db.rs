use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS rooms (
        code TEXT PRIMARY KEY NOT NULL,
        creator TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL,
        room_code TEXT NOT NULL,
        sender TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_room_timestamp ON messages (room_code, timestamp)",
    "CREATE INDEX IF NOT EXISTS messages_timestamp ON messages (timestamp)",
];

/// Builds the pool without opening a connection, so an unreachable database
/// shows up as failing requests rather than a failed startup.
pub fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let mut options = SqlitePoolOptions::new().max_connections(max_connections);
    if url.contains(":memory:") {
        // every connection would otherwise get its own empty database
        options = options.max_connections(1).idle_timeout(None).max_lifetime(None);
    }
    options.connect_lazy(url)
}

pub async fn init_schema(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(db_pool).await?;
    }
    Ok(())
}

/// Fresh in-memory database with the schema applied.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let db_pool = connect("sqlite::memory:", 1)?;
    init_schema(&db_pool).await?;
    Ok(db_pool)
}

pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> Result<OffsetDateTime, sqlx::Error> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Current time truncated to the millisecond precision the tables store.
pub(crate) fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now)
}
