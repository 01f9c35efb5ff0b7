//! Database bootstrap for the request store.
//!
//! Wraps SQLite access via sqlx. A single-writer pool keeps every
//! read-modify-write on a record serialized at the storage layer; the guard
//! clauses in `store` do the rest.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open or create a database at the given path and ensure the schema exists.
pub async fn open(path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            sqlx::Error::Configuration(format!("failed to create db directory: {}", e).into())
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        // WAL mode for better concurrent read performance
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        // NORMAL sync balances durability vs speed
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1) // SQLite performs best with single writer
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Open an in-memory database, mainly for tests and harnesses.
pub async fn open_in_memory() -> Result<SqlitePool, sqlx::Error> {
    // One connection only: each sqlite::memory: connection is its own db.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_label TEXT NOT NULL,
            contact TEXT NOT NULL,
            state TEXT NOT NULL,
            otp TEXT,
            credential TEXT,
            created_at TEXT NOT NULL,
            decided_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_requests_contact_state
        ON requests (contact, state)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
