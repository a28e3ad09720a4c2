//! Database schema.
//!
//! Creates the conversations table and the schema_migrations bookkeeping
//! table. There is a single schema version.

use rusqlite::Connection;
use tracing::info;

use medtutor_core::error::MedtutorError;

/// Apply the schema if it has not been applied yet.
pub fn run_migrations(conn: &Connection) -> Result<(), MedtutorError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| MedtutorError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| MedtutorError::Storage(format!("Failed to query schema version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: conversations");
    }

    Ok(())
}

/// Version 1: conversation history.
///
/// Turns are stored as a JSON array. Timestamps are Unix milliseconds so
/// that recency ordering survives several saves within one second.
fn apply_v1(conn: &Connection) -> Result<(), MedtutorError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY NOT NULL,
            title           TEXT NOT NULL DEFAULT 'Nova Conversa',
            turns           TEXT NOT NULL DEFAULT '[]',
            message_count   INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
            ON conversations (updated_at DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'conversations');
        ",
    )
    .map_err(|e| MedtutorError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
