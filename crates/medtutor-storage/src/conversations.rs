//! Conversation history store.
//!
//! [`ConversationStore`] is the persistence seam used by the chat pipeline.
//! [`SqliteConversationStore`] implements it over [`Database`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use tracing::debug;

use medtutor_core::error::MedtutorError;
use medtutor_core::types::{
    ChatTurn, ConversationSummary, StoredConversation, DEFAULT_CONVERSATION_TITLE,
};

use crate::db::Database;

/// Key-value conversation store keyed by conversation id.
pub trait ConversationStore: Send + Sync {
    /// Insert or replace a conversation.
    ///
    /// Image data is replaced by a placeholder before writing. `title`
    /// overrides the stored title; without it an existing title is kept,
    /// falling back to the default. The creation time of an existing
    /// conversation is preserved.
    fn save(
        &self,
        id: &str,
        turns: &[ChatTurn],
        title: Option<&str>,
    ) -> Result<StoredConversation, MedtutorError>;

    fn load(&self, id: &str) -> Result<Option<StoredConversation>, MedtutorError>;

    /// Most recently updated first.
    fn list_recent(&self, limit: usize) -> Result<Vec<ConversationSummary>, MedtutorError>;

    /// Returns whether a conversation was removed.
    fn delete(&self, id: &str) -> Result<bool, MedtutorError>;

    /// Returns the number of conversations removed.
    fn clear_all(&self) -> Result<usize, MedtutorError>;
}

/// SQLite-backed conversation store.
#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    db: Arc<Database>,
}

impl SqliteConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Result<StoredConversation, MedtutorError>> {
    let id: String = row.get(0)?;
    let title: String = row.get(1)?;
    let turns_json: String = row.get(2)?;
    let created_at: i64 = row.get(3)?;
    let updated_at: i64 = row.get(4)?;

    Ok(serde_json::from_str::<Vec<ChatTurn>>(&turns_json)
        .map_err(MedtutorError::from)
        .map(|turns| StoredConversation {
            id,
            title,
            turns,
            created_at: millis_to_utc(created_at),
            updated_at: millis_to_utc(updated_at),
        }))
}

impl ConversationStore for SqliteConversationStore {
    fn save(
        &self,
        id: &str,
        turns: &[ChatTurn],
        title: Option<&str>,
    ) -> Result<StoredConversation, MedtutorError> {
        let light: Vec<ChatTurn> = turns
            .iter()
            .map(|t| ChatTurn {
                role: t.role,
                content: t.content.without_image_data(),
            })
            .collect();
        let turns_json = serde_json::to_string(&light)?;
        let now = Utc::now();

        self.db.with_conn(|conn| {
            let existing: Option<(String, i64)> = conn
                .query_row(
                    "SELECT title, created_at FROM conversations WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| MedtutorError::Storage(format!("Failed to read conversation: {}", e)))?;

            let title = title
                .map(str::to_string)
                .or_else(|| existing.as_ref().map(|(t, _)| t.clone()))
                .unwrap_or_else(|| DEFAULT_CONVERSATION_TITLE.to_string());
            let created_at = existing
                .map(|(_, c)| c)
                .unwrap_or_else(|| now.timestamp_millis());

            conn.execute(
                "INSERT INTO conversations (id, title, turns, message_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    turns = excluded.turns,
                    message_count = excluded.message_count,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    id,
                    title,
                    turns_json,
                    light.len() as i64,
                    created_at,
                    now.timestamp_millis(),
                ],
            )
            .map_err(|e| MedtutorError::Storage(format!("Failed to save conversation: {}", e)))?;

            debug!(id, turns = light.len(), "Conversation saved");
            Ok(StoredConversation {
                id: id.to_string(),
                title,
                turns: light.clone(),
                created_at: millis_to_utc(created_at),
                updated_at: millis_to_utc(now.timestamp_millis()),
            })
        })
    }

    fn load(&self, id: &str) -> Result<Option<StoredConversation>, MedtutorError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, title, turns, created_at, updated_at
                     FROM conversations WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_conversation,
                )
                .optional()
                .map_err(|e| MedtutorError::Storage(e.to_string()))?;

            match result {
                Some(conversation) => Ok(Some(conversation?)),
                None => Ok(None),
            }
        })
    }

    fn list_recent(&self, limit: usize) -> Result<Vec<ConversationSummary>, MedtutorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, updated_at, message_count
                     FROM conversations
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT ?1",
                )
                .map_err(|e| MedtutorError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![limit as i64], |row| {
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        updated_at: millis_to_utc(row.get(2)?),
                        message_count: row.get::<_, i64>(3)? as usize,
                    })
                })
                .map_err(|e| MedtutorError::Storage(e.to_string()))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| MedtutorError::Storage(e.to_string()))
        })
    }

    fn delete(&self, id: &str) -> Result<bool, MedtutorError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM conversations WHERE id = ?1",
                    rusqlite::params![id],
                )
                .map_err(|e| {
                    MedtutorError::Storage(format!("Failed to delete conversation: {}", e))
                })?;
            Ok(removed > 0)
        })
    }

    fn clear_all(&self) -> Result<usize, MedtutorError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM conversations", [])
                .map_err(|e| {
                    MedtutorError::Storage(format!("Failed to clear conversations: {}", e))
                })
        })
    }
}
