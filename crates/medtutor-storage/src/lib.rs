//! MedTutor storage crate: SQLite persistence for conversation history.
//!
//! Provides a WAL-mode SQLite database with migrations and the
//! [`ConversationStore`] used by the chat pipeline to save, list and
//! delete conversations.

pub mod conversations;
pub mod db;
pub mod migrations;

pub use conversations::{ConversationStore, SqliteConversationStore};
pub use db::Database;
