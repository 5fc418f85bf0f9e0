//! Table definitions for imported conversation archives.
//!
//! The schema is created with `IF NOT EXISTS` everywhere, so running it
//! against an already initialised database is a no-op.

use rusqlite::Connection;
use threadloom_common::{Error, Result};
use tracing::debug;

/// A named block of DDL applied as one batch.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const ARCHIVE_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "archive_schema",
    sql: "CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL UNIQUE,
            archive_id TEXT,
            title TEXT,
            create_time REAL,
            update_time REAL
        );

        CREATE TABLE IF NOT EXISTS conversation_nodes (
            node_id TEXT PRIMARY KEY,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            parent_id TEXT REFERENCES conversation_nodes(node_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            msg_id TEXT PRIMARY KEY REFERENCES conversation_nodes(node_id),
            role TEXT NOT NULL,
            author_name TEXT,
            content_type TEXT,
            metadata_json TEXT,
            status TEXT,
            end_turn INTEGER,
            weight REAL,
            create_time REAL,
            update_time REAL
        );

        CREATE TABLE IF NOT EXISTS message_parts (
            msg_id TEXT NOT NULL REFERENCES messages(msg_id),
            part_index INTEGER NOT NULL,
            part_text TEXT,
            PRIMARY KEY (msg_id, part_index)
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_conversation
            ON conversation_nodes(conversation_id);

        CREATE INDEX IF NOT EXISTS idx_nodes_parent
            ON conversation_nodes(parent_id);",
};

pub const TABLES: &[&str] = &[
    "conversations",
    "conversation_nodes",
    "messages",
    "message_parts",
];

/// Enables foreign-key enforcement and creates any missing tables and indexes.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(|e| Error::Database(format!("failed to enable foreign keys: {e}")))?;

    conn.execute_batch(ARCHIVE_SCHEMA_V1.sql).map_err(|e| {
        Error::Database(format!(
            "schema migration {} ({}) failed: {e}",
            ARCHIVE_SCHEMA_V1.version, ARCHIVE_SCHEMA_V1.name
        ))
    })?;

    debug!(
        "schema {} ({}) is in place",
        ARCHIVE_SCHEMA_V1.version, ARCHIVE_SCHEMA_V1.name
    );
    Ok(())
}
