use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use threadloom_common::{ConversationId, Error, Result};
use tracing::info;

use crate::archive::Archive;
use crate::importer::{self, ImportOptions, ImportSummary};
use crate::schema;

/// Row counts of the four archive tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub conversations: u64,
    pub nodes: u64,
    pub messages: u64,
    pub parts: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub file_name: String,
    pub archive_id: Option<String>,
    pub title: Option<String>,
    pub create_time: Option<f64>,
    pub update_time: Option<f64>,
    pub node_count: u64,
}

impl ConversationRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.create_time.and_then(epoch_to_datetime)
    }
}

/// SQLite database holding imported conversation archives.
pub struct ArchiveStore {
    conn: Connection,
}

impl ArchiveStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening archive store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        schema::initialize(&self.conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Parses `contents` and applies it as one transaction.
    ///
    /// Nothing from the file is left behind when this returns an error. With
    /// `dry_run` set, the transaction is rolled back after a successful apply.
    pub fn import_file(
        &mut self,
        file_name: &str,
        contents: &str,
        options: ImportOptions,
    ) -> Result<ImportSummary> {
        let archive = Archive::parse(contents)?;

        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;

        let summary = importer::import_archive(&tx, file_name, &archive, options.foreign_keys)?;

        if options.dry_run {
            tx.rollback()
                .map_err(|e| Error::Database(format!("failed to roll back dry run: {e}")))?;
        } else {
            tx.commit()
                .map_err(|e| Error::Database(format!("failed to commit {file_name}: {e}")))?;
        }

        Ok(summary)
    }

    pub fn counts(&self) -> Result<TableCounts> {
        let count = |table: &str| -> Result<u64> {
            self.conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map(|n| n as u64)
                .map_err(|e| Error::Database(format!("failed to count {table}: {e}")))
        };

        Ok(TableCounts {
            conversations: count("conversations")?,
            nodes: count("conversation_nodes")?,
            messages: count("messages")?,
            parts: count("message_parts")?,
        })
    }

    pub fn conversations(&self) -> Result<Vec<ConversationRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.id, c.file_name, c.archive_id, c.title, c.create_time, c.update_time,
                        (SELECT count(*) FROM conversation_nodes n WHERE n.conversation_id = c.id)
                 FROM conversations c
                 ORDER BY c.id",
            )
            .map_err(|e| Error::Database(format!("failed to prepare conversation query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ConversationRecord {
                    id: ConversationId::new(row.get(0)?),
                    file_name: row.get(1)?,
                    archive_id: row.get(2)?,
                    title: row.get(3)?,
                    create_time: row.get(4)?,
                    update_time: row.get(5)?,
                    node_count: row.get::<_, i64>(6)? as u64,
                })
            })
            .map_err(|e| Error::Database(format!("failed to query conversations: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect conversations: {e}")))
    }

    /// Text of a message's parts in position order; non-text parts come back as JSON.
    pub fn message_parts(&self, msg_id: &str) -> Result<Vec<Option<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT part_text FROM message_parts WHERE msg_id = ?1 ORDER BY part_index")
            .map_err(|e| Error::Database(format!("failed to prepare part query: {e}")))?;

        let rows = stmt
            .query_map(params![msg_id], |row| row.get(0))
            .map_err(|e| Error::Database(format!("failed to query parts of {msg_id}: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect parts of {msg_id}: {e}")))
    }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}
