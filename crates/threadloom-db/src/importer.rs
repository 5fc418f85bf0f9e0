//! Flattens one parsed archive into conversation, node, message and part rows.
//!
//! Every insert is `INSERT OR IGNORE`, so replaying an archive that is already
//! stored touches no rows. The caller owns the transaction; an error from here
//! means the caller must roll it back.

use rusqlite::{OptionalExtension, Transaction, params};
use threadloom_common::{ConversationId, Error, ForeignKeyMode, NodeId, Result};
use tracing::debug;

use crate::archive::{Archive, ArchiveMessage};
use crate::normalize::{normalize, normalize_opt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    pub foreign_keys: ForeignKeyMode,
    /// Roll the file's transaction back once every row has been applied.
    pub dry_run: bool,
}

/// What one archive contributed, counted from the input rather than from rows changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub conversation_id: ConversationId,
    /// False when the file name was already present and its row was reused.
    pub created: bool,
    pub nodes: usize,
    pub roots: usize,
    pub messages: usize,
    pub parts: usize,
}

pub fn import_archive(
    tx: &Transaction<'_>,
    file_name: &str,
    archive: &Archive,
    mode: ForeignKeyMode,
) -> Result<ImportSummary> {
    if mode == ForeignKeyMode::Deferred {
        // Reset by SQLite at the end of the transaction.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")
            .map_err(|e| Error::Database(format!("failed to defer foreign keys: {e}")))?;
    }

    let (conversation_id, created) = upsert_conversation(tx, file_name, archive)?;

    let mut messages = 0;
    let mut parts = 0;

    for (node_id, node) in &archive.mapping {
        let parent_id = match mode {
            ForeignKeyMode::TwoPass => None,
            ForeignKeyMode::Deferred | ForeignKeyMode::Immediate => node.parent.as_ref(),
        };
        insert_node(tx, conversation_id, node_id, parent_id)?;

        let Some(message) = node.decode_message(node_id)? else {
            continue;
        };
        insert_message(tx, node_id, &message)?;
        parts += insert_parts(tx, node_id, &message)?;
        messages += 1;
    }

    if mode == ForeignKeyMode::TwoPass {
        link_parents(tx, conversation_id, archive)?;
    }

    ensure_parents_exist(tx, conversation_id)?;

    let summary = ImportSummary {
        conversation_id,
        created,
        nodes: archive.mapping.len(),
        roots: archive.roots().count(),
        messages,
        parts,
    };
    debug!(
        "applied {file_name}: conversation {} ({} nodes, {} messages, {} parts)",
        summary.conversation_id, summary.nodes, summary.messages, summary.parts
    );
    Ok(summary)
}

fn upsert_conversation(
    tx: &Transaction<'_>,
    file_name: &str,
    archive: &Archive,
) -> Result<(ConversationId, bool)> {
    let inserted = tx
        .execute(
            "INSERT OR IGNORE INTO conversations (file_name, archive_id, title, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file_name,
                archive.id,
                archive.title,
                archive.create_time,
                archive.update_time,
            ],
        )
        .map_err(|e| Error::Database(format!("failed to insert conversation {file_name}: {e}")))?;

    let id = tx
        .query_row(
            "SELECT id FROM conversations WHERE file_name = ?1",
            params![file_name],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to look up conversation {file_name}: {e}")))?
        .ok_or_else(|| Error::NotFound(format!("conversation row for {file_name}")))?;

    Ok((ConversationId::new(id), inserted == 1))
}

fn insert_node(
    tx: &Transaction<'_>,
    conversation_id: ConversationId,
    node_id: &NodeId,
    parent_id: Option<&NodeId>,
) -> Result<()> {
    tx.prepare_cached(
        "INSERT OR IGNORE INTO conversation_nodes (node_id, conversation_id, parent_id)
         VALUES (?1, ?2, ?3)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            node_id.as_str(),
            conversation_id.get(),
            parent_id.map(NodeId::as_str),
        ])
    })
    .map_err(|e| match parent_id {
        Some(parent_id) => Error::Database(format!(
            "failed to insert node {node_id} under parent {parent_id}: {e}"
        )),
        None => Error::Database(format!("failed to insert node {node_id}: {e}")),
    })?;
    Ok(())
}

fn insert_message(tx: &Transaction<'_>, node_id: &NodeId, message: &ArchiveMessage) -> Result<()> {
    let metadata = normalize(&message.metadata)?;

    tx.prepare_cached(
        "INSERT OR IGNORE INTO messages (
            msg_id, role, author_name, content_type, metadata_json,
            status, end_turn, weight, create_time, update_time
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )
    .and_then(|mut stmt| {
        stmt.execute(params![
            node_id.as_str(),
            message.author.role,
            message.author.name,
            message.content.content_type,
            metadata,
            message.status,
            message.end_turn,
            message.weight,
            message.create_time,
            message.update_time,
        ])
    })
    .map_err(|e| Error::Database(format!("failed to insert message {node_id}: {e}")))?;
    Ok(())
}

fn insert_parts(tx: &Transaction<'_>, node_id: &NodeId, message: &ArchiveMessage) -> Result<usize> {
    let parts = message.content.parts();

    let mut stmt = tx
        .prepare_cached(
            "INSERT OR IGNORE INTO message_parts (msg_id, part_index, part_text)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(|e| Error::Database(format!("failed to prepare part insert: {e}")))?;

    for (index, part) in parts.iter().enumerate() {
        let text = normalize_opt(Some(part))?;
        stmt.execute(params![node_id.as_str(), index as i64, text])
            .map_err(|e| {
                Error::Database(format!("failed to insert part {index} of {node_id}: {e}"))
            })?;
    }

    Ok(parts.len())
}

fn link_parents(
    tx: &Transaction<'_>,
    conversation_id: ConversationId,
    archive: &Archive,
) -> Result<()> {
    let mut stmt = tx
        .prepare_cached(
            "UPDATE conversation_nodes SET parent_id = ?1
             WHERE node_id = ?2 AND conversation_id = ?3 AND parent_id IS NULL",
        )
        .map_err(|e| Error::Database(format!("failed to prepare parent link: {e}")))?;

    for (node_id, node) in &archive.mapping {
        let Some(parent_id) = &node.parent else {
            continue;
        };
        stmt.execute(params![
            parent_id.as_str(),
            node_id.as_str(),
            conversation_id.get()
        ])
        .map_err(|e| {
            Error::Database(format!("failed to link node {node_id} to parent {parent_id}: {e}"))
        })?;
    }

    Ok(())
}

/// Reports the first node of this conversation whose parent id has no row.
///
/// Under deferred checks SQLite would only fail at commit with a generic
/// message, and a dry run never commits at all.
fn ensure_parents_exist(tx: &Transaction<'_>, conversation_id: ConversationId) -> Result<()> {
    let dangling = tx
        .query_row(
            "SELECT n.node_id, n.parent_id
             FROM conversation_nodes n
             LEFT JOIN conversation_nodes p ON p.node_id = n.parent_id
             WHERE n.conversation_id = ?1
               AND n.parent_id IS NOT NULL
               AND p.node_id IS NULL
             LIMIT 1",
            params![conversation_id.get()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to check parent links: {e}")))?;

    match dangling {
        Some((node_id, parent_id)) => Err(Error::Archive(format!(
            "node {node_id} references missing parent {parent_id}"
        ))),
        None => Ok(()),
    }
}
