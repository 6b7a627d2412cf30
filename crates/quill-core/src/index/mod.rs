//! Local note index.
//!
//! Maintains the synced notes, their derived term postings, and the sync
//! checkpoint in a single `SQLite` database. Deltas are applied under the
//! USN-monotonic rule: a change whose USN is not greater than the stored
//! note's USN is silently skipped, which makes replay after a crash safe.
//! The checkpoint is committed in the same transaction as the batch of
//! changes it represents.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for counts

mod migrations;
mod tokenizer;

pub use tokenizer::{normalize_term, tokenize};

use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::models::{Note, NoteChange, NoteId, Usn};

const CHECKPOINT_KEY: &str = "sync_checkpoint";
const BUSY_TIMEOUT: Duration = Duration::from_secs(3);

/// SQLite-backed store of notes, index entries, and the sync checkpoint.
pub struct LocalIndex {
    conn: Connection,
}

impl LocalIndex {
    /// Open (or create) the index under the configured data directory.
    pub fn open(config: &DataConfig) -> Result<Self> {
        Self::open_with_busy_timeout(config, BUSY_TIMEOUT)
    }

    /// Open with an explicit busy timeout; a held write lock elsewhere
    /// surfaces as [`Error::IndexBusy`] once the timeout elapses.
    pub fn open_with_busy_timeout(config: &DataConfig, busy_timeout: Duration) -> Result<Self> {
        config.ensure_data_dir()?;
        let conn = Connection::open(config.index_path())?;
        Self::from_connection(conn, busy_timeout)
    }

    /// Open an in-memory index (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, BUSY_TIMEOUT)
    }

    fn from_connection(mut conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        // WAL for concurrent readers; ignore failure on in-memory databases
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(())).ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&mut conn)?;
        Ok(Self { conn })
    }

    /// Apply a single change; returns whether it was applied (vs skipped).
    pub fn apply_change(&mut self, change: &NoteChange) -> Result<bool> {
        Ok(self.apply_batch(std::slice::from_ref(change))? == 1)
    }

    /// Apply a batch of changes and advance the checkpoint atomically.
    ///
    /// Returns the number of changes actually applied; stale or redelivered
    /// changes (USN <= stored) are counted as skipped.
    pub fn apply_batch(&mut self, changes: &[NoteChange]) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut applied = 0;
        let mut highest = checkpoint_in_tx(&tx)?;

        for change in changes {
            if apply_change_in_tx(&tx, change)? {
                applied += 1;
            }
            highest = highest.max(change.usn());
        }

        set_checkpoint_in_tx(&tx, highest)?;
        tx.commit()?;

        tracing::debug!(applied, skipped = changes.len() - applied, checkpoint = highest, "Applied delta batch");
        Ok(applied)
    }

    /// Highest USN successfully applied; 0 before the first sync.
    pub fn checkpoint(&self) -> Result<Usn> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![CHECKPOINT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::IndexCorrupt(format!("invalid checkpoint value: {raw}"))),
            None => Ok(0),
        }
    }

    /// Fetch a note by ID; tombstoned notes are reported as not found.
    pub fn get_note(&self, id: &NoteId) -> Result<Note> {
        let note = self
            .conn
            .query_row(
                "SELECT id, title, body, created_at, updated_at, usn
                 FROM notes
                 WHERE id = ? AND is_deleted = 0",
                params![id.as_str()],
                parse_note,
            )
            .optional()?;

        match note {
            Some(mut note) => {
                note.tags = self.tags_for(&note.id)?;
                Ok(note)
            }
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    /// All live notes, most recently modified first.
    pub fn all_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, body, created_at, updated_at, usn
             FROM notes
             WHERE is_deleted = 0
             ORDER BY updated_at DESC, id ASC",
        )?;

        let mut notes = stmt
            .query_map([], parse_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for note in &mut notes {
            note.tags = self.tags_for(&note.id)?;
        }
        Ok(notes)
    }

    /// Term postings: (note id, term frequency) for every live note
    /// containing the term.
    pub fn postings(&self, term: &str) -> Result<Vec<(NoteId, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.note_id, e.term_count
             FROM index_entries e
             JOIN notes n ON n.id = e.note_id
             WHERE e.term = ? AND n.is_deleted = 0",
        )?;

        let postings = stmt
            .query_map(params![term], |row| {
                let id: String = row.get(0)?;
                Ok((NoteId::from(id.as_str()), row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(postings)
    }

    /// Tags across live notes with their note counts, most used first.
    pub fn list_tags(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.tag, COUNT(t.note_id) AS count
             FROM note_tags t
             JOIN notes n ON n.id = t.note_id
             WHERE n.is_deleted = 0
             GROUP BY t.tag
             ORDER BY count DESC, t.tag ASC",
        )?;

        let tags = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tags)
    }

    fn tags_for(&self, id: &NoteId) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM note_tags WHERE note_id = ? ORDER BY tag ASC")?;

        let tags = stmt
            .query_map(params![id.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tags)
    }
}

fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    let id: String = row.get(0)?;
    Ok(Note {
        id: NoteId::from(id.as_str()),
        title: row.get(1)?,
        body: row.get(2)?,
        tags: Vec::new(),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        usn: row.get(5)?,
    })
}

fn stored_usn(tx: &Transaction<'_>, id: &NoteId) -> Result<Option<Usn>> {
    let usn = tx
        .query_row(
            "SELECT usn FROM notes WHERE id = ?",
            params![id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(usn)
}

fn apply_change_in_tx(tx: &Transaction<'_>, change: &NoteChange) -> Result<bool> {
    let stored = stored_usn(tx, change.id())?;
    if stored.is_some_and(|usn| change.usn() <= usn) {
        tracing::trace!(id = %change.id(), usn = change.usn(), "Skipping stale delta");
        return Ok(false);
    }

    match change {
        NoteChange::Upsert { note } => {
            let mut note = note.clone();
            note.normalize_tags();

            tx.execute(
                "INSERT INTO notes (id, title, body, created_at, updated_at, usn, is_deleted)
                 VALUES (?, ?, ?, ?, ?, ?, 0)
                 ON CONFLICT(id) DO UPDATE SET
                     title = excluded.title,
                     body = excluded.body,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     usn = excluded.usn,
                     is_deleted = 0",
                params![
                    note.id.as_str(),
                    note.title,
                    note.body,
                    note.created_at,
                    note.updated_at,
                    note.usn
                ],
            )?;

            rebuild_tags(tx, &note)?;
            rebuild_index_entries(tx, &note)?;
        }
        NoteChange::Delete { id, usn } => {
            // Keep a blanked tombstone row so the USN guard survives deletion
            tx.execute(
                "INSERT INTO notes (id, title, body, created_at, updated_at, usn, is_deleted)
                 VALUES (?, '', '', 0, 0, ?, 1)
                 ON CONFLICT(id) DO UPDATE SET
                     title = '',
                     body = '',
                     usn = excluded.usn,
                     is_deleted = 1",
                params![id.as_str(), usn],
            )?;
            tx.execute(
                "DELETE FROM note_tags WHERE note_id = ?",
                params![id.as_str()],
            )?;
            tx.execute(
                "DELETE FROM index_entries WHERE note_id = ?",
                params![id.as_str()],
            )?;
        }
    }

    Ok(true)
}

fn rebuild_tags(tx: &Transaction<'_>, note: &Note) -> Result<()> {
    tx.execute(
        "DELETE FROM note_tags WHERE note_id = ?",
        params![note.id.as_str()],
    )?;
    for tag in &note.tags {
        tx.execute(
            "INSERT OR IGNORE INTO note_tags (note_id, tag) VALUES (?, ?)",
            params![note.id.as_str(), tag],
        )?;
    }
    Ok(())
}

fn rebuild_index_entries(tx: &Transaction<'_>, note: &Note) -> Result<()> {
    tx.execute(
        "DELETE FROM index_entries WHERE note_id = ?",
        params![note.id.as_str()],
    )?;

    let text = format!("{}\n{}", note.title, note.body);
    for (term, positions) in tokenize(&text) {
        tx.execute(
            "INSERT INTO index_entries (note_id, term, positions, term_count)
             VALUES (?, ?, ?, ?)",
            params![
                note.id.as_str(),
                term,
                serde_json::to_string(&positions)?,
                positions.len() as i64
            ],
        )?;
    }
    Ok(())
}

fn checkpoint_in_tx(tx: &Transaction<'_>) -> Result<Usn> {
    let value: Option<String> = tx
        .query_row(
            "SELECT value FROM meta WHERE key = ?",
            params![CHECKPOINT_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::IndexCorrupt(format!("invalid checkpoint value: {raw}"))),
        None => Ok(0),
    }
}

fn set_checkpoint_in_tx(tx: &Transaction<'_>, checkpoint: Usn) -> Result<()> {
    tx.execute(
        "INSERT INTO meta (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![CHECKPOINT_KEY, checkpoint.to_string()],
    )?;
    Ok(())
}
