//! Note store using SQLite
//!
//! Source of truth for notes and their embeddings. Embeddings are stored as
//! BLOBs of little-endian f32; the full-text index shares the same file and
//! is written inside the same savepoint as the row it mirrors.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;

use super::lexical::LexicalIndex;
use crate::core::note::{from_micros, split_tags, to_micros, Note, NoteFilter, NoteId, Scope};
use crate::error::{BrainError, Result};

const NOTE_COLUMNS: &str = "n.id, n.parent_id, n.body, n.ts, n.tags, n.favorite, n.embedding IS NOT NULL";
const DIMENSION_KEY: &str = "dimension";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection to the note database. Owned by a single worker.
pub struct NoteStore {
    conn: Connection,
}

/// Insert payload
#[derive(Debug, Clone)]
pub struct NewNote<'a> {
    pub parent_id: Option<NoteId>,
    pub body: &'a str,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub embedding: Option<&'a [f32]>,
}

impl<'a> NewNote<'a> {
    pub fn new(body: &'a str, tags: &str) -> Self {
        Self {
            parent_id: None,
            body,
            tags: split_tags(tags),
            timestamp: Utc::now(),
            embedding: None,
        }
    }
}

/// Export record (no embedding)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedNote {
    pub id: NoteId,
    pub parent_id: Option<NoteId>,
    pub timestamp: DateTime<Utc>,
    pub body: String,
    pub tags: Vec<String>,
    pub favorite: bool,
}

impl From<Note> for ExportedNote {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            parent_id: note.parent_id,
            timestamp: note.timestamp,
            body: note.body,
            tags: note.tags,
            favorite: note.favorite,
        }
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub note_count: usize,
    pub embedding_count: usize,
    pub favorite_count: usize,
    pub last_modified: Option<DateTime<Utc>>,
    pub dimension: Option<usize>,
}

impl NoteStore {
    /// Open or create database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER,
                body TEXT NOT NULL,
                ts INTEGER NOT NULL,      -- unix micros
                tags TEXT NOT NULL DEFAULT '',
                favorite INTEGER NOT NULL DEFAULT 0,
                embedding BLOB
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
                body,
                tokenize = 'unicode61'
            );

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_notes_ts ON notes(ts);
            CREATE INDEX IF NOT EXISTS idx_notes_parent ON notes(parent_id);
            "#,
        )?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Outer transaction for a write spanning store and vector index
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub fn lexical(&self) -> LexicalIndex<'_> {
        LexicalIndex::new(&self.conn)
    }

    /// Run `f` inside a savepoint; nests under an open transaction.
    fn atomically<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute_batch("SAVEPOINT note_write")?;
        match f() {
            Ok(value) => {
                self.conn.execute_batch("RELEASE note_write")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO note_write; RELEASE note_write")
                {
                    tracing::error!(error = %rollback, "Failed to roll back note write");
                }
                Err(err)
            }
        }
    }

    /// Insert a note and index it. Returns the new id.
    pub fn insert(&self, note: &NewNote<'_>) -> Result<NoteId> {
        if note.body.trim().is_empty() {
            return Err(BrainError::Validation("note body is empty".into()));
        }
        self.atomically(|| {
            self.conn.execute(
                r#"
                INSERT INTO notes (parent_id, body, ts, tags, favorite, embedding)
                VALUES (?1, ?2, ?3, ?4, 0, ?5)
                "#,
                params![
                    note.parent_id,
                    note.body,
                    to_micros(note.timestamp),
                    note.tags.join(","),
                    note.embedding.map(embedding_to_blob),
                ],
            )?;
            let id = self.conn.last_insert_rowid();
            self.lexical().index(id, note.body)?;
            Ok(id)
        })
    }

    /// Replace body, tags and embedding. The timestamp never moves backwards.
    pub fn update(
        &self,
        id: NoteId,
        body: &str,
        tags: &[String],
        timestamp: DateTime<Utc>,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        if body.trim().is_empty() {
            return Err(BrainError::Validation("note body is empty".into()));
        }
        self.atomically(|| {
            let changed = self.conn.execute(
                r#"
                UPDATE notes
                SET body = ?2, tags = ?3, ts = MAX(ts, ?4), embedding = ?5
                WHERE id = ?1
                "#,
                params![
                    id,
                    body,
                    tags.join(","),
                    to_micros(timestamp),
                    embedding.map(embedding_to_blob),
                ],
            )?;
            if changed == 0 {
                return Err(BrainError::NotFound(id));
            }
            self.lexical().reindex(id, body)?;
            Ok(())
        })
    }

    /// Delete note by ID. Returns false if it did not exist.
    pub fn delete(&self, id: NoteId) -> Result<bool> {
        self.atomically(|| {
            let removed = self
                .conn
                .execute("DELETE FROM notes WHERE id = ?1", params![id])?;
            if removed == 0 {
                return Ok(false);
            }
            self.lexical().remove(id)?;
            Ok(true)
        })
    }

    /// Get note by ID
    pub fn get(&self, id: NoteId) -> Result<Option<Note>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = ?1");
        let note = self.conn.query_row(&sql, params![id], row_to_note).optional()?;
        Ok(note)
    }

    /// Fetch several notes at once; missing ids are simply absent from the map.
    pub fn get_many(&self, ids: &[NoteId]) -> Result<HashMap<NoteId, Note>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id IN ({placeholders})");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_note)?;

        let mut notes = HashMap::with_capacity(ids.len());
        for row in rows {
            let note = row?;
            notes.insert(note.id, note);
        }
        Ok(notes)
    }

    /// Notes matching `filter`, newest first (ties: larger id first)
    pub fn list(&self, filter: &NoteFilter, limit: Option<usize>) -> Result<Vec<Note>> {
        filter.scope.range.validate()?;

        let mut values = Vec::new();
        let mut conditions = String::new();
        if let Some(needle) = filter.needle() {
            conditions.push_str(" AND instr(lower(n.body), ?) > 0");
            values.push(Value::Text(needle));
        }
        conditions.push_str(&scope_clause(&filter.scope, &mut values));
        values.push(Value::Integer(limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))));

        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes n WHERE 1 = 1{conditions} ORDER BY n.ts DESC, n.id DESC LIMIT ?"
        );
        self.query_notes(&sql, values)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<Note>> {
        self.list(&NoteFilter::default(), Some(limit))
    }

    pub fn favorites(&self) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes n WHERE n.favorite = 1 ORDER BY n.ts DESC, n.id DESC"
        );
        self.query_notes(&sql, Vec::new())
    }

    fn query_notes(&self, sql: &str, values: Vec<Value>) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(values), row_to_note)?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Flip the favorite flag, returning the new value
    pub fn toggle_favorite(&self, id: NoteId) -> Result<bool> {
        let favorite: Option<bool> = self
            .conn
            .query_row(
                "UPDATE notes SET favorite = 1 - favorite WHERE id = ?1 RETURNING favorite",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        favorite.ok_or(BrainError::NotFound(id))
    }

    #[cfg(test)]
    fn embedding(&self, id: NoteId) -> Result<Option<Vec<f32>>> {
        let blob: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT embedding FROM notes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.flatten().map(|b| blob_to_embedding(&b)))
    }

    /// Every stored embedding, for bulk-loading the vector index
    pub fn embedded_rows(&self) -> Result<Vec<(NoteId, Vec<f32>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding FROM notes WHERE embedding IS NOT NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(1)?;
            Ok((row.get::<_, NoteId>(0)?, blob_to_embedding(&blob)))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// All notes, oldest first
    pub fn export(&self) -> Result<Vec<ExportedNote>> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n ORDER BY n.ts ASC, n.id ASC");
        Ok(self
            .query_notes(&sql, Vec::new())?
            .into_iter()
            .map(ExportedNote::from)
            .collect())
    }

    /// Consistent binary copy of the database file
    pub fn backup(&self, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Err(BrainError::Validation(format!(
                "backup target already exists: {}",
                dest.display()
            )));
        }
        self.conn
            .execute("VACUUM INTO ?1", params![dest.to_string_lossy().into_owned()])?;
        Ok(())
    }

    /// Fixed embedding dimensionality, if any note was ever embedded
    pub fn dimension(&self) -> Result<Option<usize>> {
        Ok(self
            .get_meta(DIMENSION_KEY)?
            .and_then(|v| v.parse::<usize>().ok()))
    }

    /// Record the dimensionality. Set once; a different value is rejected.
    pub fn bind_dimension(&self, dim: usize) -> Result<()> {
        match self.dimension()? {
            Some(existing) if existing != dim => Err(BrainError::DimensionMismatch {
                expected: existing,
                actual: dim,
            }),
            Some(_) => Ok(()),
            None => self.set_meta(DIMENSION_KEY, &dim.to_string()),
        }
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let (note_count, embedding_count, favorite_count, last): (i64, i64, i64, Option<i64>) =
            self.conn.query_row(
                r#"
                SELECT COUNT(*),
                       COUNT(embedding),
                       COALESCE(SUM(favorite), 0),
                       MAX(ts)
                FROM notes
                "#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(StoreStats {
            note_count: note_count as usize,
            embedding_count: embedding_count as usize,
            favorite_count: favorite_count as usize,
            last_modified: last.map(from_micros),
            dimension: self.dimension()?,
        })
    }

    /// Set store metadata
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Get store metadata
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

/// `AND ...` predicates for a scope over the `notes n` alias, appending bind values.
pub(crate) fn scope_clause(scope: &Scope, values: &mut Vec<Value>) -> String {
    let mut sql = String::new();
    for tag in &scope.tags {
        sql.push_str(" AND instr(lower(n.tags), ?) > 0");
        values.push(Value::Text(tag.to_lowercase()));
    }
    if let Some(start) = scope.range.start {
        sql.push_str(" AND n.ts >= ?");
        values.push(Value::Integer(to_micros(start)));
    }
    if let Some(end) = scope.range.end {
        sql.push_str(" AND n.ts <= ?");
        values.push(Value::Integer(to_micros(end)));
    }
    sql
}

fn row_to_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let tags: String = row.get(4)?;
    Ok(Note {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        body: row.get(2)?,
        timestamp: from_micros(row.get(3)?),
        tags: split_tags(&tags),
        favorite: row.get(5)?,
        embedded: row.get(6)?,
    })
}

/// Convert f32 embedding to BLOB
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 embedding; a trailing partial float is dropped.
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::TimeRange;
    use chrono::TimeZone;

    fn at(store: &NoteStore, body: &str, tags: &str, day: u32) -> Result<NoteId> {
        let mut note = NewNote::new(body, tags);
        note.timestamp = Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap();
        store.insert(&note)
    }

    #[test]
    fn test_blob_conversion() {
        let embedding = vec![1.0, 2.0, 3.0, -0.5];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob), embedding);
    }

    #[test]
    fn test_insert_get_roundtrip() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let mut note = NewNote::new("The quick brown fox", "Animals, demo");
        let vector = [0.5f32, 0.25];
        note.embedding = Some(&vector);

        let id = store.insert(&note)?;
        let got = store.get(id)?.expect("note exists");

        assert_eq!(got.body, "The quick brown fox");
        assert_eq!(got.tags, vec!["animals", "demo"]);
        assert!(got.embedded);
        assert!(!got.favorite);
        assert_eq!(store.embedding(id)?, Some(vector.to_vec()));
        Ok(())
    }

    #[test]
    fn test_rejects_empty_body() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let err = store.insert(&NewNote::new("   ", "")).unwrap_err();
        assert!(matches!(err, BrainError::Validation(_)));
        assert_eq!(store.get_stats()?.note_count, 0);
        Ok(())
    }

    #[test]
    fn test_list_orders_newest_first() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let t1 = at(&store, "first", "", 1)?;
        let t3 = at(&store, "third", "", 3)?;
        let t2 = at(&store, "second", "", 2)?;

        let ids: Vec<NoteId> = store
            .list(&NoteFilter::default(), None)?
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![t3, t2, t1]);
        assert_eq!(store.recent(2)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_filter_text_tags_and_range() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let fox = at(&store, "The quick brown fox", "animals,demo", 5)?;
        at(&store, "Quarterly planning", "work", 10)?;

        let by_text = store.list(&NoteFilter::text("FOX"), None)?;
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].id, fox);

        let filter = NoteFilter {
            text: None,
            scope: Scope::new(&["ANIM".to_string(), "dem".to_string()], TimeRange::default()),
        };
        assert_eq!(store.list(&filter, None)?.len(), 1);

        let range = TimeRange::new(
            Some(Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()),
        )?;
        let ranged = store.list(
            &NoteFilter {
                text: None,
                scope: Scope::new(&[], range),
            },
            None,
        )?;
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].body, "Quarterly planning");
        Ok(())
    }

    #[test]
    fn test_update_keeps_lexical_in_sync() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let id = at(&store, "The quick brown fox", "animals", 5)?;

        let earlier = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        store.update(id, "The slow brown fox", &["animals".to_string()], earlier, None)?;

        let note = store.get(id)?.expect("note exists");
        assert_eq!(note.body, "The slow brown fox");
        assert_eq!(note.timestamp, Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap());

        let lexical = store.lexical();
        assert!(lexical.search("quick", &Scope::default(), 5)?.is_empty());
        assert_eq!(lexical.search("slow", &Scope::default(), 5)?.len(), 1);
        assert_eq!(lexical.divergence()?, 0);
        Ok(())
    }

    #[test]
    fn test_update_missing_is_not_found() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let err = store.update(42, "body", &[], Utc::now(), None).unwrap_err();
        assert!(matches!(err, BrainError::NotFound(42)));
        assert_eq!(store.lexical().count()?, 0);
        Ok(())
    }

    #[test]
    fn test_delete_and_ids_not_reused() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let a = store.insert(&NewNote::new("alpha", ""))?;
        let b = store.insert(&NewNote::new("beta", ""))?;

        assert!(store.delete(b)?);
        assert!(!store.delete(b)?);
        assert!(store.get(b)?.is_none());
        assert_eq!(store.lexical().count()?, 1);

        let c = store.insert(&NewNote::new("gamma", ""))?;
        assert!(c > b && b > a);
        Ok(())
    }

    #[test]
    fn test_favorites() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        let id = store.insert(&NewNote::new("keep me", ""))?;

        assert!(store.toggle_favorite(id)?);
        assert_eq!(store.favorites()?.len(), 1);
        assert!(!store.toggle_favorite(id)?);
        assert!(store.favorites()?.is_empty());
        assert!(matches!(store.toggle_favorite(999), Err(BrainError::NotFound(999))));
        Ok(())
    }

    #[test]
    fn test_dimension_binds_once() -> Result<()> {
        let store = NoteStore::open_in_memory()?;
        assert_eq!(store.dimension()?, None);

        store.bind_dimension(384)?;
        store.bind_dimension(384)?;
        assert!(matches!(
            store.bind_dimension(3),
            Err(BrainError::DimensionMismatch { expected: 384, actual: 3 })
        ));
        assert_eq!(store.get_stats()?.dimension, Some(384));
        Ok(())
    }

    #[test]
    fn test_export_and_backup() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = NoteStore::open(&tmp.path().join("notes.db"))?;
        let id = store.insert(&NewNote::new("exported", "a,b"))?;

        let exported = store.export()?;
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].id, id);
        assert_eq!(exported[0].tags, vec!["a", "b"]);

        let copy = tmp.path().join("copy.db");
        store.backup(&copy)?;
        let restored = NoteStore::open(&copy)?;
        assert_eq!(restored.get(id)?.map(|n| n.body), Some("exported".to_string()));
        assert!(store.backup(&copy).is_err());
        Ok(())
    }
}
