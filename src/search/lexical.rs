//! Full-text index over normalized note bodies (SQLite FTS5)
//!
//! The index lives in the same database file as the notes table and is only
//! written through [`LexicalIndex`], always inside the store's savepoint for
//! the note being written. Rows hold the *normalized* body so token
//! boundaries match what the embedder sees; the raw body stays in `notes`.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use super::store::scope_clause;
use crate::core::normalize::{normalize, tokens};
use crate::core::note::{NoteId, Scope};
use crate::error::Result;

pub struct LexicalIndex<'a> {
    conn: &'a Connection,
}

impl<'a> LexicalIndex<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn index(&self, id: NoteId, body: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO notes_fts (rowid, body) VALUES (?1, ?2)",
            params![id, normalize(body)],
        )?;
        Ok(())
    }

    pub fn reindex(&self, id: NoteId, new_body: &str) -> Result<()> {
        self.remove(id)?;
        self.index(id, new_body)
    }

    pub fn remove(&self, id: NoteId) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM notes_fts WHERE rowid = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Ranked ids for an already-normalized query, best first.
    ///
    /// Score is the negated FTS5 bm25 value, so larger means more relevant.
    /// Scope predicates are part of the same statement: rows outside the
    /// scope never appear, regardless of rank.
    pub fn search(&self, query: &str, scope: &Scope, limit: usize) -> Result<Vec<(NoteId, f32)>> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut values = vec![Value::Text(expr)];
        let scope_sql = scope_clause(scope, &mut values);
        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

        let sql = format!(
            r#"
            SELECT n.id, bm25(notes_fts) AS score
            FROM notes_fts
            JOIN notes n ON n.id = notes_fts.rowid
            WHERE notes_fts MATCH ?{scope_sql}
            ORDER BY score, n.id
            LIMIT ?
            "#
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| {
            let id: NoteId = row.get(0)?;
            let bm25: f64 = row.get(1)?;
            Ok((id, -bm25 as f32))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes_fts", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Number of ids present on only one side of notes / notes_fts
    pub fn divergence(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM notes WHERE id NOT IN (SELECT rowid FROM notes_fts))
              + (SELECT COUNT(*) FROM notes_fts WHERE rowid NOT IN (SELECT id FROM notes))
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Drop every row and re-index all notes. Caller provides the transaction.
    pub fn rebuild(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM notes_fts", [])?;

        let mut stmt = self.conn.prepare("SELECT id, body FROM notes")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, NoteId>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut count = 0;
        for row in rows {
            let (id, body) = row?;
            self.index(id, &body)?;
            count += 1;
        }
        Ok(count)
    }
}

/// FTS5 MATCH expression: every token quoted, OR-combined.
///
/// Quoting keeps FTS5 operators and column filters in user text inert.
pub fn match_expression(normalized: &str) -> Option<String> {
    let terms: Vec<String> = tokens(normalized)
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
