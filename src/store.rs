//! Persistent relational + full-text store.
//!
//! A single SQLite database under `<root>/.codex/index.db` holds the File,
//! Symbol, Edge, FileDep and Ranking tables described by the data model,
//! plus an FTS5 projection over symbol text columns kept in sync by
//! triggers. All multi-statement mutations run inside a transaction; the
//! handle is not thread-safe and is meant to be owned by exactly one
//! scheduler (the indexer, the watcher, or the tool-protocol server, never
//! more than one at a time).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// One row of the File entity.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: i64,
    pub path: String,
    pub language: Option<String>,
    pub digest: String,
    pub line_count: i64,
    pub indexed_at: i64,
}

/// One row of the Symbol entity.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub body: Option<String>,
    pub exported: bool,
}

/// A Symbol joined with the path of its owning file; the shape most query
/// operators actually return.
#[derive(Debug, Clone)]
pub struct SymbolWithFile {
    pub symbol: SymbolRow,
    pub file_path: String,
    pub rank: f64,
}

/// A single raw Edge row.
#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub from_symbol_id: i64,
    pub to_symbol_id: i64,
    pub kind: String,
}

/// A single raw FileDep row.
#[derive(Debug, Clone)]
pub struct FileDepRow {
    pub from_file_id: i64,
    pub to_file_id: i64,
    pub kind: String,
    pub name: String,
}

/// A search hit: a Symbol plus its highlighted content snippet.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub symbol: SymbolRow,
    pub file_path: String,
    pub rank: f64,
    pub snippet: String,
}

/// One symbol awaiting insertion as part of an atomic per-file replace.
#[derive(Debug, Clone)]
pub struct NewSymbol<'a> {
    pub name: &'a str,
    pub qualified_name: Option<&'a str>,
    pub kind: &'a str,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: Option<&'a str>,
    pub docstring: Option<&'a str>,
    pub body: Option<&'a str>,
    pub exported: bool,
}

/// An intra-file call site, resolved against the name table built from
/// `NewSymbol`s inserted in the same transaction.
#[derive(Debug, Clone, Copy)]
pub struct NewCall<'a> {
    pub caller_name: &'a str,
    pub called_name: &'a str,
}

/// A resolved import target (a relative path already run through the
/// resolver) plus the identifier names bound from it.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedImport<'a> {
    pub target_path: &'a str,
    pub names: &'a [String],
}

/// One FileDep that was actually recorded, with the target resolved to an
/// id so the caller can look up which of its exported symbols to draw
/// `references` edges toward.
#[derive(Debug, Clone)]
pub struct FileDepResult {
    pub target_file_id: i64,
    pub names: Vec<String>,
}

/// Outcome of [`Store::index_file`].
#[derive(Debug, Clone, Default)]
pub struct FileIndexResult {
    pub file_id: i64,
    pub changed: bool,
    /// Name/qualified-name -> symbol id, for this file's own symbols.
    pub name_table: HashMap<String, i64>,
    pub file_deps: Vec<FileDepResult>,
}

const SYMBOL_KINDS_RANKABLE: &[&str] = &["function", "class", "method", "interface", "type"];

#[derive(Debug)]
pub struct Store {
    conn: RefCell<Connection>,
    db_path: PathBuf,
}

impl Store {
    /// Open (or create) the store at `<root>/.codex/index.db`.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(crate::STATE_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating state directory {}", dir.display()))?;
        let db_path = dir.join(crate::DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening store at {}", db_path.display()))?;
        let store = Self {
            conn: RefCell::new(conn),
            db_path,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: RefCell::new(conn),
            db_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.borrow();
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -65536;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                language TEXT,
                digest TEXT NOT NULL,
                line_count INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS symbols (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                qualified_name TEXT,
                kind TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                signature TEXT,
                docstring TEXT,
                body TEXT,
                exported INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS symbols_file_idx ON symbols(file_id);
            CREATE INDEX IF NOT EXISTS symbols_name_idx ON symbols(name);
            CREATE INDEX IF NOT EXISTS symbols_qualified_name_idx ON symbols(qualified_name);

            CREATE TABLE IF NOT EXISTS edges (
                from_symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                to_symbol_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                UNIQUE(from_symbol_id, to_symbol_id, kind)
            );
            CREATE INDEX IF NOT EXISTS edges_from_idx ON edges(from_symbol_id);
            CREATE INDEX IF NOT EXISTS edges_to_idx ON edges(to_symbol_id);

            CREATE TABLE IF NOT EXISTS file_deps (
                from_file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                to_file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                UNIQUE(from_file_id, to_file_id, kind, name)
            );
            CREATE INDEX IF NOT EXISTS file_deps_from_idx ON file_deps(from_file_id);
            CREATE INDEX IF NOT EXISTS file_deps_to_idx ON file_deps(to_file_id);

            CREATE TABLE IF NOT EXISTS rankings (
                symbol_id INTEGER PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
                rank REAL NOT NULL,
                in_degree INTEGER NOT NULL,
                out_degree INTEGER NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
                name,
                qualified_name,
                signature,
                docstring,
                content,
                content=symbols,
                content_rowid=id,
                tokenize='porter unicode61'
            );

            CREATE TRIGGER IF NOT EXISTS symbols_ai AFTER INSERT ON symbols BEGIN
                INSERT INTO symbols_fts(rowid, name, qualified_name, signature, docstring, content)
                VALUES (new.id, new.name, new.qualified_name, new.signature, new.docstring, new.body);
            END;
            CREATE TRIGGER IF NOT EXISTS symbols_ad AFTER DELETE ON symbols BEGIN
                INSERT INTO symbols_fts(symbols_fts, rowid, name, qualified_name, signature, docstring, content)
                VALUES ('delete', old.id, old.name, old.qualified_name, old.signature, old.docstring, old.body);
            END;
            CREATE TRIGGER IF NOT EXISTS symbols_au AFTER UPDATE ON symbols BEGIN
                INSERT INTO symbols_fts(symbols_fts, rowid, name, qualified_name, signature, docstring, content)
                VALUES ('delete', old.id, old.name, old.qualified_name, old.signature, old.docstring, old.body);
                INSERT INTO symbols_fts(rowid, name, qualified_name, signature, docstring, content)
                VALUES (new.id, new.name, new.qualified_name, new.signature, new.docstring, new.body);
            END;
            "#,
        )?;
        Ok(())
    }

    // ---- mutation: files ------------------------------------------------

    /// Insert or update a file row. Returns `(file_id, changed)`, where
    /// `changed` is false when a row already existed with the same digest.
    pub fn upsert_file(
        &self,
        path: &str,
        language: Option<&str>,
        digest: &str,
        line_count: i64,
    ) -> Result<(i64, bool)> {
        let conn = self.conn.borrow();
        let existing: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, digest FROM files WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, old_digest)) = existing {
            if old_digest == digest {
                return Ok((id, false));
            }
            conn.execute(
                "UPDATE files SET language = ?2, digest = ?3, line_count = ?4, indexed_at = ?5 WHERE id = ?1",
                params![id, language, digest, line_count, now_unix()],
            )?;
            return Ok((id, true));
        }

        conn.execute(
            "INSERT INTO files(path, language, digest, line_count, indexed_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![path, language, digest, line_count, now_unix()],
        )?;
        Ok((conn.last_insert_rowid(), true))
    }

    pub fn file_id_for_path(&self, path: &str) -> Result<Option<i64>> {
        let conn = self.conn.borrow();
        let id = conn
            .query_row("SELECT id FROM files WHERE path = ?1", params![path], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(id)
    }

    pub fn file_by_path(&self, path: &str) -> Result<Option<FileRow>> {
        let conn = self.conn.borrow();
        let row = conn
            .query_row(
                "SELECT id, path, language, digest, line_count, indexed_at FROM files WHERE path = ?1",
                params![path],
                file_row_from,
            )
            .optional()?;
        Ok(row)
    }

    pub fn all_files(&self) -> Result<Vec<FileRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT id, path, language, digest, line_count, indexed_at FROM files ORDER BY path",
        )?;
        let rows = stmt
            .query_map([], file_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete rankings, edges, symbols rooted at `file_id`, and outgoing
    /// file-deps from it, per the documented ordering. Does not touch the
    /// file row itself.
    pub fn clear_file_data(&self, file_id: i64) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        clear_file_data_tx(&tx, file_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Atomically replace a file's row, symbols and intra-file `calls`
    /// edges: clears whatever the file previously owned, inserts the new
    /// symbols and call edges, and writes the `files` row (digest,
    /// language, line count) last, mirroring the teacher's
    /// `save_file_index`. A no-op beyond the digest comparison when the
    /// digest is unchanged. `imports` may be empty; when given, resolved
    /// import targets that already have a file row are recorded as
    /// FileDeps in the same transaction.
    pub fn index_file(
        &self,
        path: &str,
        language: Option<&str>,
        digest: &str,
        line_count: i64,
        symbols: &[NewSymbol],
        calls: &[NewCall],
        imports: &[ResolvedImport],
    ) -> Result<FileIndexResult> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, digest FROM files WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, old_digest)) = &existing {
            if old_digest == digest {
                tx.commit()?;
                return Ok(FileIndexResult {
                    file_id: *id,
                    changed: false,
                    ..Default::default()
                });
            }
        }

        let is_update = existing.is_some();
        let file_id = match existing {
            Some((id, _)) => {
                clear_file_data_tx(&tx, id)?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO files(path, language, digest, line_count, indexed_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![path, language, digest, line_count, now_unix()],
                )?;
                tx.last_insert_rowid()
            }
        };

        let mut name_table: HashMap<String, i64> = HashMap::new();
        for symbol in symbols {
            tx.execute(
                "INSERT INTO symbols(file_id, name, qualified_name, kind, start_line, end_line, signature, docstring, body, exported)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    file_id,
                    symbol.name,
                    symbol.qualified_name,
                    symbol.kind,
                    symbol.start_line,
                    symbol.end_line,
                    symbol.signature,
                    symbol.docstring,
                    symbol.body,
                    symbol.exported as i64
                ],
            )?;
            let id = tx.last_insert_rowid();
            name_table.entry(symbol.name.to_string()).or_insert(id);
            if let Some(q) = symbol.qualified_name {
                name_table.entry(q.to_string()).or_insert(id);
            }
        }

        for call in calls {
            let (Some(&caller_id), Some(&callee_id)) =
                (name_table.get(call.caller_name), name_table.get(call.called_name))
            else {
                continue;
            };
            if caller_id != callee_id {
                tx.execute(
                    "INSERT OR IGNORE INTO edges(from_symbol_id, to_symbol_id, kind) VALUES (?1, ?2, 'calls')",
                    params![caller_id, callee_id],
                )?;
            }
        }

        let file_deps = record_file_deps_tx(&tx, file_id, imports)?;

        // The digest/metadata update happens last, after the symbols and
        // edges it describes are already in place in this transaction.
        if is_update {
            tx.execute(
                "UPDATE files SET language = ?2, digest = ?3, line_count = ?4, indexed_at = ?5 WHERE id = ?1",
                params![file_id, language, digest, line_count, now_unix()],
            )?;
        }

        tx.commit()?;
        Ok(FileIndexResult {
            file_id,
            changed: true,
            name_table,
            file_deps,
        })
    }

    /// Atomically resolve and record `file_id`'s import targets as
    /// FileDeps, skipping any whose target has no file row yet. Returns
    /// the recorded targets so the caller can emit `references` edges.
    pub fn index_file_deps(&self, file_id: i64, imports: &[ResolvedImport]) -> Result<Vec<FileDepResult>> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        let result = record_file_deps_tx(&tx, file_id, imports)?;
        tx.commit()?;
        Ok(result)
    }

    /// Delete every file not present in `valid_paths`; cascades remove the
    /// file's symbols, edges, file-deps and rankings.
    pub fn remove_stale(&self, valid_paths: &std::collections::HashSet<String>) -> Result<()> {
        let existing = self.all_files()?;
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        for file in existing {
            if !valid_paths.contains(&file.path) {
                tx.execute("DELETE FROM files WHERE id = ?1", params![file.id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn remove_file(&self, path: &str) -> Result<()> {
        self.conn
            .borrow()
            .execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(())
    }

    // ---- mutation: symbols / edges / file-deps -------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_symbol(
        &self,
        file_id: i64,
        name: &str,
        qualified_name: Option<&str>,
        kind: &str,
        start_line: i64,
        end_line: i64,
        signature: Option<&str>,
        docstring: Option<&str>,
        body: Option<&str>,
        exported: bool,
    ) -> Result<i64> {
        let conn = self.conn.borrow();
        conn.execute(
            "INSERT INTO symbols(file_id, name, qualified_name, kind, start_line, end_line, signature, docstring, body, exported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                file_id,
                name,
                qualified_name,
                kind,
                start_line,
                end_line,
                signature,
                docstring,
                body,
                exported as i64
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_edge(&self, from_symbol_id: i64, to_symbol_id: i64, kind: &str) -> Result<()> {
        if from_symbol_id == to_symbol_id {
            return Ok(());
        }
        self.conn.borrow().execute(
            "INSERT OR IGNORE INTO edges(from_symbol_id, to_symbol_id, kind) VALUES (?1, ?2, ?3)",
            params![from_symbol_id, to_symbol_id, kind],
        )?;
        Ok(())
    }

    /// All symbols of a file, keyed by name and by qualified name, used to
    /// build the in-memory cross-file resolution tables.
    pub fn symbol_name_table_for_file(&self, file_id: i64) -> Result<HashMap<String, i64>> {
        let conn = self.conn.borrow();
        let mut stmt =
            conn.prepare("SELECT id, name, qualified_name FROM symbols WHERE file_id = ?1")?;
        let mut table = HashMap::new();
        let rows = stmt.query_map(params![file_id], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let qualified_name: Option<String> = row.get(2)?;
            Ok((id, name, qualified_name))
        })?;
        for row in rows {
            let (id, name, qualified_name) = row?;
            table.entry(name).or_insert(id);
            if let Some(q) = qualified_name {
                table.entry(q).or_insert(id);
            }
        }
        Ok(table)
    }

    /// Names and ids of the exported symbols of a file, used by cross-file
    /// import resolution.
    pub fn exported_symbol_table_for_file(&self, file_id: i64) -> Result<HashMap<String, i64>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT id, name FROM symbols WHERE file_id = ?1 AND exported = 1",
        )?;
        let rows = stmt
            .query_map(params![file_id], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, i64>(0)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }

    /// All symbol ids belonging to a file, used for the importer side of
    /// the `references` edge explosion.
    pub fn symbol_ids_for_file(&self, file_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT id FROM symbols WHERE file_id = ?1")?;
        let rows = stmt
            .query_map(params![file_id], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- PageRank --------------------------------------------------------

    /// All symbol ids and all (from, to) edge pairs in the graph, for
    /// building the PageRank adjacency lists.
    pub fn full_graph(&self) -> Result<(Vec<i64>, Vec<(i64, i64)>)> {
        let conn = self.conn.borrow();
        let mut id_stmt = conn.prepare("SELECT id FROM symbols")?;
        let ids = id_stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        let mut edge_stmt = conn.prepare("SELECT from_symbol_id, to_symbol_id FROM edges")?;
        let edges = edge_stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, i64)>>>()?;

        Ok((ids, edges))
    }

    /// Replace the rankings table wholesale, in one transaction.
    pub fn replace_rankings(&self, rankings: &[(i64, f64, i64, i64)]) -> Result<()> {
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM rankings", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO rankings(symbol_id, rank, in_degree, out_degree) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (symbol_id, rank, in_degree, out_degree) in rankings {
                stmt.execute(params![symbol_id, rank, in_degree, out_degree])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ---- reads consumed by the query engine ------------------------------

    pub fn symbol_by_id(&self, id: i64) -> Result<Option<SymbolRow>> {
        let conn = self.conn.borrow();
        let row = conn
            .query_row(
                "SELECT id, file_id, name, qualified_name, kind, start_line, end_line, signature, docstring, body, exported
                 FROM symbols WHERE id = ?1",
                params![id],
                symbol_row_from,
            )
            .optional()?;
        Ok(row)
    }

    pub fn symbols_by_ids(&self, ids: &[i64]) -> Result<Vec<SymbolRow>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, file_id, name, qualified_name, kind, start_line, end_line, signature, docstring, body, exported
             FROM symbols WHERE id IN ({placeholders})"
        );
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), symbol_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Symbols matching `name` against either the `name` or `qualified_name`
    /// column, joined with their file path and rank.
    pub fn symbols_matching_name(&self, name: &str) -> Result<Vec<SymbolWithFile>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, COALESCE(r.rank, 0.0)
             FROM symbols s
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE s.name = ?1 OR s.qualified_name = ?1",
        )?;
        let rows = stmt
            .query_map(params![name], symbol_with_file_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn symbols_in_file(&self, file_id: i64) -> Result<Vec<SymbolRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, name, qualified_name, kind, start_line, end_line, signature, docstring, body, exported
             FROM symbols WHERE file_id = ?1 ORDER BY start_line",
        )?;
        let rows = stmt
            .query_map(params![file_id], symbol_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn rank_of(&self, symbol_id: i64) -> Result<f64> {
        let conn = self.conn.borrow();
        let rank = conn
            .query_row(
                "SELECT rank FROM rankings WHERE symbol_id = ?1",
                params![symbol_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(rank.unwrap_or(0.0))
    }

    /// Distinct source symbols of `calls`/`references` edges into any
    /// symbol matching `name`, ordered by source rank descending.
    pub fn callers_of(&self, name: &str) -> Result<Vec<SymbolWithFile>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, COALESCE(r.rank, 0.0)
             FROM edges e
             JOIN symbols t ON t.id = e.to_symbol_id
             JOIN symbols s ON s.id = e.from_symbol_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE (e.kind = 'calls' OR e.kind = 'references')
               AND (t.name = ?1 OR t.qualified_name = ?1)
             ORDER BY COALESCE(r.rank, 0.0) DESC",
        )?;
        let rows = stmt
            .query_map(params![name], symbol_with_file_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct target symbols of any edge out of any symbol matching
    /// `name`, ordered by target rank descending.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<SymbolWithFile>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, COALESCE(r.rank, 0.0)
             FROM edges e
             JOIN symbols o ON o.id = e.from_symbol_id
             JOIN symbols s ON s.id = e.to_symbol_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE o.name = ?1 OR o.qualified_name = ?1
             ORDER BY COALESCE(r.rank, 0.0) DESC",
        )?;
        let rows = stmt
            .query_map(params![name], symbol_with_file_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct target symbols of any edge out of a specific symbol id.
    pub fn dependencies_of_symbol(&self, symbol_id: i64) -> Result<Vec<SymbolWithFile>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, COALESCE(r.rank, 0.0)
             FROM edges e
             JOIN symbols s ON s.id = e.to_symbol_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE e.from_symbol_id = ?1
             ORDER BY COALESCE(r.rank, 0.0) DESC",
        )?;
        let rows = stmt
            .query_map(params![symbol_id], symbol_with_file_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Distinct source symbols of any edge into a specific symbol id.
    pub fn dependents_of_symbol(&self, symbol_id: i64) -> Result<Vec<SymbolWithFile>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, COALESCE(r.rank, 0.0)
             FROM edges e
             JOIN symbols s ON s.id = e.from_symbol_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE e.to_symbol_id = ?1
             ORDER BY COALESCE(r.rank, 0.0) DESC",
        )?;
        let rows = stmt
            .query_map(params![symbol_id], symbol_with_file_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Tokenized FTS search over the Symbol projection.
    pub fn search(&self, fts_query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, COALESCE(r.rank, 0.0),
                    snippet(symbols_fts, 4, '>>>', '<<<', '...', 30)
             FROM symbols_fts
             JOIN symbols s ON s.id = symbols_fts.rowid
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE symbols_fts MATCH ?1
             ORDER BY COALESCE(r.rank, 0.0) DESC, symbols_fts.rank ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok(SearchHit {
                    symbol: symbol_row_from(row)?,
                    file_path: row.get(11)?,
                    rank: row.get(12)?,
                    snippet: row.get(13)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn top_ranked(&self, top: usize) -> Result<Vec<SymbolWithFile>> {
        let placeholders = vec!["?"; SYMBOL_KINDS_RANKABLE.len()].join(", ");
        let sql = format!(
            "SELECT s.id, s.file_id, s.name, s.qualified_name, s.kind, s.start_line, s.end_line,
                    s.signature, s.docstring, s.body, s.exported, f.path, r.rank
             FROM symbols s
             JOIN files f ON f.id = s.file_id
             JOIN rankings r ON r.symbol_id = s.id
             WHERE s.kind IN ({placeholders})
             ORDER BY r.rank DESC
             LIMIT ?"
        );
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&sql)?;
        let mut args: Vec<&dyn rusqlite::ToSql> =
            SYMBOL_KINDS_RANKABLE.iter().map(|k| k as &dyn rusqlite::ToSql).collect();
        let top_i64 = top as i64;
        args.push(&top_i64);
        let rows = stmt
            .query_map(args.as_slice(), symbol_with_file_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn file_deps_from(&self, file_id: i64) -> Result<Vec<FileDepRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn
            .prepare("SELECT from_file_id, to_file_id, kind, name FROM file_deps WHERE from_file_id = ?1")?;
        let rows = stmt
            .query_map(params![file_id], file_dep_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn file_deps_to(&self, file_id: i64) -> Result<Vec<FileDepRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn
            .prepare("SELECT from_file_id, to_file_id, kind, name FROM file_deps WHERE to_file_id = ?1")?;
        let rows = stmt
            .query_map(params![file_id], file_dep_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn all_file_deps(&self) -> Result<Vec<FileDepRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT from_file_id, to_file_id, kind, name FROM file_deps")?;
        let rows = stmt
            .query_map([], file_dep_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn symbol_count_for_file(&self, file_id: i64) -> Result<i64> {
        let conn = self.conn.borrow();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM symbols WHERE file_id = ?1",
            params![file_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<(i64, i64, i64, i64)> {
        let conn = self.conn.borrow();
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        let symbols: i64 = conn.query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))?;
        let file_deps: i64 = conn.query_row("SELECT COUNT(*) FROM file_deps", [], |r| r.get(0))?;
        Ok((files, symbols, edges, file_deps))
    }

    pub fn language_histogram(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(language, 'unknown'), COUNT(*) FROM files GROUP BY language ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Checkpoints the WAL file; called on clean shutdown of the daemon.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .borrow()
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn clear_file_data_tx(tx: &rusqlite::Transaction, file_id: i64) -> rusqlite::Result<()> {
    tx.execute(
        "DELETE FROM rankings WHERE symbol_id IN (SELECT id FROM symbols WHERE file_id = ?1)",
        params![file_id],
    )?;
    tx.execute(
        "DELETE FROM edges WHERE from_symbol_id IN (SELECT id FROM symbols WHERE file_id = ?1)
            OR to_symbol_id IN (SELECT id FROM symbols WHERE file_id = ?1)",
        params![file_id],
    )?;
    tx.execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])?;
    tx.execute(
        "DELETE FROM file_deps WHERE from_file_id = ?1",
        params![file_id],
    )?;
    Ok(())
}

fn record_file_deps_tx(
    tx: &rusqlite::Transaction,
    file_id: i64,
    imports: &[ResolvedImport],
) -> rusqlite::Result<Vec<FileDepResult>> {
    let mut out = Vec::new();
    for import in imports {
        let target_file_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM files WHERE path = ?1",
                params![import.target_path],
                |r| r.get(0),
            )
            .optional()?;
        let Some(target_file_id) = target_file_id else {
            continue;
        };
        let name = if import.names.is_empty() {
            "*".to_string()
        } else {
            import.names.join(",")
        };
        tx.execute(
            "INSERT OR IGNORE INTO file_deps(from_file_id, to_file_id, kind, name) VALUES (?1, ?2, 'import', ?3)",
            params![file_id, target_file_id, name],
        )?;
        out.push(FileDepResult {
            target_file_id,
            names: import.names.to_vec(),
        });
    }
    Ok(out)
}

fn file_row_from(row: &rusqlite::Row) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        path: row.get(1)?,
        language: row.get(2)?,
        digest: row.get(3)?,
        line_count: row.get(4)?,
        indexed_at: row.get(5)?,
    })
}

fn symbol_row_from(row: &rusqlite::Row) -> rusqlite::Result<SymbolRow> {
    Ok(SymbolRow {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        kind: row.get(4)?,
        start_line: row.get(5)?,
        end_line: row.get(6)?,
        signature: row.get(7)?,
        docstring: row.get(8)?,
        body: row.get(9)?,
        exported: row.get::<_, i64>(10)? != 0,
    })
}

fn symbol_with_file_from(row: &rusqlite::Row) -> rusqlite::Result<SymbolWithFile> {
    Ok(SymbolWithFile {
        symbol: symbol_row_from(row)?,
        file_path: row.get(11)?,
        rank: row.get(12)?,
    })
}

fn file_dep_row_from(row: &rusqlite::Row) -> rusqlite::Result<FileDepRow> {
    Ok(FileDepRow {
        from_file_id: row.get(0)?,
        to_file_id: row.get(1)?,
        kind: row.get(2)?,
        name: row.get(3)?,
    })
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_file_reports_change_then_no_change() {
        let store = Store::open_in_memory().unwrap();
        let (id1, changed1) = store.upsert_file("a.ts", Some("typescript"), "deadbeef", 10).unwrap();
        assert!(changed1);
        let (id2, changed2) = store.upsert_file("a.ts", Some("typescript"), "deadbeef", 10).unwrap();
        assert_eq!(id1, id2);
        assert!(!changed2);
        let (id3, changed3) = store.upsert_file("a.ts", Some("typescript"), "cafebabe", 12).unwrap();
        assert_eq!(id1, id3);
        assert!(changed3);
    }

    #[test]
    fn symbol_insert_is_reflected_in_fts() {
        let store = Store::open_in_memory().unwrap();
        let (file_id, _) = store.upsert_file("a.ts", Some("typescript"), "digest", 1).unwrap();
        store
            .insert_symbol(
                file_id,
                "foo",
                None,
                "function",
                1,
                1,
                Some("function foo() {}"),
                None,
                Some("function foo() { bar(); }"),
                true,
            )
            .unwrap();
        let hits = store.search("foo", 15).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.name, "foo");
    }

    #[test]
    fn clear_file_data_removes_symbols_and_edges() {
        let store = Store::open_in_memory().unwrap();
        let (file_id, _) = store.upsert_file("a.ts", None, "d", 1).unwrap();
        let foo = store
            .insert_symbol(file_id, "foo", None, "function", 1, 1, None, None, None, true)
            .unwrap();
        let bar = store
            .insert_symbol(file_id, "bar", None, "function", 2, 2, None, None, None, true)
            .unwrap();
        store.insert_edge(foo, bar, "calls").unwrap();
        store.clear_file_data(file_id).unwrap();
        assert!(store.symbols_in_file(file_id).unwrap().is_empty());
    }

    #[test]
    fn remove_stale_deletes_files_not_in_set() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_file("a.ts", None, "d", 1).unwrap();
        store.upsert_file("b.ts", None, "d", 1).unwrap();
        let mut keep = std::collections::HashSet::new();
        keep.insert("a.ts".to_string());
        store.remove_stale(&keep).unwrap();
        let paths: Vec<String> = store.all_files().unwrap().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["a.ts".to_string()]);
    }

    #[test]
    fn edges_self_loop_is_ignored() {
        let store = Store::open_in_memory().unwrap();
        let (file_id, _) = store.upsert_file("a.ts", None, "d", 1).unwrap();
        let foo = store
            .insert_symbol(file_id, "foo", None, "function", 1, 1, None, None, None, true)
            .unwrap();
        store.insert_edge(foo, foo, "calls").unwrap();
        let callers = store.callers_of("foo").unwrap();
        assert!(callers.is_empty());
    }

    #[test]
    fn index_file_is_atomic_and_reports_change_then_no_change() {
        let store = Store::open_in_memory().unwrap();
        let symbols = vec![
            NewSymbol {
                name: "foo",
                qualified_name: None,
                kind: "function",
                start_line: 1,
                end_line: 1,
                signature: None,
                docstring: None,
                body: None,
                exported: true,
            },
            NewSymbol {
                name: "bar",
                qualified_name: None,
                kind: "function",
                start_line: 2,
                end_line: 2,
                signature: None,
                docstring: None,
                body: None,
                exported: true,
            },
        ];
        let calls = vec![NewCall { caller_name: "foo", called_name: "bar" }];

        let result = store
            .index_file("a.ts", Some("typescript"), "digest1", 2, &symbols, &calls, &[])
            .unwrap();
        assert!(result.changed);
        assert_eq!(store.symbols_in_file(result.file_id).unwrap().len(), 2);
        assert!(!store.callers_of("bar").unwrap().is_empty());

        // Re-indexing with the same digest touches nothing.
        let again = store
            .index_file("a.ts", Some("typescript"), "digest1", 2, &symbols, &calls, &[])
            .unwrap();
        assert!(!again.changed);
        assert_eq!(again.file_id, result.file_id);

        // A changed digest clears the old symbols before inserting the new ones.
        let new_symbols = vec![NewSymbol {
            name: "baz",
            qualified_name: None,
            kind: "function",
            start_line: 1,
            end_line: 1,
            signature: None,
            docstring: None,
            body: None,
            exported: true,
        }];
        let replaced = store
            .index_file("a.ts", Some("typescript"), "digest2", 1, &new_symbols, &[], &[])
            .unwrap();
        assert!(replaced.changed);
        let names: Vec<String> = store
            .symbols_in_file(replaced.file_id)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["baz".to_string()]);
    }

    #[test]
    fn index_file_deps_skips_unresolved_targets_and_records_resolved_ones() {
        let store = Store::open_in_memory().unwrap();
        let a = store
            .index_file("a.ts", None, "d1", 1, &[], &[], &[])
            .unwrap()
            .file_id;
        let names = vec!["bar".to_string()];
        let missing = ResolvedImport { target_path: "missing.ts", names: &names };
        let deps = store.index_file_deps(a, &[missing]).unwrap();
        assert!(deps.is_empty());

        store.index_file("b.ts", None, "d2", 1, &[], &[], &[]).unwrap();
        let present = ResolvedImport { target_path: "b.ts", names: &names };
        let deps = store.index_file_deps(a, &[present]).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].names, names);
    }
}
