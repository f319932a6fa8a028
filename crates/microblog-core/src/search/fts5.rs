//! SQLite FTS5 search backend.
//!
//! The index lives in its own database file, separate from the primary store.
//! Each document is one row of a plain records table (namespace, id, field
//! map as JSON) plus one FTS5 row sharing its rowid, holding the field values
//! as searchable text.

use super::backend::{QueryHits, SearchBackend};
use super::query::build_fts5_query;
use super::searchable::{FieldMap, IndexRecord};
use crate::config::{SearchConfig, StoreConfig};
use crate::error::{BlogError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Configuration for the FTS5 tables.
#[derive(Debug, Clone)]
pub struct FTS5Config {
    /// Name of the FTS5 virtual table; the records table is `<name>_records`.
    pub table_name: String,
    /// Tokenizer configuration.
    pub tokenizer: String,
}

impl Default for FTS5Config {
    fn default() -> Self {
        Self {
            table_name: "search_fts".to_string(),
            tokenizer: SearchConfig::FTS5_TOKENIZER.to_string(),
        }
    }
}

impl FTS5Config {
    fn records_table(&self) -> String {
        format!("{}_records", self.table_name)
    }
}

/// Statistics about an FTS5 index.
#[derive(Debug, Clone)]
pub struct FTS5Stats {
    pub table_name: String,
    pub row_count: usize,
    pub tokenizer: String,
}

/// Full-text index backed by a standalone SQLite FTS5 database.
pub struct Fts5Index {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    config: FTS5Config,
}

impl Fts5Index {
    /// Create or open an index at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(db_path, FTS5Config::default())
    }

    /// Create or open an index with custom table configuration.
    pub fn with_config(db_path: impl Into<PathBuf>, config: FTS5Config) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BlogError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(StoreConfig::BUSY_TIMEOUT)?;

        let index = Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
            config,
        };
        index.ensure_schema()?;
        Ok(index)
    }

    /// Open a private in-memory index.
    pub fn open_in_memory() -> Result<Self> {
        let index = Self {
            db_path: None,
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            config: FTS5Config::default(),
        };
        index.ensure_schema()?;
        Ok(index)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BlogError::lock_poisoned())
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {records} (
                doc_key INTEGER PRIMARY KEY,
                namespace TEXT NOT NULL,
                doc_id INTEGER NOT NULL,
                fields_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (namespace, doc_id)
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
                content,
                tokenize='{tokenizer}'
            );",
            records = self.config.records_table(),
            fts = self.config.table_name,
            tokenizer = self.config.tokenizer,
        );
        conn.execute_batch(&sql)?;
        info!("Ensured FTS5 index table: {}", self.config.table_name);
        Ok(())
    }

    /// Get the index database path (`None` for in-memory indexes).
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn record_key(&self, conn: &Connection, namespace: &str, id: i64) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT doc_key FROM {} WHERE namespace = ?1 AND doc_id = ?2",
            self.config.records_table()
        );
        Ok(conn
            .query_row(&sql, params![namespace, id], |row| row.get(0))
            .optional()?)
    }

    /// Remove every document of a namespace. Returns how many were removed.
    pub fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let records = self.config.records_table();

        tx.execute(
            &format!(
                "DELETE FROM {} WHERE rowid IN (SELECT doc_key FROM {} WHERE namespace = ?1)",
                self.config.table_name, records
            ),
            params![namespace],
        )?;
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE namespace = ?1", records),
            params![namespace],
        )?;
        tx.commit()?;

        debug!("Cleared {} documents from namespace {}", removed, namespace);
        Ok(removed)
    }

    /// Optimize the FTS5 index.
    pub fn optimize(&self) -> Result<()> {
        let conn = self.lock()?;
        let sql = format!(
            "INSERT INTO {}({}) VALUES('optimize')",
            self.config.table_name, self.config.table_name
        );
        conn.execute(&sql, [])?;
        debug!("Optimized FTS5 index");
        Ok(())
    }

    /// Get statistics about the FTS5 index.
    pub fn get_stats(&self) -> Result<FTS5Stats> {
        let conn = self.lock()?;
        let row_count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.config.table_name),
            [],
            |row| row.get(0),
        )?;

        Ok(FTS5Stats {
            table_name: self.config.table_name.clone(),
            row_count,
            tokenizer: self.config.tokenizer.clone(),
        })
    }
}

impl SearchBackend for Fts5Index {
    fn put(&self, namespace: &str, id: i64, fields: &FieldMap) -> Result<()> {
        let fields_json = serde_json::to_string(fields)?;
        let content = fields.values().map(String::as_str).collect::<Vec<_>>().join("\n");

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO {} (namespace, doc_id, fields_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, doc_id) DO UPDATE SET
                     fields_json = excluded.fields_json,
                     updated_at = excluded.updated_at",
                self.config.records_table()
            ),
            params![namespace, id, fields_json, Utc::now().to_rfc3339()],
        )?;

        let key = self
            .record_key(&tx, namespace, id)?
            .ok_or_else(|| BlogError::Index {
                message: format!("record {}/{} vanished during upsert", namespace, id),
            })?;

        let fts = &self.config.table_name;
        tx.execute(&format!("DELETE FROM {} WHERE rowid = ?1", fts), params![key])?;
        tx.execute(
            &format!("INSERT INTO {} (rowid, content) VALUES (?1, ?2)", fts),
            params![key, content],
        )?;
        tx.commit()?;

        debug!("Indexed {}/{}", namespace, id);
        Ok(())
    }

    fn delete(&self, namespace: &str, id: i64) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(key) = self.record_key(&tx, namespace, id)? else {
            return Ok(false);
        };

        tx.execute(
            &format!("DELETE FROM {} WHERE rowid = ?1", self.config.table_name),
            params![key],
        )?;
        tx.execute(
            &format!("DELETE FROM {} WHERE doc_key = ?1", self.config.records_table()),
            params![key],
        )?;
        tx.commit()?;

        debug!("Removed {}/{} from index", namespace, id);
        Ok(true)
    }

    fn query(
        &self,
        namespace: &str,
        text: &str,
        offset: usize,
        limit: usize,
    ) -> Result<QueryHits> {
        let fts5_query = build_fts5_query(text);
        if fts5_query.is_empty() || limit == 0 {
            return Ok(QueryHits::empty());
        }

        let conn = self.lock()?;
        let fts = &self.config.table_name;
        let records = self.config.records_table();
        let from_where = format!(
            "FROM {fts} JOIN {records} ON {records}.doc_key = {fts}.rowid
             WHERE {fts} MATCH ?1 AND {records}.namespace = ?2",
        );

        let total: usize = conn.query_row(
            &format!("SELECT COUNT(*) {}", from_where),
            params![fts5_query, namespace],
            |row| row.get(0),
        )?;
        if total == 0 {
            return Ok(QueryHits::empty());
        }

        let sql = format!(
            "SELECT {records}.doc_id {from_where}
             ORDER BY {fts}.rank, {records}.doc_id LIMIT ?3 OFFSET ?4",
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![fts5_query, namespace, limit as i64, offset as i64],
            |row| row.get(0),
        )?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }

        Ok(QueryHits { ids, total })
    }

    fn get(&self, namespace: &str, id: i64) -> Result<Option<IndexRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT fields_json FROM {} WHERE namespace = ?1 AND doc_id = ?2",
            self.config.records_table()
        );
        let fields_json: Option<String> = conn
            .query_row(&sql, params![namespace, id], |row| row.get(0))
            .optional()?;

        match fields_json {
            Some(json) => Ok(Some(IndexRecord {
                namespace: namespace.to_string(),
                id,
                fields: serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }

    fn count(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE namespace = ?1",
                self.config.records_table()
            ),
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
