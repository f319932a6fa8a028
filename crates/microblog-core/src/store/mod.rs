//! SQLite primary store.
//!
//! This module provides:
//! - [`Database`], the connection owner and schema bootstrap
//! - [`Session`], the unit of work with commit hooks
//! - [`Entity`], the row mapping implemented by every persisted record

mod entity;
mod page;
mod session;

pub use entity::{Entity, IndexPolicy, Indexed, Persist, Unindexed};
pub use page::{Page, Pagination};
pub use session::{
    Changes, CommitHook, Committed, EntryId, EntryState, Session, Transient,
};

use crate::config::StoreConfig;
use crate::error::{BlogError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use session::SharedHook;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// The authoritative store for users, posts, messages and notifications.
pub struct Database {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    hooks: Vec<SharedHook>,
}

impl Database {
    /// Create or open a database at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| BlogError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn, true)?;
        Self::ensure_schema(&conn)?;
        info!("Opened database at {}", db_path.display());

        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
            hooks: Vec::new(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn, false)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
            hooks: Vec::new(),
        })
    }

    fn configure_connection(conn: &Connection, wal: bool) -> Result<()> {
        if wal {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        }
        conn.busy_timeout(StoreConfig::BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE CHECK (length(username) <= 64),
                email TEXT NOT NULL UNIQUE CHECK (length(email) <= 120),
                about_me TEXT CHECK (about_me IS NULL OR length(about_me) <= 140),
                last_seen TEXT,
                last_message_read_time TEXT
            );

            CREATE TABLE IF NOT EXISTS post (
                id INTEGER PRIMARY KEY,
                body TEXT NOT NULL CHECK (length(body) <= 140),
                timestamp TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES user(id),
                language TEXT CHECK (language IS NULL OR length(language) <= 5)
            );
            CREATE INDEX IF NOT EXISTS idx_post_timestamp ON post(timestamp);
            CREATE INDEX IF NOT EXISTS idx_post_user ON post(user_id);

            CREATE TABLE IF NOT EXISTS message (
                id INTEGER PRIMARY KEY,
                sender_id INTEGER NOT NULL REFERENCES user(id),
                recipient_id INTEGER NOT NULL REFERENCES user(id),
                body TEXT NOT NULL CHECK (length(body) <= 140),
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_message_sender ON message(sender_id);
            CREATE INDEX IF NOT EXISTS idx_message_recipient ON message(recipient_id);
            CREATE INDEX IF NOT EXISTS idx_message_timestamp ON message(timestamp);

            CREATE TABLE IF NOT EXISTS notification (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL CHECK (length(name) <= 128),
                user_id INTEGER NOT NULL REFERENCES user(id),
                timestamp REAL NOT NULL,
                payload_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notification_name ON notification(name);
            CREATE INDEX IF NOT EXISTS idx_notification_user ON notification(user_id);
            CREATE INDEX IF NOT EXISTS idx_notification_timestamp ON notification(timestamp);

            CREATE TABLE IF NOT EXISTS followers (
                follower_id INTEGER NOT NULL REFERENCES user(id),
                followed_id INTEGER NOT NULL REFERENCES user(id),
                PRIMARY KEY (follower_id, followed_id)
            );
            "#,
        )?;
        debug!("Ensured primary schema");
        Ok(())
    }

    /// Get the database path (`None` for in-memory databases).
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| BlogError::lock_poisoned())
    }

    /// Run a read against the connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Register a hook invoked around every session commit.
    pub fn register_hook(&mut self, hook: impl CommitHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    pub(crate) fn hooks(&self) -> Vec<SharedHook> {
        self.hooks.clone()
    }

    /// Start a unit of work.
    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// Get a record by primary key.
    pub fn get<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE id = ?1", E::select_clause());
        let record = conn
            .query_row(&sql, params![id], |row| E::from_row(row))
            .optional()?;
        Ok(record)
    }

    /// Fetch every record whose id is in `ids`, in ascending id order.
    ///
    /// Missing ids are skipped. Callers that need another order must sort the
    /// result themselves.
    pub fn fetch_by_ids<E: Entity>(&self, ids: &[i64]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let placeholders: Vec<_> = ids.iter().map(|_| "?").collect();
        let sql = format!(
            "{} WHERE id IN ({}) ORDER BY id",
            E::select_clause(),
            placeholders.join(",")
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| E::from_row(row))?;

        let mut records = Vec::with_capacity(ids.len());
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Stream every record of a type in id order; returns how many were visited.
    ///
    /// The connection stays locked for the whole scan.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<usize>
    where
        E: Entity,
        F: FnMut(E) -> Result<()>,
    {
        let conn = self.lock()?;
        let sql = format!("{} ORDER BY id", E::select_clause());
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut visited = 0;
        while let Some(row) = rows.next()? {
            f(E::from_row(row)?)?;
            visited += 1;
        }
        Ok(visited)
    }

    /// Count records of a type.
    pub fn count<E: Entity>(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", E::TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Post, User};
    use tempfile::TempDir;

    fn create_test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("nested/app.db")).unwrap();
        (db, temp_dir)
    }

    fn seed_posts(db: &Database, bodies: &[&str]) -> Vec<i64> {
        let mut session = db.session();
        let user = session.add(User::new("john", "john@example.com"));
        let committed = session.commit().unwrap();
        let user_id = committed.id_of(user).unwrap();

        let mut session = db.session();
        let entries: Vec<_> = bodies
            .iter()
            .map(|body| session.add(Post::new(user_id, *body)))
            .collect();
        let committed = session.commit().unwrap();
        entries
            .into_iter()
            .map(|entry| committed.id_of(entry).unwrap())
            .collect()
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let (db, temp) = create_test_db();
        assert!(temp.path().join("nested/app.db").exists());
        assert!(db.db_path().is_some());
    }

    #[test]
    fn test_fetch_by_ids_uses_natural_order() {
        let (db, _temp) = create_test_db();
        let ids = seed_posts(&db, &["a", "b", "c"]);

        let posts: Vec<Post> = db.fetch_by_ids(&[ids[2], ids[0], 9999]).unwrap();
        let fetched: Vec<_> = posts.iter().map(|p| p.id.unwrap()).collect();
        assert_eq!(fetched, vec![ids[0], ids[2]]);
        assert!(db.fetch_by_ids::<Post>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_for_each_streams_all_rows() {
        let (db, _temp) = create_test_db();
        seed_posts(&db, &["one", "two", "three"]);

        let mut bodies = Vec::new();
        let visited = db
            .for_each::<Post, _>(|post| {
                bodies.push(post.body);
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, 3);
        assert_eq!(bodies, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_get_and_count() {
        let (db, _temp) = create_test_db();
        let ids = seed_posts(&db, &["only"]);
        assert_eq!(db.count::<Post>().unwrap(), 1);
        assert!(db.get::<Post>(ids[0]).unwrap().is_some());
        assert!(db.get::<Post>(ids[0] + 100).unwrap().is_none());
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let db = Database::open_in_memory().unwrap();
        let mut session = db.session();
        session.add(Post::new(42, "orphan"));
        assert!(session.commit().is_err());
    }
}
