//! Integration tests for commit-time index synchronization and search.
//!
//! These tests drive sessions through the public API and observe the index
//! either through the real FTS5 backend or through in-test backends that
//! record calls or fail on purpose.

use microblog_core::search::{
    ChangeSnapshot, ChangeTracker, FieldMap, IndexRecord, QueryHits, SearchBackend, Searchable,
};
use microblog_core::store::{Changes, CommitHook, Entity, Indexed, Transient};
use microblog_core::{
    BlogConfig, BlogError, Database, Fts5Index, IndexSynchronizer, Microblog, Post, Result, User,
};
use rusqlite::{Connection, Row};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Put(String, i64),
    Delete(String, i64),
    Query {
        namespace: String,
        offset: usize,
        limit: usize,
    },
}

/// Keeps documents in a map and records every call.
///
/// Queries match by substring in id order unless a fixed result was scripted.
#[derive(Default)]
struct RecordingBackend {
    docs: Mutex<BTreeMap<(String, i64), FieldMap>>,
    calls: Mutex<Vec<Call>>,
    scripted: Mutex<Option<QueryHits>>,
}

impl RecordingBackend {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Query { .. }))
            .collect()
    }

    fn script(&self, hits: QueryHits) {
        *self.scripted.lock().unwrap() = Some(hits);
    }

    fn body(&self, id: i64) -> Option<String> {
        self.docs
            .lock()
            .unwrap()
            .get(&("post".to_string(), id))
            .and_then(|fields| fields.get("body").cloned())
    }
}

impl SearchBackend for RecordingBackend {
    fn put(&self, namespace: &str, id: i64, fields: &FieldMap) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Put(namespace.to_string(), id));
        self.docs
            .lock()
            .unwrap()
            .insert((namespace.to_string(), id), fields.clone());
        Ok(())
    }

    fn delete(&self, namespace: &str, id: i64) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(namespace.to_string(), id));
        Ok(self
            .docs
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), id))
            .is_some())
    }

    fn query(&self, namespace: &str, text: &str, offset: usize, limit: usize) -> Result<QueryHits> {
        self.calls.lock().unwrap().push(Call::Query {
            namespace: namespace.to_string(),
            offset,
            limit,
        });
        if let Some(hits) = self.scripted.lock().unwrap().clone() {
            return Ok(hits);
        }

        let matching: Vec<i64> = self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), fields)| {
                ns == namespace && fields.values().any(|value| value.contains(text))
            })
            .map(|((_, id), _)| *id)
            .collect();
        Ok(QueryHits {
            total: matching.len(),
            ids: matching.into_iter().skip(offset).take(limit).collect(),
        })
    }

    fn get(&self, namespace: &str, id: i64) -> Result<Option<IndexRecord>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), id))
            .map(|fields| IndexRecord {
                namespace: namespace.to_string(),
                id,
                fields: fields.clone(),
            }))
    }

    fn count(&self, namespace: &str) -> Result<usize> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .count())
    }
}

/// Fails every call, like an index server that is down.
struct FailingBackend;

fn index_down() -> BlogError {
    BlogError::Index {
        message: "index server unreachable".to_string(),
    }
}

impl SearchBackend for FailingBackend {
    fn put(&self, _: &str, _: i64, _: &FieldMap) -> Result<()> {
        Err(index_down())
    }
    fn delete(&self, _: &str, _: i64) -> Result<bool> {
        Err(index_down())
    }
    fn query(&self, _: &str, _: &str, _: usize, _: usize) -> Result<QueryHits> {
        Err(index_down())
    }
    fn get(&self, _: &str, _: i64) -> Result<Option<IndexRecord>> {
        Err(index_down())
    }
    fn count(&self, _: &str) -> Result<usize> {
        Err(index_down())
    }
}

/// Captures what the tracker sees right before each commit.
struct SnapshotRecorder(Arc<Mutex<Vec<ChangeSnapshot>>>);

impl CommitHook for SnapshotRecorder {
    fn before_commit(&self, changes: &Changes<'_>, _state: &mut Transient) {
        self.0.lock().unwrap().push(ChangeTracker::capture(changes));
    }

    fn after_commit(&self, _changes: &Changes<'_>, _state: &mut Transient) {}
}

fn recording_blog() -> (Microblog, Arc<RecordingBackend>) {
    let backend = Arc::new(RecordingBackend::default());
    let db = Database::open_in_memory().unwrap();
    let blog = Microblog::with_backend(db, Some(backend.clone()));
    (blog, backend)
}

fn create_user(blog: &Microblog, name: &str) -> User {
    let mut session = blog.session();
    let entry = session.add(User::new(name, format!("{}@example.com", name)));
    let committed = session.commit().unwrap();
    committed.get::<User>(entry).unwrap().clone()
}

fn create_posts(blog: &Microblog, author: &User, bodies: &[&str]) -> Vec<Post> {
    let mut session = blog.session();
    let entries: Vec<_> = bodies
        .iter()
        .map(|body| session.add(Post::new(author.id.unwrap(), *body)))
        .collect();
    let committed = session.commit().unwrap();
    entries
        .into_iter()
        .map(|entry| committed.get::<Post>(entry).unwrap().clone())
        .collect()
}

#[test]
fn test_created_posts_are_indexed_after_commit() {
    let (blog, backend) = recording_blog();
    let john = create_user(&blog, "john");

    let posts = create_posts(&blog, &john, &["hello world", "second post"]);

    let ids: Vec<i64> = posts.iter().map(|p| p.id.unwrap()).collect();
    assert_eq!(
        backend.writes(),
        vec![
            Call::Put("post".to_string(), ids[0]),
            Call::Put("post".to_string(), ids[1]),
        ]
    );
    assert_eq!(backend.body(ids[0]).as_deref(), Some("hello world"));
}

#[test]
fn test_failed_commit_leaves_index_untouched() {
    let (blog, backend) = recording_blog();
    let john = create_user(&blog, "john");

    let mut session = blog.session();
    session.add(Post::new(john.id.unwrap(), "fine"));
    session.add(Post::new(john.id.unwrap(), "x".repeat(141)));
    assert!(session.commit().is_err());

    let mut session = blog.session();
    let mut ghost = Post::new(john.id.unwrap(), "never stored");
    ghost.id = Some(999);
    session.update(ghost).unwrap();
    let err = session.commit().unwrap_err();
    assert!(matches!(err, BlogError::NotFound { entity: "post", id: 999 }));

    assert!(backend.writes().is_empty());
    assert_eq!(blog.database().count::<Post>().unwrap(), 0);
}

#[test]
fn test_without_index_everything_still_works() {
    let db = Database::open_in_memory().unwrap();
    let blog = Microblog::with_backend(db, None);
    assert!(!blog.index().is_enabled());

    let john = create_user(&blog, "john");
    let mut post = create_posts(&blog, &john, &["hello"]).remove(0);

    post.body = "edited".to_string();
    let mut session = blog.session();
    session.update(post.clone()).unwrap();
    session.commit().unwrap();

    let mut session = blog.session();
    session.delete(post).unwrap();
    session.commit().unwrap();

    let page = blog.search_posts("hello", 1, 10).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
}

#[test]
fn test_failing_index_never_fails_writes_or_reads() {
    let db = Database::open_in_memory().unwrap();
    let blog = Microblog::with_backend(db, Some(Arc::new(FailingBackend)));

    let john = create_user(&blog, "john");
    let post = create_posts(&blog, &john, &["hello"]).remove(0);

    let mut session = blog.session();
    session.delete(post).unwrap();
    session.commit().unwrap();

    let page = blog.search_posts("hello", 1, 10).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
}

#[test]
fn test_results_follow_index_order() {
    let (blog, backend) = recording_blog();
    let john = create_user(&blog, "john");
    let bodies: Vec<String> = (1..=10).map(|n| format!("post {}", n)).collect();
    let bodies: Vec<&str> = bodies.iter().map(String::as_str).collect();
    let posts = create_posts(&blog, &john, &bodies);
    let id = |n: usize| posts[n - 1].id.unwrap();

    backend.script(QueryHits {
        ids: vec![id(7), id(3), id(9)],
        total: 3,
    });
    let page = blog.search_posts("post", 1, 10).unwrap();

    let found: Vec<i64> = page.items.iter().map(|p| p.id.unwrap()).collect();
    assert_eq!(found, vec![id(7), id(3), id(9)]);
    assert_eq!(page.total, 3);
}

#[test]
fn test_ids_missing_from_store_are_dropped() {
    let (blog, backend) = recording_blog();
    let john = create_user(&blog, "john");
    let post = create_posts(&blog, &john, &["still here"]).remove(0);

    backend.script(QueryHits {
        ids: vec![4242, post.id.unwrap()],
        total: 2,
    });
    let page = blog.search_posts("here", 1, 10).unwrap();

    let found: Vec<i64> = page.items.iter().map(|p| p.id.unwrap()).collect();
    assert_eq!(found, vec![post.id.unwrap()]);
    assert_eq!(page.total, 2);
}

#[test]
fn test_snapshot_sets_are_disjoint_and_searchable_only() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut db = Database::open_in_memory().unwrap();
    db.register_hook(SnapshotRecorder(captured.clone()));
    let blog = Microblog::with_backend(db, None);

    let john = create_user(&blog, "john");
    let posts = create_posts(&blog, &john, &["keep", "edit", "drop", "edit then drop"]);
    captured.lock().unwrap().clear();

    let mut session = blog.session();
    let added = session.add(Post::new(john.id.unwrap(), "brand new"));
    session.add(User::new("susan", "susan@example.com"));

    let mut edited = posts[1].clone();
    edited.body = "edited".to_string();
    let updated = session.update(edited.clone()).unwrap();
    edited.body = "edited twice".to_string();
    assert_eq!(session.update(edited).unwrap(), updated);

    let dropped = session.delete(posts[2].clone()).unwrap();
    let mut both = posts[3].clone();
    both.body = "changed".to_string();
    let both_entry = session.update(both.clone()).unwrap();
    assert_eq!(session.delete(both).unwrap(), both_entry);
    session.commit().unwrap();

    let snapshots = captured.lock().unwrap();
    let snapshot = &snapshots[0];
    assert_eq!(snapshot.to_add, vec![added]);
    assert_eq!(snapshot.to_update, vec![updated]);
    assert_eq!(snapshot.to_delete, vec![dropped, both_entry]);
    assert_eq!(snapshot.len(), 4);
}

#[test]
fn test_readding_deleted_post_keeps_it_indexed() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut db = Database::open_in_memory().unwrap();
    db.register_hook(SnapshotRecorder(captured.clone()));
    let fts = Arc::new(Fts5Index::open_in_memory().unwrap());
    let blog = Microblog::with_backend(db, Some(fts));

    let john = create_user(&blog, "john");
    let post = create_posts(&blog, &john, &["original text"]).remove(0);
    let id = post.id.unwrap();
    captured.lock().unwrap().clear();

    let mut replacement = post.clone();
    replacement.body = "replacement text".to_string();
    let mut session = blog.session();
    let deleted = session.delete(post).unwrap();
    let added = session.add(replacement);
    assert_eq!(deleted, added);
    session.commit().unwrap();

    let snapshots = captured.lock().unwrap();
    assert_eq!(snapshots[0].to_update, vec![added]);
    assert!(snapshots[0].to_add.is_empty());
    assert!(snapshots[0].to_delete.is_empty());

    let stored = blog.database().get::<Post>(id).unwrap().unwrap();
    assert_eq!(stored.body, "replacement text");
    let record = blog.index().get("post", id).unwrap();
    assert_eq!(record.fields["body"], "replacement text");
    assert_eq!(blog.search_posts("replacement", 1, 10).unwrap().total, 1);
    assert_eq!(blog.search_posts("original", 1, 10).unwrap().total, 0);
}

/// A second searchable type, declared only through `Entity` + `Searchable`.
#[derive(Debug, Clone)]
struct Note {
    id: Option<i64>,
    title: String,
    text: String,
}

impl Entity for Note {
    const TABLE: &'static str = "note";
    const COLUMNS: &'static [&'static str] = &["id", "title", "text"];

    type Index = Indexed;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            text: row.get(2)?,
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO note (id, title, text) VALUES (?1, ?2, ?3)",
            rusqlite::params![self.id, self.title, self.text],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "UPDATE note SET title = ?2, text = ?3 WHERE id = ?1",
            rusqlite::params![self.id, self.title, self.text],
        )
    }
}

impl Searchable for Note {
    const SEARCHABLE_FIELDS: &'static [&'static str] = &["title", "text"];

    fn field_value(&self, field: &str) -> Option<String> {
        match field {
            "title" => Some(self.title.clone()),
            "text" => Some(self.text.clone()),
            _ => None,
        }
    }
}

#[test]
fn test_searchable_declaration_alone_drives_commit_sync() {
    let db = Database::open_in_memory().unwrap();
    db.with_connection(|conn| {
        conn.execute_batch("CREATE TABLE note (id INTEGER PRIMARY KEY, title TEXT, text TEXT)")?;
        Ok(())
    })
    .unwrap();
    let fts = Arc::new(Fts5Index::open_in_memory().unwrap());
    let blog = Microblog::with_backend(db, Some(fts.clone()));

    let mut session = blog.session();
    let entry = session.add(Note {
        id: None,
        title: "groceries".to_string(),
        text: "milk and bread".to_string(),
    });
    let committed = session.commit().unwrap();
    let id = committed.id_of(entry).unwrap();

    assert_eq!(fts.count("note").unwrap(), 1);
    let record = fts.get("note", id).unwrap().unwrap();
    assert_eq!(record.fields.len(), 2);

    let found =
        microblog_core::search::search::<Note>(blog.database(), blog.index(), "bread", 1, 10)
            .unwrap();
    assert_eq!(found.items[0].title, "groceries");

    let reindexed = IndexSynchronizer::new(blog.index().clone())
        .reindex_all::<Note>(blog.database())
        .unwrap();
    assert_eq!(reindexed, 1);
    assert_eq!(fts.count("note").unwrap(), 1);
}

#[test]
fn test_update_overwrites_indexed_fields() {
    let blog = Microblog::in_memory().unwrap();
    let john = create_user(&blog, "john");
    let mut post = create_posts(&blog, &john, &["first draft"]).remove(0);
    let id = post.id.unwrap();

    post.body = "final words".to_string();
    let mut session = blog.session();
    session.update(post).unwrap();
    session.commit().unwrap();

    let record = blog.index().get("post", id).unwrap();
    assert_eq!(record.fields["body"], "final words");
    assert_eq!(record.fields.len(), 1);
    assert_eq!(blog.index().count("post"), 1);
    assert_eq!(blog.search_posts("draft", 1, 10).unwrap().total, 0);
    assert_eq!(blog.search_posts("final", 1, 10).unwrap().total, 1);
}

#[test]
fn test_deleted_posts_leave_the_index() {
    let blog = Microblog::in_memory().unwrap();
    let john = create_user(&blog, "john");
    let post = create_posts(&blog, &john, &["short lived"]).remove(0);
    assert_eq!(blog.search_posts("lived", 1, 10).unwrap().total, 1);

    let mut session = blog.session();
    session.delete_by_id::<Post>(post.id.unwrap()).unwrap();
    session.commit().unwrap();

    assert_eq!(blog.search_posts("lived", 1, 10).unwrap().total, 0);
    assert!(blog.index().get("post", post.id.unwrap()).is_none());
}

#[test]
fn test_reindex_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path().join("app.db")).unwrap();

    // Rows written before any index existed.
    let mut session = db.session();
    let user = session.add(User::new("john", "john@example.com"));
    let committed = session.commit().unwrap();
    let user_id = committed.id_of(user).unwrap();
    let mut session = db.session();
    for body in ["apples and pears", "pears only", "nothing relevant"] {
        session.add(Post::new(user_id, body));
    }
    session.commit().unwrap();

    let fts = Arc::new(Fts5Index::open(temp_dir.path().join("search.db")).unwrap());
    let blog = Microblog::with_backend(db, Some(fts.clone()));
    assert_eq!(blog.search_posts("pears", 1, 10).unwrap().total, 0);

    assert_eq!(blog.reindex_posts().unwrap(), 3);
    let first: Vec<_> = blog.search_posts("pears", 1, 10).unwrap().items;

    assert_eq!(blog.reindex_posts().unwrap(), 3);
    let second: Vec<_> = blog.search_posts("pears", 1, 10).unwrap().items;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(fts.count(Post::namespace()).unwrap(), 3);
}

#[test]
fn test_second_page_of_fifteen_matches() {
    let (blog, backend) = recording_blog();
    let john = create_user(&blog, "john");
    let bodies = vec!["rust"; 15];
    create_posts(&blog, &john, &bodies);

    let page = blog.search_posts("rust", 2, 10).unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total, 15);
    assert_eq!(page.total_pages(), 2);
    assert!(!page.has_next());
    assert!(page.has_prev());

    assert!(backend.calls().contains(&Call::Query {
        namespace: "post".to_string(),
        offset: 10,
        limit: 10,
    }));
}

#[test]
fn test_second_page_with_fts5() {
    let blog = Microblog::in_memory().unwrap();
    let john = create_user(&blog, "john");
    create_posts(&blog, &john, &vec!["rust"; 15]);

    let page = blog.search_posts("rust", 2, 10).unwrap();
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total, 15);
}

#[test]
fn test_invalid_pagination_rejected_before_query() {
    let (blog, backend) = recording_blog();

    let err = blog.search_posts("anything", 0, 10).unwrap_err();
    assert!(err.is_validation());
    let err = blog.search_posts("anything", 1, 0).unwrap_err();
    assert!(err.is_validation());

    assert!(backend.calls().is_empty());
}

#[test]
fn test_open_from_config_with_index() {
    let temp_dir = TempDir::new().unwrap();
    let config = BlogConfig {
        database_path: temp_dir.path().join("data/app.db"),
        search_index_path: Some(temp_dir.path().join("data/search.db")),
        posts_per_page: 25,
    };

    let blog = Microblog::open(&config).unwrap();
    assert!(blog.index().is_enabled());
    assert!(blog.fts_index().is_some());
    assert_eq!(blog.posts_per_page(), 25);

    let john = create_user(&blog, "john");
    create_posts(&blog, &john, &["persisted and indexed"]);
    drop(blog);

    let reopened = Microblog::open(&config).unwrap();
    let page = reopened.search_posts("indexed", 1, 10).unwrap();
    assert_eq!(page.items[0].body, "persisted and indexed");
}

#[test]
fn test_unusable_index_path_runs_without_search() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let config = BlogConfig {
        database_path: temp_dir.path().join("app.db"),
        search_index_path: Some(blocker.join("search.db")),
        ..BlogConfig::default()
    };

    let blog = Microblog::open(&config).unwrap();
    assert!(!blog.index().is_enabled());

    let john = create_user(&blog, "john");
    create_posts(&blog, &john, &["still works"]);
    assert_eq!(blog.search_posts("works", 1, 10).unwrap().total, 0);
}
