//! Microblog Core - Headless backend for a small social blogging service.
//!
//! Users follow each other, write short posts, exchange messages and receive
//! notifications. Posts are mirrored into a full-text index that is kept in
//! step with the primary store at commit time and never allowed to fail a
//! write.
//!
//! # Example
//!
//! ```rust,ignore
//! use microblog_core::{BlogConfig, Microblog, Post};
//!
//! fn main() -> microblog_core::Result<()> {
//!     let blog = Microblog::open(&BlogConfig::from_env()?)?;
//!
//!     let mut session = blog.session();
//!     session.add(Post::new(1, "hello world"));
//!     session.commit()?;
//!
//!     let page = blog.search_posts("hello", 1, 10)?;
//!     println!("Found {} posts", page.total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod store;

pub use config::BlogConfig;
pub use error::{BlogError, Result};
pub use models::{Message, Notification, Post, User};
pub use search::{Fts5Index, IndexClient, IndexSync, IndexSynchronizer, SearchBackend, Searchable};
pub use store::{Database, Page, Pagination, Session};

use std::sync::Arc;
use tracing::{info, warn};

/// Primary store and search index wired together.
///
/// Every session started from here keeps the index in sync on commit.
pub struct Microblog {
    db: Database,
    index: IndexClient,
    fts: Option<Arc<Fts5Index>>,
    posts_per_page: u32,
}

impl Microblog {
    /// Open the database and, when configured, the search index.
    ///
    /// An index that cannot be opened is logged and the blog runs without
    /// search rather than failing to start.
    pub fn open(config: &BlogConfig) -> Result<Self> {
        let db = Database::open(&config.database_path)?;

        let fts = match &config.search_index_path {
            Some(path) => match Fts5Index::open(path) {
                Ok(index) => Some(Arc::new(index)),
                Err(e) => {
                    warn!("Search index at {} unavailable: {}", path.display(), e);
                    None
                }
            },
            None => {
                info!("No search index configured; search is disabled");
                None
            }
        };

        let mut blog = Self::assemble(db, fts);
        blog.posts_per_page = config.posts_per_page;
        Ok(blog)
    }

    /// In-memory database and in-memory FTS5 index.
    pub fn in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        let fts = Arc::new(Fts5Index::open_in_memory()?);
        Ok(Self::assemble(db, Some(fts)))
    }

    fn assemble(db: Database, fts: Option<Arc<Fts5Index>>) -> Self {
        let backend = fts.clone().map(|index| index as Arc<dyn SearchBackend>);
        let mut blog = Self::with_backend(db, backend);
        blog.fts = fts;
        blog
    }

    /// Wire an arbitrary backend (or none) to a database.
    pub fn with_backend(mut db: Database, backend: Option<Arc<dyn SearchBackend>>) -> Self {
        let index = match backend {
            Some(backend) => IndexClient::new(backend),
            None => IndexClient::disabled(),
        };
        db.register_hook(IndexSync::new(index.clone()));

        Self {
            db,
            index,
            fts: None,
            posts_per_page: config::SearchConfig::DEFAULT_PER_PAGE,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn index(&self) -> &IndexClient {
        &self.index
    }

    /// The FTS5 index, when this blog owns one.
    pub fn fts_index(&self) -> Option<&Fts5Index> {
        self.fts.as_deref()
    }

    pub fn posts_per_page(&self) -> u32 {
        self.posts_per_page
    }

    pub fn session(&self) -> Session<'_> {
        self.db.session()
    }

    /// Search posts by text, in relevance order.
    pub fn search_posts(&self, text: &str, page: u32, per_page: u32) -> Result<Page<Post>> {
        search::search::<Post>(&self.db, &self.index, text, page, per_page)
    }

    /// Upsert every stored post into the index.
    pub fn reindex_posts(&self) -> Result<usize> {
        IndexSynchronizer::new(self.index.clone()).reindex_all::<Post>(&self.db)
    }
}
