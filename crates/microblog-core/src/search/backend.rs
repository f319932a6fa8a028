//! Search backend trait and types.

use super::searchable::{FieldMap, IndexRecord};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Ordered primary keys and total match count for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHits {
    /// Ids in the index's relevance order.
    pub ids: Vec<i64>,
    /// Matches across all pages.
    pub total: usize,
}

impl QueryHits {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Generic full-text index backend.
///
/// Provides namespace-isolated documents keyed by integer id.
/// All operations are synchronous to match rusqlite's API.
pub trait SearchBackend: Send + Sync {
    /// Insert or replace the document `id` in `namespace`.
    ///
    /// Replaces every field of an existing document; nothing is merged.
    fn put(&self, namespace: &str, id: i64, fields: &FieldMap) -> Result<()>;

    /// Remove a document. Returns whether it existed.
    fn delete(&self, namespace: &str, id: i64) -> Result<bool>;

    /// Free-text query over every field of a namespace.
    ///
    /// `offset` and `limit` slice the ranked matches; `total` counts all of them.
    fn query(&self, namespace: &str, text: &str, offset: usize, limit: usize)
        -> Result<QueryHits>;

    /// Read back a stored document.
    fn get(&self, namespace: &str, id: i64) -> Result<Option<IndexRecord>>;

    /// Number of documents in a namespace.
    fn count(&self, namespace: &str) -> Result<usize>;
}
