//! Fault-tolerant handle on the search backend.

use super::backend::{QueryHits, SearchBackend};
use super::searchable::{FieldMap, IndexRecord};
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapter over an optional [`SearchBackend`].
///
/// With no backend configured every write is a no-op and every query returns
/// no hits. Backend failures are logged and swallowed: callers of the client
/// never see an index error.
#[derive(Clone, Default)]
pub struct IndexClient {
    backend: Option<Arc<dyn SearchBackend>>,
}

impl IndexClient {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A client with no backend.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Insert or replace a document.
    pub fn put(&self, namespace: &str, id: i64, fields: &FieldMap) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(e) = backend.put(namespace, id, fields) {
            warn!("Failed to index {}/{}: {}", namespace, id, e);
        }
    }

    pub fn put_record(&self, record: &IndexRecord) {
        self.put(&record.namespace, record.id, &record.fields);
    }

    /// Remove a document; absent documents are ignored.
    pub fn delete(&self, namespace: &str, id: i64) {
        let Some(backend) = &self.backend else {
            return;
        };
        match backend.delete(namespace, id) {
            Ok(true) => {}
            Ok(false) => debug!("{}/{} was not in the index", namespace, id),
            Err(e) => warn!("Failed to remove {}/{} from index: {}", namespace, id, e),
        }
    }

    /// Ranked ids for a slice of the matches, plus the total match count.
    pub fn query(&self, namespace: &str, text: &str, offset: usize, limit: usize) -> QueryHits {
        let Some(backend) = &self.backend else {
            return QueryHits::empty();
        };
        match backend.query(namespace, text, offset, limit) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Search in {} failed: {}", namespace, e);
                QueryHits::empty()
            }
        }
    }

    /// Read back a stored document, for inspection.
    pub fn get(&self, namespace: &str, id: i64) -> Option<IndexRecord> {
        let backend = self.backend.as_ref()?;
        match backend.get(namespace, id) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to read {}/{} from index: {}", namespace, id, e);
                None
            }
        }
    }

    /// Number of documents in a namespace; 0 without a working backend.
    pub fn count(&self, namespace: &str) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };
        backend.count(namespace).unwrap_or_else(|e| {
            warn!("Failed to count {} documents: {}", namespace, e);
            0
        })
    }
}

impl std::fmt::Debug for IndexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexClient")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BlogError, Result};

    struct Unreachable;

    impl SearchBackend for Unreachable {
        fn put(&self, _: &str, _: i64, _: &FieldMap) -> Result<()> {
            Err(BlogError::Index {
                message: "connection refused".into(),
            })
        }
        fn delete(&self, _: &str, _: i64) -> Result<bool> {
            Err(BlogError::Index {
                message: "connection refused".into(),
            })
        }
        fn query(&self, _: &str, _: &str, _: usize, _: usize) -> Result<QueryHits> {
            Err(BlogError::Index {
                message: "connection refused".into(),
            })
        }
        fn get(&self, _: &str, _: i64) -> Result<Option<IndexRecord>> {
            Err(BlogError::Index {
                message: "connection refused".into(),
            })
        }
        fn count(&self, _: &str) -> Result<usize> {
            Err(BlogError::Index {
                message: "connection refused".into(),
            })
        }
    }

    #[test]
    fn test_disabled_client_is_noop() {
        let client = IndexClient::disabled();
        assert!(!client.is_enabled());

        client.put("post", 1, &FieldMap::new());
        client.delete("post", 1);
        assert_eq!(client.query("post", "anything", 0, 10), QueryHits::empty());
        assert!(client.get("post", 1).is_none());
        assert_eq!(client.count("post"), 0);
    }

    #[test]
    fn test_backend_errors_are_swallowed() {
        let client = IndexClient::new(Arc::new(Unreachable));
        assert!(client.is_enabled());

        client.put("post", 1, &FieldMap::new());
        client.delete("post", 1);
        let hits = client.query("post", "anything", 0, 10);
        assert!(hits.ids.is_empty());
        assert_eq!(hits.total, 0);
        assert_eq!(client.count("post"), 0);
    }
}
