//! Post-commit replay of captured changes into the index.

use super::client::IndexClient;
use super::searchable::{IndexSource, Searchable};
use super::tracker::{ChangeSnapshot, ChangeTracker};
use crate::error::Result;
use crate::store::{Changes, CommitHook, Database, EntryId, Transient};
use tracing::{debug, info};

/// Pushes primary-store changes into the search index.
#[derive(Debug, Clone)]
pub struct IndexSynchronizer {
    client: IndexClient,
}

impl IndexSynchronizer {
    pub fn new(client: IndexClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &IndexClient {
        &self.client
    }

    /// Apply a snapshot taken before a successful commit.
    ///
    /// Added and updated entities are upserted; deleted ones are removed.
    pub fn apply(&self, changes: &Changes<'_>, snapshot: ChangeSnapshot) {
        for entry in snapshot.to_add.iter().chain(&snapshot.to_update) {
            self.upsert(changes, *entry);
        }
        for entry in &snapshot.to_delete {
            let Some(source) = changes.get(*entry).and_then(|entity| entity.searchable()) else {
                continue;
            };
            if let Some(id) = source.index_id() {
                self.client.delete(source.index_namespace(), id);
            }
        }
    }

    fn upsert(&self, changes: &Changes<'_>, entry: EntryId) {
        let record = changes
            .get(entry)
            .and_then(|entity| entity.searchable())
            .and_then(|source| source.index_record());
        match record {
            Some(record) => self.client.put_record(&record),
            None => debug!("Skipping {:?}: no primary key after commit", entry),
        }
    }

    /// Upsert every persisted `T` into the index. Returns the number of rows visited.
    ///
    /// Index records whose rows were removed outside a tracked session are not
    /// cleaned up.
    pub fn reindex_all<T: Searchable>(&self, db: &Database) -> Result<usize> {
        let visited = db.for_each::<T, _>(|entity| {
            if let Some(record) = entity.index_record() {
                self.client.put_record(&record);
            }
            Ok(())
        })?;

        info!("Reindexed {} {} records", visited, T::namespace());
        Ok(visited)
    }
}

/// Commit hook wiring the tracker and the synchronizer into sessions.
pub struct IndexSync {
    synchronizer: IndexSynchronizer,
}

impl IndexSync {
    pub fn new(client: IndexClient) -> Self {
        Self {
            synchronizer: IndexSynchronizer::new(client),
        }
    }
}

impl CommitHook for IndexSync {
    fn before_commit(&self, changes: &Changes<'_>, state: &mut Transient) {
        let snapshot = ChangeTracker::capture(changes);
        if !snapshot.is_empty() {
            state.insert(snapshot);
        }
    }

    fn after_commit(&self, changes: &Changes<'_>, state: &mut Transient) {
        if let Some(snapshot) = state.remove::<ChangeSnapshot>() {
            debug!("Syncing {} searchable changes", snapshot.len());
            self.synchronizer.apply(changes, snapshot);
        }
    }

    fn after_rollback(&self, state: &mut Transient) {
        if let Some(snapshot) = state.remove::<ChangeSnapshot>() {
            debug!("Discarding {} searchable changes after rollback", snapshot.len());
        }
    }
}
