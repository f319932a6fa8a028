//! Pre-commit capture of searchable changes.

use crate::store::{Changes, EntryId, Persist};

/// Searchable entities staged in one session, split by what happened to them.
///
/// The three lists are disjoint: a session keeps one entry per record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSnapshot {
    pub to_add: Vec<EntryId>,
    pub to_update: Vec<EntryId>,
    pub to_delete: Vec<EntryId>,
}

impl ChangeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Gathers the searchable subset of a session's staged entities.
pub struct ChangeTracker;

impl ChangeTracker {
    /// Snapshot the new, dirty and deleted entities that opted into indexing.
    ///
    /// Entries are referenced by [`EntryId`] because new entities only get
    /// their primary key during the commit.
    pub fn capture(changes: &Changes<'_>) -> ChangeSnapshot {
        fn searchable<'a, I>(entries: I) -> Vec<EntryId>
        where
            I: Iterator<Item = (EntryId, &'a dyn Persist)>,
        {
            entries
                .filter(|(_, entity)| entity.searchable().is_some())
                .map(|(id, _)| id)
                .collect()
        }

        ChangeSnapshot {
            to_add: searchable(changes.new_entities()),
            to_update: searchable(changes.dirty_entities()),
            to_delete: searchable(changes.deleted_entities()),
        }
    }
}
