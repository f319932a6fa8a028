//! Unit of work over the primary store.
//!
//! A [`Session`] stages inserts, updates, deletes and raw statements, then
//! applies them in one SQLite transaction on [`Session::commit`]. Registered
//! [`CommitHook`]s observe the staged changes at three points:
//!
//! 1. `before_commit` - before any statement runs, outcome unknown
//! 2. `after_commit` - after the transaction committed and the lock is released
//! 3. `after_rollback` - instead of `after_commit` when the transaction failed
//!
//! Dropping a session without committing discards everything it staged.

use super::entity::{Entity, Persist};
use super::Database;
use crate::error::{BlogError, Result};
use rusqlite::types::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle to an entity staged in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

/// What a session will do with a staged entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    New,
    Dirty,
    Deleted,
}

struct Entry {
    state: EntryState,
    entity: Box<dyn Persist>,
}

struct StagedStatement {
    sql: String,
    params: Vec<Value>,
}

enum Op {
    Entry(usize),
    Statement(StagedStatement),
}

/// Callbacks invoked around a session's commit boundary.
pub trait CommitHook: Send + Sync {
    /// Runs before the transaction starts; no persistence effect has happened yet.
    fn before_commit(&self, changes: &Changes<'_>, state: &mut Transient);

    /// Runs only after the transaction committed.
    fn after_commit(&self, changes: &Changes<'_>, state: &mut Transient);

    /// Runs instead of `after_commit` when the transaction failed.
    fn after_rollback(&self, _state: &mut Transient) {}
}

/// Per-session scratch space for hooks, keyed by type.
#[derive(Default)]
pub struct Transient {
    values: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Transient {
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.values
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.values
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Read-only view of the entities staged in a session.
pub struct Changes<'s> {
    entries: &'s [Entry],
}

impl<'s> Changes<'s> {
    fn in_state(
        &self,
        state: EntryState,
    ) -> impl Iterator<Item = (EntryId, &'s dyn Persist)> + 's {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| entry.state == state)
            .map(|(index, entry)| (EntryId(index), entry.entity.as_ref()))
    }

    /// Entities registered for insertion.
    pub fn new_entities(&self) -> impl Iterator<Item = (EntryId, &'s dyn Persist)> + 's {
        self.in_state(EntryState::New)
    }

    /// Entities registered as modified.
    pub fn dirty_entities(&self) -> impl Iterator<Item = (EntryId, &'s dyn Persist)> + 's {
        self.in_state(EntryState::Dirty)
    }

    /// Entities registered for removal.
    pub fn deleted_entities(&self) -> impl Iterator<Item = (EntryId, &'s dyn Persist)> + 's {
        self.in_state(EntryState::Deleted)
    }

    pub fn get(&self, id: EntryId) -> Option<&'s dyn Persist> {
        self.entries.get(id.0).map(|entry| entry.entity.as_ref())
    }

    pub fn state(&self, id: EntryId) -> Option<EntryState> {
        self.entries.get(id.0).map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entities as persisted by a successful commit.
pub struct Committed {
    entries: Vec<Entry>,
}

impl Committed {
    /// The staged entity, with the id assigned on insert.
    pub fn get<E: Entity>(&self, id: EntryId) -> Option<&E> {
        self.entries
            .get(id.0)
            .and_then(|entry| entry.entity.as_any().downcast_ref::<E>())
    }

    /// Primary key of a staged entity after commit.
    pub fn id_of(&self, id: EntryId) -> Option<i64> {
        self.entries
            .get(id.0)
            .and_then(|entry| entry.entity.entity_id())
    }
}

impl std::fmt::Debug for Committed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Committed")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A unit of work: pending primary-store mutations finalized atomically.
pub struct Session<'db> {
    db: &'db Database,
    entries: Vec<Entry>,
    ops: Vec<Op>,
    transient: Transient,
}

impl<'db> Session<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self {
            db,
            entries: Vec::new(),
            ops: Vec::new(),
            transient: Transient::default(),
        }
    }

    /// The database this session commits to.
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Number of staged entities and statements.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn push(&mut self, state: EntryState, entity: Box<dyn Persist>) -> EntryId {
        let index = self.entries.len();
        self.entries.push(Entry { state, entity });
        self.ops.push(Op::Entry(index));
        EntryId(index)
    }

    /// Existing entry with the same table and primary key.
    fn find(&self, table: &str, id: i64) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.entity.entity_table() == table && entry.entity.entity_id() == Some(id)
        })
    }

    fn require_id<E: Entity>(entity: &E, action: &str) -> Result<i64> {
        entity.id().ok_or_else(|| {
            BlogError::validation(
                "id",
                format!("cannot {} a {} that was never persisted", action, E::TABLE),
            )
        })
    }

    /// Stage a new entity for insertion.
    ///
    /// An entity carrying the id of an already staged record joins that entry
    /// instead: re-adding a deleted record turns the removal into an update,
    /// otherwise the payload is replaced and the state kept.
    pub fn add<E: Entity>(&mut self, entity: E) -> EntryId {
        let existing = entity.id().and_then(|id| self.find(E::TABLE, id));
        match existing {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.state == EntryState::Deleted {
                    entry.state = EntryState::Dirty;
                }
                entry.entity = Box::new(entity);
                EntryId(index)
            }
            None => self.push(EntryState::New, Box::new(entity)),
        }
    }

    /// Stage a modified entity. Re-staging the same record replaces its payload.
    pub fn update<E: Entity>(&mut self, entity: E) -> Result<EntryId> {
        let id = Self::require_id(&entity, "update")?;

        match self.find(E::TABLE, id) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.state == EntryState::Deleted {
                    return Err(BlogError::validation(
                        "id",
                        format!("{} {} is already marked for deletion", E::TABLE, id),
                    ));
                }
                // New stays New: the insert will carry the latest values.
                entry.entity = Box::new(entity);
                Ok(EntryId(index))
            }
            None => Ok(self.push(EntryState::Dirty, Box::new(entity))),
        }
    }

    /// Stage a persisted entity for removal.
    pub fn delete<E: Entity>(&mut self, entity: E) -> Result<EntryId> {
        let id = Self::require_id(&entity, "delete")?;

        match self.find(E::TABLE, id) {
            Some(index) => {
                let entry = &mut self.entries[index];
                if entry.state == EntryState::New {
                    return Err(BlogError::validation(
                        "id",
                        format!("{} {} is pending insertion in this session", E::TABLE, id),
                    ));
                }
                entry.state = EntryState::Deleted;
                entry.entity = Box::new(entity);
                Ok(EntryId(index))
            }
            None => Ok(self.push(EntryState::Deleted, Box::new(entity))),
        }
    }

    /// Load a record by id and stage it for removal.
    pub fn delete_by_id<E: Entity>(&mut self, id: i64) -> Result<EntryId> {
        let entity = self
            .db
            .get::<E>(id)?
            .ok_or(BlogError::NotFound { entity: E::TABLE, id })?;
        self.delete(entity)
    }

    /// Stage a raw statement, run in order with the staged entities.
    pub fn execute(&mut self, sql: impl Into<String>, params: Vec<Value>) {
        self.ops.push(Op::Statement(StagedStatement {
            sql: sql.into(),
            params,
        }));
    }

    /// Apply every staged change in one transaction.
    ///
    /// Hooks see the staged set before the transaction starts, and again after
    /// it committed. A failed transaction is rolled back, hooks get
    /// `after_rollback`, and the error is returned.
    pub fn commit(mut self) -> Result<Committed> {
        let hooks = self.db.hooks();

        {
            let changes = Changes {
                entries: &self.entries,
            };
            for hook in &hooks {
                hook.before_commit(&changes, &mut self.transient);
            }
        }

        match self.flush() {
            Ok(()) => {
                debug!("Committed session with {} operations", self.ops.len());
                let changes = Changes {
                    entries: &self.entries,
                };
                for hook in &hooks {
                    hook.after_commit(&changes, &mut self.transient);
                }
                self.transient.clear();
                Ok(Committed {
                    entries: std::mem::take(&mut self.entries),
                })
            }
            Err(e) => {
                warn!("Session commit failed, rolled back: {}", e);
                for hook in &hooks {
                    hook.after_rollback(&mut self.transient);
                }
                self.transient.clear();
                Err(e)
            }
        }
    }

    /// Discard everything staged.
    pub fn rollback(self) {
        debug!("Discarded session with {} operations", self.ops.len());
    }

    fn flush(&mut self) -> Result<()> {
        let db = self.db;
        let mut conn = db.lock()?;
        let tx = conn.transaction()?;

        for op in &self.ops {
            match op {
                Op::Entry(index) => {
                    let entry = &mut self.entries[*index];
                    match entry.state {
                        EntryState::New => {
                            entry.entity.insert_row(&tx)?;
                        }
                        EntryState::Dirty => {
                            if entry.entity.update_row(&tx)? == 0 {
                                return Err(stale(entry.entity.as_ref()));
                            }
                        }
                        EntryState::Deleted => {
                            if entry.entity.delete_row(&tx)? == 0 {
                                return Err(stale(entry.entity.as_ref()));
                            }
                        }
                    }
                }
                Op::Statement(statement) => {
                    tx.execute(
                        &statement.sql,
                        rusqlite::params_from_iter(statement.params.iter()),
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

fn stale(entity: &dyn Persist) -> BlogError {
    BlogError::NotFound {
        entity: entity.entity_table(),
        id: entity.entity_id().unwrap_or_default(),
    }
}

/// Hooks are shared handles so a session can run them without holding the database.
pub(crate) type SharedHook = Arc<dyn CommitHook>;
