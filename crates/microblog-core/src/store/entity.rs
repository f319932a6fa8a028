//! Row mapping for persisted records.

use crate::search::{IndexSource, Searchable};
use rusqlite::{params, Connection, Row};
use std::any::Any;

/// A record type stored in its own table of the primary store.
///
/// `COLUMNS` lists the select order read back by [`Entity::from_row`], with
/// `id` first. Inserting with `id == None` lets SQLite assign the rowid.
///
/// `Index` is [`Unindexed`] for plain records and [`Indexed`] for types
/// implementing [`Searchable`]; each choice only compiles with the other half.
pub trait Entity: Sized + Send + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    type Index: IndexPolicy<Self>;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Insert a row and return its primary key.
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64>;

    /// Update the row matching `self.id()`; returns affected rows.
    fn update(&self, conn: &Connection) -> rusqlite::Result<usize>;

    /// `SELECT <columns> FROM <table>` prefix for hand-written queries.
    fn select_clause() -> String {
        format!("SELECT {} FROM {}", Self::COLUMNS.join(", "), Self::TABLE)
    }
}

/// Whether commits mirror an entity type into the search index.
pub trait IndexPolicy<E> {
    fn source(entity: &E) -> Option<&dyn IndexSource>;
}

/// Kept out of the search index.
pub struct Unindexed;

impl<E> IndexPolicy<E> for Unindexed {
    fn source(_entity: &E) -> Option<&dyn IndexSource> {
        None
    }
}

/// Mirrored into the search index on every commit.
pub struct Indexed;

impl<E: Searchable> IndexPolicy<E> for Indexed {
    fn source(entity: &E) -> Option<&dyn IndexSource> {
        Some(entity)
    }
}

/// Object-safe view of an [`Entity`] held by a unit of work.
pub trait Persist: Send {
    fn entity_table(&self) -> &'static str;

    fn entity_id(&self) -> Option<i64>;

    fn insert_row(&mut self, conn: &Connection) -> rusqlite::Result<i64>;

    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize>;

    fn delete_row(&self, conn: &Connection) -> rusqlite::Result<usize>;

    fn searchable(&self) -> Option<&dyn IndexSource>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> Persist for E {
    fn entity_table(&self) -> &'static str {
        E::TABLE
    }

    fn entity_id(&self) -> Option<i64> {
        Entity::id(self)
    }

    fn insert_row(&mut self, conn: &Connection) -> rusqlite::Result<i64> {
        let id = Entity::insert(self, conn)?;
        self.set_id(id);
        Ok(id)
    }

    fn update_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        Entity::update(self, conn)
    }

    fn delete_row(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", E::TABLE);
        conn.execute(&sql, params![Entity::id(self)])
    }

    fn searchable(&self) -> Option<&dyn IndexSource> {
        <E::Index as IndexPolicy<E>>::source(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
