//! The contract an entity implements to be mirrored into the search index.

use crate::store::{Entity, Indexed};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value, as copied into the index.
pub type FieldMap = BTreeMap<String, String>;

/// An entity type that opts into full-text indexing.
///
/// `SEARCHABLE_FIELDS` controls exactly which values are copied into the
/// index record. The supertrait bound ties this impl to `type Index = Indexed`
/// on the [`Entity`] impl, so a type is either searched and synced on commit,
/// or neither. Declaring one half without the other does not compile:
///
/// ```compile_fail
/// use microblog_core::search::Searchable;
/// use microblog_core::store::{Entity, Unindexed};
/// use rusqlite::{Connection, Row};
///
/// struct Draft {
///     id: Option<i64>,
///     text: String,
/// }
///
/// impl Entity for Draft {
///     const TABLE: &'static str = "draft";
///     const COLUMNS: &'static [&'static str] = &["id", "text"];
///     type Index = Unindexed;
///
///     fn id(&self) -> Option<i64> { self.id }
///     fn set_id(&mut self, id: i64) { self.id = Some(id); }
///     fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Self { id: row.get(0)?, text: row.get(1)? })
///     }
///     fn insert(&self, _conn: &Connection) -> rusqlite::Result<i64> { Ok(0) }
///     fn update(&self, _conn: &Connection) -> rusqlite::Result<usize> { Ok(0) }
/// }
///
/// impl Searchable for Draft {
///     const SEARCHABLE_FIELDS: &'static [&'static str] = &["text"];
///     fn field_value(&self, _field: &str) -> Option<String> { Some(self.text.clone()) }
/// }
/// ```
pub trait Searchable: Entity<Index = Indexed> {
    const SEARCHABLE_FIELDS: &'static [&'static str];

    /// Index namespace; one per entity type.
    fn namespace() -> &'static str {
        Self::TABLE
    }

    /// Current value of a declared field. `None` leaves the field out of the record.
    fn field_value(&self, field: &str) -> Option<String>;
}

/// Object-safe projection of a [`Searchable`] entity into an index record.
pub trait IndexSource {
    fn index_namespace(&self) -> &'static str;

    fn index_id(&self) -> Option<i64>;

    fn index_fields(&self) -> FieldMap;

    /// The record to upsert, or `None` while the entity has no primary key.
    fn index_record(&self) -> Option<IndexRecord> {
        Some(IndexRecord {
            namespace: self.index_namespace().to_string(),
            id: self.index_id()?,
            fields: self.index_fields(),
        })
    }
}

impl<T: Searchable> IndexSource for T {
    fn index_namespace(&self) -> &'static str {
        T::namespace()
    }

    fn index_id(&self) -> Option<i64> {
        Entity::id(self)
    }

    fn index_fields(&self) -> FieldMap {
        T::SEARCHABLE_FIELDS
            .iter()
            .filter_map(|field| {
                self.field_value(field)
                    .map(|value| (field.to_string(), value))
            })
            .collect()
    }
}

/// External, denormalized copy of one entity's searchable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub namespace: String,
    pub id: i64,
    pub fields: FieldMap,
}
