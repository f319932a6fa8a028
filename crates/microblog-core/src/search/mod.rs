//! Full-text search kept in step with the primary store.
//!
//! This module provides:
//! - The [`Searchable`] contract entities implement to be indexed
//! - [`IndexClient`], a fault-tolerant handle on a [`SearchBackend`]
//! - [`Fts5Index`], the SQLite FTS5 backend
//! - [`ChangeTracker`] and [`IndexSynchronizer`], joined by the [`IndexSync`] commit hook
//! - [`search`], text queries resolved to entities in relevance order

mod backend;
mod client;
mod facade;
mod fts5;
mod query;
mod searchable;
mod sync;
mod tracker;

pub use backend::{QueryHits, SearchBackend};
pub use client::IndexClient;
pub use facade::search;
pub use fts5::{FTS5Config, FTS5Stats, Fts5Index};
pub use query::{build_fts5_query, escape_fts5_term};
pub use searchable::{FieldMap, IndexRecord, IndexSource, Searchable};
pub use sync::{IndexSync, IndexSynchronizer};
pub use tracker::{ChangeSnapshot, ChangeTracker};
