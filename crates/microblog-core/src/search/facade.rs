//! Text search resolved against the primary store.

use super::client::IndexClient;
use super::searchable::Searchable;
use crate::error::Result;
use crate::store::{Database, Page, Pagination};
use std::collections::HashMap;
use tracing::debug;

/// Search entities of type `T` and return one page of them in relevance order.
///
/// The index only supplies ids and the total; entities are loaded from the
/// primary store in one batch and put back in the index's order. Ids the
/// store no longer has are dropped, while `total` stays the index's count.
pub fn search<T: Searchable>(
    db: &Database,
    index: &IndexClient,
    text: &str,
    page: u32,
    per_page: u32,
) -> Result<Page<T>> {
    let pagination = Pagination::new(page, per_page)?;

    if !index.is_enabled() {
        return Ok(Page::empty(pagination));
    }

    let hits = index.query(
        T::namespace(),
        text,
        pagination.offset(),
        pagination.limit(),
    );
    if hits.total == 0 || hits.ids.is_empty() {
        return Ok(Page::new(Vec::new(), hits.total, pagination));
    }

    let mut items = db.fetch_by_ids::<T>(&hits.ids)?;
    if items.len() < hits.ids.len() {
        debug!(
            "{} of {} {} hits are gone from the store",
            hits.ids.len() - items.len(),
            hits.ids.len(),
            T::namespace()
        );
    }

    let rank: HashMap<i64, usize> = hits
        .ids
        .iter()
        .enumerate()
        .map(|(position, id)| (*id, position))
        .collect();
    items.sort_by_key(|item| item.id().and_then(|id| rank.get(&id).copied()));

    Ok(Page::new(items, hits.total, pagination))
}
