//! Windowed navigation over one owner's ordered collection.
//!
//! A requested logical position is resolved with a single offset/limit range
//! query wide enough to carry the item and its immediate temporal neighbors;
//! rows are then mapped positionally. Index 0 always denotes the most recent
//! item under the active ordering, so nothing is ever newer than position 0.

use serde::Serialize;

use crate::store::{OrderMode, Poem, PoemStore, StoreError};

/// Fixed page size of the flat listing variant.
pub const PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct IndexedPoem {
    #[serde(flatten)]
    pub poem: Poem,
    /// Resolved logical position under the active ordering.
    pub index: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborView {
    pub current_poem: Option<IndexedPoem>,
    pub next_poem: Option<IndexedPoem>,
    pub previous_poem: Option<IndexedPoem>,
}

fn at(poem: Poem, index: usize) -> Option<IndexedPoem> {
    Some(IndexedPoem { poem, index })
}

/// Resolve the item at `index` plus its newer (`next`) and older
/// (`previous`) neighbors. Positions past the end of the collection and an
/// empty collection both come back as null slots, never an error.
pub async fn neighbors(
    store: &dyn PoemStore,
    owner_id: &str,
    index: usize,
    order: OrderMode,
    favorites_only: bool,
) -> Result<NeighborView, StoreError> {
    let offset = index.saturating_sub(1);
    let size = if index == 0 { 2 } else { 3 };
    let rows = store
        .list_window(owner_id, order, favorites_only, offset, size)
        .await?;

    let mut rows = rows.into_iter();
    let mut view = NeighborView::default();
    if index == 0 {
        view.current_poem = rows.next().and_then(|p| at(p, 0));
        view.previous_poem = rows.next().and_then(|p| at(p, 1));
    } else {
        view.next_poem = rows.next().and_then(|p| at(p, index - 1));
        view.current_poem = rows.next().and_then(|p| at(p, index));
        view.previous_poem = rows.next().and_then(|p| at(p, index + 1));
    }
    Ok(view)
}

/// Flat listing: fixed page size, 1-based page number.
pub async fn page(
    store: &dyn PoemStore,
    owner_id: &str,
    page: usize,
    order: OrderMode,
) -> Result<Vec<Poem>, StoreError> {
    let page = page.max(1);
    store
        .list_window(owner_id, order, false, (page - 1) * PAGE_SIZE, PAGE_SIZE)
        .await
}
