//! Poem documents and the datastore boundary.
//!
//! The real query engine lives behind `PoemStore`; this crate only depends
//! on ordered range queries and revision-conditional writes. `MemoryStore`
//! is the process-local implementation used for local deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Poem {
    pub id: String,
    /// Set once at creation, never reassigned.
    pub owner_id: String,
    pub title: String,
    pub text: String,
    /// Ordered color codes extracted from the source image.
    pub palette: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_alias: Option<String>,
    /// Store-maintained write counter backing conditional updates. Not part
    /// of the wire shape.
    #[serde(skip)]
    pub revision: u64,
}

impl Poem {
    pub fn new<S: Into<String>>(owner_id: S, title: S, text: S, palette: Vec<String>) -> Self {
        Poem {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            title: title.into(),
            text: text.into(),
            palette,
            created_at: Utc::now(),
            is_favorite: false,
            derived_asset_url: None,
            author_alias: None,
            revision: 0,
        }
    }
}

/// The two orderings a collection can be walked in. Index 0 is always the
/// most recent item under the active ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    /// `isFavorite` descending, then `createdAt` descending.
    FavoriteFirst,
    /// `createdAt` descending only.
    DateOnly,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

/// Result of a revision-conditional write.
#[derive(Debug, PartialEq)]
pub enum CasOutcome<T> {
    Applied(T),
    /// The document moved on since it was read; re-read and retry.
    Conflict,
    Missing,
}

#[async_trait]
pub trait PoemStore: Send + Sync {
    async fn create(&self, poem: Poem) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Poem>, StoreError>;

    /// One offset/limit slice of a single owner's collection under the given
    /// ordering, optionally restricted to favorites.
    async fn list_window(
        &self,
        owner_id: &str,
        order: OrderMode,
        favorites_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Poem>, StoreError>;

    /// Set the favorite flag iff the document is still at `expected_revision`.
    async fn set_favorite(
        &self,
        id: &str,
        expected_revision: u64,
        value: bool,
    ) -> Result<CasOutcome<Poem>, StoreError>;

    /// Delete iff the document is still at `expected_revision`.
    async fn delete(&self, id: &str, expected_revision: u64) -> Result<CasOutcome<()>, StoreError>;
}

/// Process-local revisioned document store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, Poem>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

fn compare(order: OrderMode, a: &Poem, b: &Poem) -> std::cmp::Ordering {
    match order {
        OrderMode::FavoriteFirst => b
            .is_favorite
            .cmp(&a.is_favorite)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id)),
        OrderMode::DateOnly => b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)),
    }
}

#[async_trait]
impl PoemStore for MemoryStore {
    async fn create(&self, poem: Poem) -> Result<(), StoreError> {
        self.inner.write().insert(poem.id.clone(), poem);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Poem>, StoreError> {
        Ok(self.inner.read().get(id).cloned())
    }

    async fn list_window(
        &self,
        owner_id: &str,
        order: OrderMode,
        favorites_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Poem>, StoreError> {
        let mut rows: Vec<Poem> = self
            .inner
            .read()
            .values()
            .filter(|p| p.owner_id == owner_id && (!favorites_only || p.is_favorite))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare(order, a, b));
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn set_favorite(
        &self,
        id: &str,
        expected_revision: u64,
        value: bool,
    ) -> Result<CasOutcome<Poem>, StoreError> {
        let mut map = self.inner.write();
        let Some(poem) = map.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };
        if poem.revision != expected_revision {
            return Ok(CasOutcome::Conflict);
        }
        poem.is_favorite = value;
        poem.revision += 1;
        Ok(CasOutcome::Applied(poem.clone()))
    }

    async fn delete(&self, id: &str, expected_revision: u64) -> Result<CasOutcome<()>, StoreError> {
        let mut map = self.inner.write();
        let Some(poem) = map.get(id) else {
            return Ok(CasOutcome::Missing);
        };
        if poem.revision != expected_revision {
            return Ok(CasOutcome::Conflict);
        }
        map.remove(id);
        Ok(CasOutcome::Applied(()))
    }
}
