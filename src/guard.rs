//! Owner-gated mutation and deletion.
//!
//! Every write to an existing poem goes through here: fetch, ownership
//! check, then a revision-conditional write. A conflict means another
//! writer landed between the read and the write; the loop re-reads and
//! re-runs the ownership check before trying again, so the check is never
//! bypassed and no update is ever lost.

use tracing::debug;

use crate::error::AppError;
use crate::store::{CasOutcome, Poem, PoemStore, StoreError};

fn datastore_failed(err: StoreError) -> AppError {
    AppError::upstream("datastore", err.to_string().as_str())
}

fn poem_not_found() -> AppError {
    AppError::not_found("poem_not_found", "poem does not exist")
}

fn not_owner() -> AppError {
    AppError::forbidden("not_owner", "only the owner may change this poem")
}

/// Set the favorite flag to `explicit` when supplied, else flip the current
/// value. Returns the updated poem.
pub async fn set_or_toggle_favorite(
    store: &dyn PoemStore,
    subject_id: &str,
    poem_id: &str,
    explicit: Option<bool>,
) -> Result<Poem, AppError> {
    loop {
        let Some(poem) = store.get(poem_id).await.map_err(datastore_failed)? else {
            return Err(poem_not_found());
        };
        if poem.owner_id != subject_id {
            return Err(not_owner());
        }
        let target = explicit.unwrap_or(!poem.is_favorite);
        match store
            .set_favorite(poem_id, poem.revision, target)
            .await
            .map_err(datastore_failed)?
        {
            CasOutcome::Applied(updated) => return Ok(updated),
            CasOutcome::Conflict => {
                debug!(poem_id, "favorite write conflicted, retrying");
                continue;
            }
            CasOutcome::Missing => return Err(poem_not_found()),
        }
    }
}

/// Delete a poem owned by the caller.
pub async fn delete_owned(
    store: &dyn PoemStore,
    subject_id: &str,
    poem_id: &str,
) -> Result<(), AppError> {
    loop {
        let Some(poem) = store.get(poem_id).await.map_err(datastore_failed)? else {
            return Err(poem_not_found());
        };
        if poem.owner_id != subject_id {
            return Err(not_owner());
        }
        match store
            .delete(poem_id, poem.revision)
            .await
            .map_err(datastore_failed)?
        {
            CasOutcome::Applied(()) => return Ok(()),
            CasOutcome::Conflict => {
                debug!(poem_id, "delete conflicted, retrying");
                continue;
            }
            CasOutcome::Missing => return Err(poem_not_found()),
        }
    }
}
