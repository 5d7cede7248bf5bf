//! Process-wide allowlist cache.
//!
//! The set of authorized subject identifiers is kept fresh by a long-lived
//! subscription against the allowlist collection. Snapshots arrive on a
//! single-slot `watch` channel (most recent wins); one writer task
//! materializes each snapshot into a brand-new set and installs it with a
//! single pointer swap, so readers never observe a partially built set and
//! never block on the writer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One document of the allowlist collection. Created by the admin surface
/// (out of scope here); this process only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AllowlistEntry {
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_poem_ref: Option<String>,
}

impl AllowlistEntry {
    pub fn new<S: Into<String>>(subject_id: S) -> Self {
        AllowlistEntry {
            subject_id: subject_id.into(),
            api_key: None,
            timezone: None,
            pen_name: None,
            theme_mode: None,
            display_poem_ref: None,
        }
    }
}

/// What an empty set means. `Open` treats an empty cache as "no restriction
/// configured" (every subject passes); `Closed` denies everyone until the
/// first snapshot lands. Cold starts and subscription outages look identical
/// to an intentionally empty collection, so the choice is configuration, not
/// inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    Open,
    Closed,
}

impl EmptyPolicy {
    pub fn parse(raw: &str) -> Option<EmptyPolicy> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Some(EmptyPolicy::Open),
            "closed" => Some(EmptyPolicy::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    entries: HashMap<String, AllowlistEntry>,
}

struct CacheInner {
    current: RwLock<Arc<Snapshot>>,
    policy: EmptyPolicy,
}

/// Shared handle to the current allowlist set. Cloning is cheap; all clones
/// observe the same set. Reads take the lock only long enough to clone the
/// `Arc`, so a reader always works against one consistent snapshot.
#[derive(Clone)]
pub struct AllowlistCache {
    inner: Arc<CacheInner>,
}

impl AllowlistCache {
    pub fn new(policy: EmptyPolicy) -> Self {
        AllowlistCache {
            inner: Arc::new(CacheInner {
                current: RwLock::new(Arc::new(Snapshot::default())),
                policy,
            }),
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.current.read().clone()
    }

    /// Non-blocking membership check against the current set.
    pub fn is_allowed(&self, subject_id: &str) -> bool {
        let snap = self.snapshot();
        if snap.entries.is_empty() {
            return self.inner.policy == EmptyPolicy::Open;
        }
        snap.entries.contains_key(subject_id)
    }

    /// Look up the full entry for a subject, if present in the current set.
    pub fn entry(&self, subject_id: &str) -> Option<AllowlistEntry> {
        self.snapshot().entries.get(subject_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().entries.is_empty()
    }

    /// Materialize a fresh set and install it with a single swap.
    pub fn replace<I: IntoIterator<Item = AllowlistEntry>>(&self, entries: I) {
        let mut map = HashMap::new();
        for entry in entries {
            map.insert(entry.subject_id.clone(), entry);
        }
        let next = Arc::new(Snapshot { entries: map });
        *self.inner.current.write() = next;
    }
}

/// One delivery from the subscription: a full snapshot, or a subscription
/// error surfaced by the feed adapter.
#[derive(Debug, Clone)]
pub enum AllowlistUpdate {
    Snapshot(Vec<AllowlistEntry>),
    Failed(String),
}

/// Single-slot delivery channel. The slot starts empty; a slow consumer only
/// ever sees the most recent delivery.
pub fn update_channel() -> (watch::Sender<Option<AllowlistUpdate>>, watch::Receiver<Option<AllowlistUpdate>>) {
    watch::channel(None)
}

/// Spawn the cache's single writer task. Snapshots replace the visible set;
/// failures are logged and the last-known set keeps serving. The task ends
/// when every sender is gone, leaving the cache on whatever it last saw.
pub fn spawn_refresh(
    cache: AllowlistCache,
    mut rx: watch::Receiver<Option<AllowlistUpdate>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if rx.changed().await.is_err() {
                debug!("allowlist feed closed; cache keeps last-known set");
                break;
            }
            let update = rx.borrow_and_update().clone();
            match update {
                Some(AllowlistUpdate::Snapshot(entries)) => {
                    let count = entries.len();
                    cache.replace(entries);
                    info!(subjects = count, "allowlist snapshot installed");
                }
                Some(AllowlistUpdate::Failed(err)) => {
                    warn!("allowlist subscription error, keeping last-known set: {}", err);
                }
                None => {}
            }
        }
    })
}

/// Local stand-in for the external streaming subscription: polls a JSON file
/// holding an array of allowlist entries and pushes a snapshot per poll.
/// Read or parse errors are delivered as subscription failures so the
/// refresh task applies the standard stale-but-available handling.
pub fn spawn_file_feed(
    path: PathBuf,
    interval: Duration,
    tx: watch::Sender<Option<AllowlistUpdate>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let update = match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Vec<AllowlistEntry>>(&bytes) {
                    Ok(entries) => AllowlistUpdate::Snapshot(entries),
                    Err(e) => AllowlistUpdate::Failed(format!("{}: {}", path.display(), e)),
                },
                Err(e) => AllowlistUpdate::Failed(format!("{}: {}", path.display(), e)),
            };
            if tx.send(Some(update)).is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    })
}
