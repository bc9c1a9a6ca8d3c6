//! Per-group detail records, fetched lazily and at most once at a time.
//!
//! Each key maps to one entry for the lifetime of the cache. While a fetch is
//! running the entry holds a shared future that every caller awaits; a failure
//! evicts that future so the next request starts a new attempt.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use omr_core::{DetailRecord, GroupKey};
use omr_logging::{omr_debug, omr_warn};

use crate::{EvaluationService, ServiceError};

pub type Records = Arc<[DetailRecord]>;

type SharedFetch = Shared<BoxFuture<'static, Result<Records, ServiceError>>>;

/// Snapshot of one entry's fetch state.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    Unfetched,
    Loading,
    Loaded(Records),
    Failed(ServiceError),
}

enum Slot {
    Unfetched,
    Loading { generation: u64, fetch: SharedFetch },
    Loaded(Records),
    Failed(ServiceError),
}

struct CacheEntry {
    slot: Slot,
    visible: bool,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            slot: Slot::Unfetched,
            visible: false,
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<GroupKey, CacheEntry>,
    next_generation: u64,
}

impl CacheInner {
    /// Moves a `Loading` entry to its final state, unless a newer attempt has replaced it.
    fn settle(&mut self, key: &GroupKey, generation: u64, result: &Result<Records, ServiceError>) {
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };
        if !matches!(entry.slot, Slot::Loading { generation: current, .. } if current == generation)
        {
            return;
        }
        entry.slot = match result {
            Ok(records) => Slot::Loaded(Arc::clone(records)),
            Err(err) => {
                omr_warn!("grades for {} failed: {}", key, err);
                Slot::Failed(err.clone())
            }
        };
    }
}

#[derive(Clone)]
pub struct ResultCache {
    service: Arc<dyn EvaluationService>,
    inner: Arc<Mutex<CacheInner>>,
}

impl ResultCache {
    pub fn new(service: Arc<dyn EvaluationService>) -> Self {
        Self {
            service,
            inner: Arc::new(Mutex::new(CacheInner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the records for `key`, fetching them if needed.
    ///
    /// Concurrent calls for one key share a single request. A loaded key is
    /// served without touching the network; a failed key is retried.
    ///
    /// Must be called from within a Tokio runtime: the fetch is driven by its
    /// own task so it completes even if every caller stops waiting.
    pub async fn ensure_loaded(&self, key: &GroupKey) -> Result<Records, ServiceError> {
        let (generation, fetch) = {
            let mut guard = self.lock();
            let CacheInner {
                entries,
                next_generation,
            } = &mut *guard;
            let entry = entries.entry(key.clone()).or_default();
            let joined = match &entry.slot {
                Slot::Loaded(records) => return Ok(Arc::clone(records)),
                Slot::Loading { generation, fetch } => Some((*generation, fetch.clone())),
                Slot::Unfetched | Slot::Failed(_) => None,
            };
            match joined {
                Some(joined) => {
                    omr_debug!("joining in-flight fetch for {}", key);
                    joined
                }
                None => {
                    *next_generation += 1;
                    let generation = *next_generation;
                    let fetch = self.start_fetch(key.clone(), generation);
                    entry.slot = Slot::Loading {
                        generation,
                        fetch: fetch.clone(),
                    };
                    (generation, fetch)
                }
            }
        };

        let result = fetch.await;
        self.lock().settle(key, generation, &result);
        result
    }

    fn start_fetch(&self, key: GroupKey, generation: u64) -> SharedFetch {
        omr_debug!("fetching grades for {} (attempt {})", key, generation);
        let service = Arc::clone(&self.service);
        let fetch_key = key.clone();
        let fetch = async move {
            service
                .fetch_grades(&fetch_key)
                .await
                .map(Records::from)
        }
        .boxed()
        .shared();

        let driver = fetch.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = driver.await;
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .settle(&key, generation, &result);
        });
        fetch
    }

    /// Flips the visibility flag and returns the new value. Fetch state is untouched.
    pub fn toggle_visible(&self, key: &GroupKey) -> bool {
        let mut inner = self.lock();
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.visible = !entry.visible;
        entry.visible
    }

    pub fn set_visible(&self, key: &GroupKey, visible: bool) {
        self.lock().entries.entry(key.clone()).or_default().visible = visible;
    }

    pub fn is_visible(&self, key: &GroupKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.visible)
            .unwrap_or(false)
    }

    /// `None` when the key has never been requested or toggled.
    pub fn state(&self, key: &GroupKey) -> Option<CacheState> {
        self.lock().entries.get(key).map(|entry| match &entry.slot {
            Slot::Unfetched => CacheState::Unfetched,
            Slot::Loading { .. } => CacheState::Loading,
            Slot::Loaded(records) => CacheState::Loaded(Arc::clone(records)),
            Slot::Failed(err) => CacheState::Failed(err.clone()),
        })
    }
}
