//! # Catalog Module
//!
//! An in-memory snapshot of the canonical ingredient catalog, plus an optional
//! process-wide cache for snapshots.
//!
//! A snapshot exposes the three views reconciliation needs: the catalog names
//! ordered longest-first (so that ties prefer the more specific name), a
//! case-insensitive name → id map, and an id → canonical unit map.
//!
//! The cache is disabled with a zero TTL, in which case every run loads a
//! fresh snapshot. With a positive TTL a snapshot is reused until it expires
//! or [`CatalogCache::invalidate`] is called after a catalog mutation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::model::{CatalogEntry, IngredientId};
use crate::units::normalize_unit;

/// Immutable view of the catalog for one reconciliation run
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    entries: Vec<CatalogEntry>,
    names_longest_first: Vec<String>,
    name_to_id: HashMap<String, IngredientId>,
    id_to_unit: HashMap<IngredientId, String>,
    id_to_name: HashMap<IngredientId, String>,
}

impl CatalogSnapshot {
    /// Build a snapshot from catalog rows
    ///
    /// Units are normalized; an entry with a blank unit gets no unit mapping.
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut names_longest_first: Vec<String> =
            entries.iter().map(|e| e.canonical_name.clone()).collect();
        names_longest_first.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut name_to_id = HashMap::new();
        let mut id_to_unit = HashMap::new();
        let mut id_to_name = HashMap::new();

        for entry in &entries {
            name_to_id.insert(name_key(&entry.canonical_name), entry.id);
            id_to_name.insert(entry.id, entry.canonical_name.clone());
            if let Some(unit) = normalize_unit(&entry.canonical_unit) {
                id_to_unit.insert(entry.id, unit);
            }
        }

        Self {
            entries,
            names_longest_first,
            name_to_id,
            id_to_unit,
            id_to_name,
        }
    }

    /// Catalog names, longest first
    pub fn names(&self) -> &[String] {
        &self.names_longest_first
    }

    /// Case-insensitive lookup of an ingredient id by canonical name
    pub fn id_for(&self, name: &str) -> Option<IngredientId> {
        self.name_to_id.get(&name_key(name)).copied()
    }

    /// Canonical name exactly as stored in the catalog
    pub fn canonical_name(&self, id: IngredientId) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    /// Normalized canonical unit of an ingredient
    pub fn unit_of(&self, id: IngredientId) -> Option<&str> {
        self.id_to_unit.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug)]
struct CachedSnapshot {
    loaded_at: Instant,
    snapshot: Arc<CatalogSnapshot>,
}

/// Time-bounded cache holding at most one catalog snapshot
///
/// # Invalidation
///
/// - The snapshot expires `ttl` after it was loaded
/// - [`invalidate`](Self::invalidate) drops it immediately; call it after any
///   catalog insert, rename or unit change
/// - A zero `ttl` disables caching entirely
#[derive(Debug)]
pub struct CatalogCache {
    ttl: Duration,
    slot: Mutex<Option<CachedSnapshot>>,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// A cache that never holds anything, so every run reloads the catalog
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// The cached snapshot, if one exists and has not expired
    pub fn get(&self) -> Option<Arc<CatalogSnapshot>> {
        if !self.is_enabled() {
            return None;
        }

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(cached) if cached.loaded_at.elapsed() < self.ttl => {
                Some(Arc::clone(&cached.snapshot))
            }
            Some(_) => {
                debug!("Catalog snapshot expired");
                *slot = None;
                None
            }
            None => None,
        }
    }

    /// Store a freshly loaded snapshot and hand it back
    pub fn store(&self, snapshot: CatalogSnapshot) -> Arc<CatalogSnapshot> {
        let snapshot = Arc::new(snapshot);
        if self.is_enabled() {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(CachedSnapshot {
                loaded_at: Instant::now(),
                snapshot: Arc::clone(&snapshot),
            });
        }
        snapshot
    }

    /// Drop the cached snapshot
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            info!("Catalog cache invalidated");
        }
    }

    /// Return the cached snapshot or load, cache and return a new one
    pub async fn get_or_load<F, Fut, E>(&self, load: F) -> Result<Arc<CatalogSnapshot>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<CatalogEntry>, E>>,
    {
        if let Some(snapshot) = self.get() {
            debug!(entries = snapshot.len(), "Using cached catalog snapshot");
            return Ok(snapshot);
        }

        let entries = load().await?;
        info!(entries = entries.len(), "Loaded catalog snapshot");
        Ok(self.store(CatalogSnapshot::new(entries)))
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::disabled()
    }
}
