//! In-memory cache of parsed uploads.
//!
//! Maps an upload's file name to its parsed [`RecordTable`]. Entries are
//! written once per upload and shared read-only afterwards; re-uploading a
//! file of the same name replaces the entry. Callers use
//! [`TableCache::get_or_load`] so that a stored file is parsed at most once
//! per process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use press_core::models::RecordTable;
use press_core::Result;
use tracing::debug;

// ── Entry ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CacheEntry {
    table: Arc<RecordTable>,
    loaded_at: DateTime<Utc>,
}

// ── TableCache ────────────────────────────────────────────────────────────────

/// Thread-safe file name to table map.
///
/// # Example
/// ```
/// use press_runtime::cache::TableCache;
/// use press_core::models::RecordTable;
///
/// let cache = TableCache::new();
/// cache.insert("a.csv", RecordTable::new(vec!["sn".into()], vec![]));
/// assert!(cache.get("a.csv").is_some());
/// ```
#[derive(Debug, Default)]
pub struct TableCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Cached table for `filename`, if any.
    pub fn get(&self, filename: &str) -> Option<Arc<RecordTable>> {
        let entry = self.read().get(filename).map(|e| Arc::clone(&e.table));
        if entry.is_some() {
            debug!(filename, "table cache hit");
        }
        entry
    }

    /// Store `table` under `filename`, replacing any previous entry.
    pub fn insert(&self, filename: &str, table: RecordTable) -> Arc<RecordTable> {
        let table = Arc::new(table);
        let entry = CacheEntry {
            table: Arc::clone(&table),
            loaded_at: Utc::now(),
        };
        if self.write().insert(filename.to_string(), entry).is_some() {
            debug!(filename, "table cache entry replaced");
        }
        table
    }

    /// Cached table for `filename`, or the result of `load` which is then
    /// cached. A failing loader leaves the cache untouched.
    pub fn get_or_load<F>(&self, filename: &str, load: F) -> Result<Arc<RecordTable>>
    where
        F: FnOnce() -> Result<RecordTable>,
    {
        if let Some(table) = self.get(filename) {
            return Ok(table);
        }
        debug!(filename, "table cache miss");
        let table = load()?;

        // Another caller may have loaded the same file meanwhile; keep theirs.
        let mut entries = self.write();
        let entry = entries
            .entry(filename.to_string())
            .or_insert_with(|| CacheEntry {
                table: Arc::new(table),
                loaded_at: Utc::now(),
            });
        Ok(Arc::clone(&entry.table))
    }

    /// Drop the entry for `filename`. Returns whether one existed.
    pub fn invalidate(&self, filename: &str) -> bool {
        self.write().remove(filename).is_some()
    }

    /// When the entry for `filename` was stored.
    pub fn loaded_at(&self, filename: &str) -> Option<DateTime<Utc>> {
        self.read().get(filename).map(|e| e.loaded_at)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // ── Private helpers ───────────────────────────────────────────────────

    // A poisoned lock only means a panic happened mid-insert; the map itself
    // is still consistent, so keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
