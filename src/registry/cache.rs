//! In-memory cache for loaded ground truth.
//!
//! Entries are keyed by the exact load arguments and live until evicted or
//! cleared. Ground truth is treated as immutable for the duration of a run,
//! so there is no TTL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{Documentation, KnownLibraries};

/// Cache key for a known-libraries load.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryKey {
    pub path: PathBuf,
    pub include_stdlib: bool,
    pub include_valid_extras: bool,
}

/// Shared cache for registry loads.
#[derive(Default)]
pub struct RegistryCache {
    libraries: RwLock<HashMap<LibraryKey, Arc<KnownLibraries>>>,
    documentation: RwLock<HashMap<PathBuf, Arc<Documentation>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get cached known libraries for a key.
    pub fn get_libraries(&self, key: &LibraryKey) -> Option<Arc<KnownLibraries>> {
        let cache = self.libraries.read().ok()?;
        let found = cache.get(key).cloned();
        self.record(found.is_some());
        found
    }

    /// Store known libraries for a key.
    pub fn set_libraries(&self, key: LibraryKey, value: Arc<KnownLibraries>) {
        if let Ok(mut cache) = self.libraries.write() {
            cache.insert(key, value);
        }
    }

    /// Get cached documentation for a file.
    pub fn get_documentation(&self, path: &Path) -> Option<Arc<Documentation>> {
        let cache = self.documentation.read().ok()?;
        let found = cache.get(path).cloned();
        self.record(found.is_some());
        found
    }

    /// Store documentation for a file.
    pub fn set_documentation(&self, path: PathBuf, value: Arc<Documentation>) {
        if let Ok(mut cache) = self.documentation.write() {
            cache.insert(path, value);
        }
    }

    /// Drop every entry loaded from `path`.
    pub fn evict_path(&self, path: &Path) {
        if let Ok(mut cache) = self.libraries.write() {
            cache.retain(|key, _| key.path != path);
        }
        if let Ok(mut cache) = self.documentation.write() {
            cache.remove(path);
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.libraries.write() {
            cache.clear();
        }
        if let Ok(mut cache) = self.documentation.write() {
            cache.clear();
        }
    }

    /// Cache (hits, misses) since creation.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}
