//! Ground-truth registries.
//!
//! Two JSON documents define what is "real":
//! - A package registry, `{"datetime": ..., "data": [names...]}`, usually a
//!   snapshot of the PyPI simple index
//! - Per-library documentation, `{"data": {lib: {modules, members, latest,
//!   versions}}}`
//!
//! Both are loaded through [`GroundTruth`], which caches every load by its
//! exact arguments. Missing or malformed files are fatal.

mod cache;
mod pypi;
mod stdlib;

pub use cache::{LibraryKey, RegistryCache};
pub use pypi::{download_pypi_data, parse_simple_index, write_registry_file, PYPI_SIMPLE_INDEX_URL};
pub use stdlib::{is_stdlib, stdlib_modules, PYTHON_VERSION};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{HalluError, Result};
use crate::normalize::normalize;

/// Default package registry location, relative to the working directory.
pub const DEFAULT_PYPI_PACKAGES_FILE: &str = "data/libraries/pypi_data.json";

/// Default documentation location, relative to the working directory.
pub const DEFAULT_DOCUMENTATION_FILE: &str = "data/libraries/documentation.json";

/// Import names that are valid but absent from the package index because
/// they differ from their distribution name. Curated by hand, not exhaustive.
pub const KNOWN_VALID_IMPORTS: &[&str] = &[
    // django utils
    "rest_framework",
    "timezone_utils",
    // scikit naming confusion
    "sklearn_extra",
    "sktensor",
    "skdiscovery",
    "skbio",
    "autosklearn",
    // other mismatches
    "simplecrypt",
    "string_utils",
    "mpl_toolkits",
    "agateremote",
    "github3",
    "cairo",
    "erfa",
    "gnuplot",
    "pyximport",
    "scikitplot",
    "dateutil",
];

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    datetime: Option<String>,
    data: Vec<String>,
}

#[derive(Deserialize)]
struct DocumentationFile {
    data: BTreeMap<String, DocumentationEntry>,
}

#[derive(Deserialize)]
struct DocumentationEntry {
    modules: Vec<String>,
    members: Vec<String>,
    latest: String,
    versions: Vec<String>,
}

/// The set of library names considered real.
///
/// Every entry is normalized, and lookups normalize the query, so names
/// differing only in case or separator style compare equal.
#[derive(Debug, Clone, Default)]
pub struct KnownLibraries {
    names: BTreeSet<String>,
    fetched_at: Option<String>,
}

impl KnownLibraries {
    /// Build from raw names, normalizing each.
    pub fn from_names<I, S>(names: I, fetched_at: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| normalize(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
        Self { names, fetched_at }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Snapshot timestamp recorded in the registry file, if any.
    pub fn fetched_at(&self) -> Option<&str> {
        self.fetched_at.as_deref()
    }
}

/// Documentation for one library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryDocs {
    /// Dotted module prefixes that belong to the library.
    pub modules: BTreeSet<String>,
    /// Documented member paths, lowercased.
    pub members: BTreeSet<String>,
    /// Latest known version.
    pub latest: String,
    /// Known versions in file order.
    pub versions: Vec<String>,
}

impl LibraryDocs {
    /// Whether a dotted path sits under one of the library's modules.
    pub fn owns(&self, path: &str) -> bool {
        self.modules.iter().any(|module| {
            path.strip_prefix(module.as_str())
                .map_or(false, |rest| rest.is_empty() || rest.starts_with('.'))
        })
    }

    /// Whether a member path matches a documented entry.
    ///
    /// Matching is case-insensitive and prefix based in both directions, but
    /// only at component boundaries: `numpy.array.T` matches a documented
    /// `numpy.array`, and `numpy.linalg` matches `numpy.linalg.norm`, while
    /// `numpy.arr` matches neither.
    pub fn documents(&self, member: &str) -> bool {
        let member = member.to_lowercase();
        self.members.iter().any(|documented| {
            if let Some(rest) = member.strip_prefix(documented.as_str()) {
                return rest.is_empty() || rest.starts_with('.');
            }
            if let Some(rest) = documented.strip_prefix(member.as_str()) {
                return !rest.starts_with(is_identifier_char);
            }
            false
        })
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Documentation for every prepared library, keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct Documentation {
    libraries: BTreeMap<String, LibraryDocs>,
}

impl Documentation {
    /// Look up a library, failing if it has no documentation entry.
    pub fn get(&self, library: &str) -> Result<&LibraryDocs> {
        self.libraries
            .get(&normalize(library))
            .ok_or_else(|| HalluError::NotDocumented(library.to_string()))
    }

    pub fn contains(&self, library: &str) -> bool {
        self.libraries.contains_key(&normalize(library))
    }

    /// Documented library names in sorted order.
    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.libraries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    fn from_file(file: DocumentationFile) -> Self {
        let libraries = file
            .data
            .into_iter()
            .map(|(name, entry)| {
                let docs = LibraryDocs {
                    modules: entry.modules.into_iter().collect(),
                    members: entry.members.iter().map(|m| m.to_lowercase()).collect(),
                    latest: entry.latest,
                    versions: entry.versions,
                };
                (normalize(&name), docs)
            })
            .collect();
        Self { libraries }
    }
}

/// Loader and process-lifetime cache for ground-truth files.
///
/// Construct one per process (or per test) and hand it to the
/// [`Checker`](crate::Checker). Loads are cached by their exact arguments;
/// ground truth is treated as immutable while a `GroundTruth` is alive, so
/// tests needing fresh data should use distinct file paths or call
/// [`GroundTruth::clear`].
pub struct GroundTruth {
    pypi_file: PathBuf,
    documentation_file: PathBuf,
    cache: RegistryCache,
}

impl Default for GroundTruth {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundTruth {
    /// Ground truth using the default file locations.
    pub fn new() -> Self {
        Self::with_paths(DEFAULT_PYPI_PACKAGES_FILE, DEFAULT_DOCUMENTATION_FILE)
    }

    /// Ground truth with explicit default file locations.
    pub fn with_paths(
        pypi_file: impl Into<PathBuf>,
        documentation_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pypi_file: pypi_file.into(),
            documentation_file: documentation_file.into(),
            cache: RegistryCache::new(),
        }
    }

    pub fn pypi_file(&self) -> &Path {
        &self.pypi_file
    }

    pub fn documentation_file(&self) -> &Path {
        &self.documentation_file
    }

    /// Load the known-library set.
    ///
    /// Unions in the standard library and [`KNOWN_VALID_IMPORTS`] when
    /// requested. `None` uses the default registry file.
    pub fn load_known_libraries(
        &self,
        file_path: Option<&Path>,
        include_stdlib: bool,
        include_valid_extras: bool,
    ) -> Result<Arc<KnownLibraries>> {
        let key = LibraryKey {
            path: file_path.unwrap_or(&self.pypi_file).to_path_buf(),
            include_stdlib,
            include_valid_extras,
        };

        if let Some(cached) = self.cache.get_libraries(&key) {
            debug!(path = %key.path.display(), "known libraries cache hit");
            return Ok(cached);
        }

        let file: RegistryFile = read_json(&key.path)?;
        let mut names = file.data;
        if include_stdlib {
            names.extend(stdlib_modules().map(str::to_string));
        }
        if include_valid_extras {
            names.extend(KNOWN_VALID_IMPORTS.iter().map(|s| s.to_string()));
        }

        let libraries = Arc::new(KnownLibraries::from_names(names, file.datetime));
        info!(
            path = %key.path.display(),
            count = libraries.len(),
            include_stdlib,
            include_valid_extras,
            "loaded known libraries"
        );

        self.cache.set_libraries(key, Arc::clone(&libraries));
        Ok(libraries)
    }

    /// Load per-library documentation. `None` uses the default file.
    pub fn load_library_documentation(
        &self,
        file_path: Option<&Path>,
    ) -> Result<Arc<Documentation>> {
        let path = file_path.unwrap_or(&self.documentation_file);

        if let Some(cached) = self.cache.get_documentation(path) {
            debug!(path = %path.display(), "documentation cache hit");
            return Ok(cached);
        }

        let file: DocumentationFile = read_json(path)?;
        let documentation = Arc::new(Documentation::from_file(file));
        info!(
            path = %path.display(),
            libraries = documentation.len(),
            "loaded library documentation"
        );

        self.cache.set_documentation(path.to_path_buf(), Arc::clone(&documentation));
        Ok(documentation)
    }

    /// Keep the names whose registry membership equals `valid`.
    ///
    /// Names are normalized; order of first occurrence is kept and
    /// duplicates removed.
    pub fn filter_by_validity<S: AsRef<str>>(
        &self,
        names: &[S],
        valid: bool,
        file_path: Option<&Path>,
    ) -> Result<Vec<String>> {
        let known = self.load_known_libraries(file_path, true, true)?;
        let mut seen = BTreeSet::new();

        Ok(names
            .iter()
            .map(|n| normalize(n.as_ref()))
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .filter(|n| known.contains(n) == valid)
            .collect())
    }

    /// Download a fresh PyPI snapshot to `destination` and drop any cached
    /// loads of that file.
    ///
    /// Returns the number of packages written.
    pub async fn refresh_known_libraries(&self, destination: Option<&Path>) -> Result<usize> {
        let path = destination.unwrap_or(&self.pypi_file);
        let count = download_pypi_data(path).await?;
        self.cache.evict_path(path);
        Ok(count)
    }

    /// Drop every cached load.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Cache (hits, misses) since creation.
    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| HalluError::load(path, e))?;
    serde_json::from_str(&content).map_err(|e| HalluError::parse(path, e))
}
