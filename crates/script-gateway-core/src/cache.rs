//! Script instance cache.
//!
//! [`ScriptCache`] keeps one [`ScriptHandle`] per resolved script path for the
//! lifetime of the process. The file is read once, on first use, to record
//! its hash and size; the interpreter works from the path.
//!
//! # Concurrency
//!
//! Each path owns a [`OnceCell`] stored in a [`DashMap`]. Concurrent first
//! requests for the same path all wait on that cell, so exactly one read runs
//! and every caller receives the same `Arc`. A failed read leaves the cell
//! empty and the next request tries again.
//!
//! There is no eviction: the cache holds every script the rewrite engine has
//! ever resolved.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use script_gateway_common::ExecuteError;

/// A script bound to one resolved file path.
///
/// Only the fingerprint of the source is kept. Interpreters are given the
/// path and read the file themselves.
#[derive(Debug)]
pub struct ScriptHandle {
    path: PathBuf,
    content_hash: String,
    size: usize,
    loaded_at: Instant,
}

impl ScriptHandle {
    /// Build a handle from already-read source bytes.
    pub fn new(path: impl Into<PathBuf>, source: &[u8]) -> Self {
        Self {
            path: path.into(),
            content_hash: compute_hash(source),
            size: source.len(),
            loaded_at: Instant::now(),
        }
    }

    /// Read `path` and build a handle.
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError::ScriptNotFound`] if the file does not exist and
    /// [`ExecuteError::Load`] for any other read failure.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, ExecuteError> {
        let start = Instant::now();

        let source = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExecuteError::script_not_found(path.display().to_string()),
            _ => ExecuteError::Load {
                path: path.display().to_string(),
                source: e,
            },
        })?;

        let handle = Self::new(path, &source);

        info!(
            content_hash = %handle.content_hash,
            bytes = handle.size,
            duration_ms = start.elapsed().as_millis(),
            "Script loaded"
        );

        Ok(handle)
    }

    /// The resolved script path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash of the source bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Source length in bytes at first use.
    pub fn size(&self) -> usize {
        self.size
    }

    /// When the handle was built.
    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }
}

/// Process-wide map from resolved script path to handle.
#[derive(Debug, Default)]
pub struct ScriptCache {
    entries: DashMap<PathBuf, Arc<OnceCell<Arc<ScriptHandle>>>>,
    loads: AtomicU64,
}

impl ScriptCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for `path`, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns the load error if the script cannot be read. Nothing is cached
    /// in that case.
    pub async fn get_or_create(&self, path: &Path) -> Result<Arc<ScriptHandle>, ExecuteError> {
        // Clone the cell out so no map guard is held across the await.
        let cell = Arc::clone(self.entries.entry(path.to_path_buf()).or_default().value());

        cell.get_or_try_init(|| async {
            let handle = ScriptHandle::load(path).await?;
            self.loads.fetch_add(1, Ordering::Relaxed);
            Ok::<_, ExecuteError>(Arc::new(handle))
        })
        .await
        .cloned()
        .inspect(|_| debug!(path = %path.display(), "Script handle resolved"))
    }

    /// Get an already-loaded handle without loading.
    pub fn get(&self, path: &Path) -> Option<Arc<ScriptHandle>> {
        self.entries
            .get(path)
            .and_then(|cell| cell.get().cloned())
    }

    /// All loaded handles, sorted by path.
    pub fn handles(&self) -> Vec<Arc<ScriptHandle>> {
        let mut handles: Vec<Arc<ScriptHandle>> = self
            .entries
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();
        handles.sort_by(|a, b| a.path.cmp(&b.path));
        handles
    }

    /// Paths of all loaded handles, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.handles()
            .iter()
            .map(|handle| handle.path.clone())
            .collect()
    }

    /// Number of loaded handles.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    /// Returns `true` if no handle has been loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of successful script reads since creation.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

/// Compute a simple hash of the script bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
