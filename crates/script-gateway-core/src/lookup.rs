//! Filesystem lookups used by the rewrite engine.
//!
//! Lookups never fail: any error (missing path, permission denied, transient
//! I/O) reads as "does not exist".

use std::path::Path;

use tracing::trace;

/// What a lookup found at a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathStatus {
    /// Something exists at the path.
    pub exists: bool,
    /// It is a regular file.
    pub is_file: bool,
    /// It is a directory.
    pub is_dir: bool,
}

impl PathStatus {
    /// Status for a path that does not exist.
    pub const MISSING: PathStatus = PathStatus {
        exists: false,
        is_file: false,
        is_dir: false,
    };
}

/// Query existence and type of `path`.
pub async fn check_path(path: &Path) -> PathStatus {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => PathStatus {
            exists: true,
            is_file: metadata.is_file(),
            is_dir: metadata.is_dir(),
        },
        Err(e) => {
            trace!(path = %path.display(), error = %e, "Lookup failed, treated as missing");
            PathStatus::MISSING
        }
    }
}

/// Returns `true` if `path` is a regular file.
pub async fn is_file(path: &Path) -> bool {
    check_path(path).await.is_file
}
