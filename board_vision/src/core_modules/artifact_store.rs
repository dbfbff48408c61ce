// THEORY:
// The `ArtifactStore` is the seam between the inspection engine and wherever
// annotated images end up. The engine hands over encoded PNG bytes together with
// the name of the uploaded test image and receives an opaque reference back. It
// never learns how that reference maps to storage.
//
// `FsArtifactStore` is the production implementation: one file per inspection in
// a results directory, named `defect_<stem>_<millis>_<seq>.png`. The millisecond
// timestamp plus a process-wide sequence number keeps names unique even when
// concurrent inspections share a source name.
//
// Cleanup is explicit. The engine never deletes artifacts on its own; callers
// that want to discard one ask the store, and get a typed status back instead of
// an error, because a missing file is a normal outcome of concurrent cleanup.

use crate::error::PersistenceError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Outcome of removing a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    Removed,
    Missing,
    Failed(String),
}

/// Persists annotated images and hands back references to them.
pub trait ArtifactStore: Send + Sync {
    /// Stores `png` for an inspection of `source_name` and returns its reference.
    fn store(&self, source_name: &str, png: &[u8]) -> Result<String, PersistenceError>;

    fn remove(&self, reference: &str) -> CleanupStatus;
}

/// Writes artifacts as files under a results directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    results_dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Absolute-or-relative path of a reference returned by `store`.
    pub fn path_of(&self, reference: &str) -> PathBuf {
        self.results_dir.join(reference)
    }

    fn unique_name(source_name: &str) -> String {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(sanitize)
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "image".to_string());
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!("defect_{stem}_{millis}_{sequence}.png")
    }
}

impl ArtifactStore for FsArtifactStore {
    fn store(&self, source_name: &str, png: &[u8]) -> Result<String, PersistenceError> {
        fs::create_dir_all(&self.results_dir).map_err(|source| PersistenceError::Io {
            path: self.results_dir.clone(),
            source,
        })?;

        let name = Self::unique_name(source_name);
        let path = self.results_dir.join(&name);
        fs::write(&path, png).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), bytes = png.len(), "annotated image stored");
        Ok(name)
    }

    fn remove(&self, reference: &str) -> CleanupStatus {
        if Path::new(reference).components().count() != 1 {
            return CleanupStatus::Failed(format!("'{reference}' is not a plain artifact name"));
        }
        let path = self.path_of(reference);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "artifact removed");
                CleanupStatus::Removed
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "artifact already gone");
                CleanupStatus::Missing
            }
            Err(err) => {
                warn!(path = %path.display(), "artifact cleanup failed: {err}");
                CleanupStatus::Failed(err.to_string())
            }
        }
    }
}

/// Keeps artifacts in memory. Used where nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        let artifacts = self.artifacts.lock().ok()?;
        artifacts
            .iter()
            .find(|(name, _)| name == reference)
            .map(|(_, bytes)| bytes.clone())
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().map(|artifacts| artifacts.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn store(&self, source_name: &str, png: &[u8]) -> Result<String, PersistenceError> {
        let name = FsArtifactStore::unique_name(source_name);
        let mut artifacts = self
            .artifacts
            .lock()
            .map_err(|_| PersistenceError::Storage("artifact table poisoned".into()))?;
        artifacts.push((name.clone(), png.to_vec()));
        Ok(name)
    }

    fn remove(&self, reference: &str) -> CleanupStatus {
        let Ok(mut artifacts) = self.artifacts.lock() else {
            return CleanupStatus::Failed("artifact table poisoned".into());
        };
        match artifacts.iter().position(|(name, _)| name == reference) {
            Some(at) => {
                artifacts.remove(at);
                CleanupStatus::Removed
            }
            None => CleanupStatus::Missing,
        }
    }
}

fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
