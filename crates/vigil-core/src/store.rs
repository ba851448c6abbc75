//! Bounded on-disk store for capture events.
//!
//! One write-once text file per event, named
//! `{prefix}_{crash|anr}_{yyyyMMdd_HHmmss}.txt`, kept under a dedicated
//! directory with a maximum-file-count retention policy (oldest evicted
//! first). The store exists to protect a process that is already failing,
//! so [`LogStore::persist`] never propagates an error to its caller:
//! internal failures are reported on the diagnostic channel and swallowed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::event::CaptureEvent;
use crate::format;

/// Renderer from event to log document, injected for testability.
pub type RenderFn = fn(&CaptureEvent) -> String;

/// Append-only, self-pruning writer of capture events.
pub struct LogStore {
    dir: PathBuf,
    prefix: String,
    max_files: usize,
    render: RenderFn,
    /// Serializes write+prune so concurrent persists never observe a
    /// half-pruned directory.
    io_lock: Mutex<()>,
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("dir", &self.dir)
            .field("prefix", &self.prefix)
            .field("max_files", &self.max_files)
            .finish()
    }
}

impl LogStore {
    /// Create a store rooted at `dir`. The directory itself is created
    /// lazily on first persist.
    #[must_use]
    pub fn new(dir: PathBuf, prefix: impl Into<String>, max_files: usize) -> Self {
        Self::with_render(dir, prefix, max_files, format::render)
    }

    /// Create a store with a custom renderer (tests substitute recording or
    /// misbehaving renderers here).
    #[must_use]
    pub fn with_render(
        dir: PathBuf,
        prefix: impl Into<String>,
        max_files: usize,
        render: RenderFn,
    ) -> Self {
        Self {
            dir,
            prefix: prefix.into(),
            max_files,
            render,
            io_lock: Mutex::new(()),
        }
    }

    /// Directory this store writes into.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Persist a capture event.
    ///
    /// Never fails from the caller's perspective: disk-full, permission and
    /// naming errors are logged at `warn` and dropped. The subsystem must be
    /// strictly more reliable than the process it observes.
    pub fn persist(&self, event: &CaptureEvent) {
        match self.try_persist(event) {
            Ok(path) => {
                debug!(path = %path.display(), kind = %event.kind(), "capture persisted");
            }
            Err(err) => {
                warn!(error = %err, kind = %event.kind(), "failed to persist capture");
            }
        }
    }

    fn try_persist(&self, event: &CaptureEvent) -> Result<PathBuf, StoreError> {
        let _guard = self
            .io_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let text = (self.render)(event);
        let path = self.free_file_name(event)?;
        fs::write(&path, text).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;

        self.prune();
        Ok(path)
    }

    /// Pick an unused file name for the event. Same-second collisions get a
    /// numeric suffix before the extension.
    fn free_file_name(&self, event: &CaptureEvent) -> Result<PathBuf, StoreError> {
        let timestamp = format::file_timestamp(event.timestamp_ms());
        let base = format!("{}_{}_{timestamp}", self.prefix, event.kind().file_tag());

        let candidate = self.dir.join(format!("{base}.txt"));
        if !candidate.exists() {
            return Ok(candidate);
        }
        for counter in 1..100u32 {
            let candidate = self.dir.join(format!("{base}_{counter}.txt"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(StoreError::NameExhausted { timestamp })
    }

    /// Keep the `max_files` most recently modified entries, deleting the
    /// rest. Listing is best-effort and individual delete failures do not
    /// abort the pass (an external file manager may race us).
    fn prune(&self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };

        let mut files: Vec<(PathBuf, SystemTime)> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|ft| ft.is_file()))
            .map(|e| {
                let modified = e
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (e.path(), modified)
            })
            .collect();

        // Newest first; ties broken by name so collision-suffixed files
        // (written later) sort as newer.
        files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        for (path, _) in files.iter().skip(self.max_files) {
            if let Err(err) = fs::remove_file(path) {
                debug!(path = %path.display(), error = %err, "failed to prune capture file");
            }
        }
    }
}

/// A capture file discovered on disk.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CaptureLogFile {
    /// Full path of the file
    pub path: PathBuf,
    /// File name component
    pub file_name: String,
    /// Last-modified time (epoch ms), 0 when unavailable
    pub modified_ms: u64,
    /// File size in bytes
    pub size_bytes: u64,
}

/// List capture files in `dir`, sorted newest first.
///
/// Scans for regular `*.txt` files; unreadable entries are silently
/// skipped. Returns up to `limit` results.
#[must_use]
pub fn list_capture_logs(dir: &Path, limit: usize) -> Vec<CaptureLogFile> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<CaptureLogFile> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_type().is_ok_and(|ft| ft.is_file())
                && e.path().extension().is_some_and(|ext| ext == "txt")
        })
        .filter_map(|e| {
            let path = e.path();
            let file_name = path.file_name()?.to_str()?.to_string();
            let meta = e.metadata().ok()?;
            let modified_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .and_then(|d| u64::try_from(d.as_millis()).ok())
                .unwrap_or(0);
            Some(CaptureLogFile {
                path,
                file_name,
                modified_ms,
                size_bytes: meta.len(),
            })
        })
        .collect();

    files.sort_by(|a, b| {
        b.modified_ms
            .cmp(&a.modified_ms)
            .then_with(|| b.file_name.cmp(&a.file_name))
    });
    files.truncate(limit);
    files
}
