//! Watermark-based staleness checks and deferred cache sweeps.
//!
//! A generated file is current when its mtime is not older than the
//! config watermark. Every directory that holds a current file gets one
//! delayed sweep per cache instance, deleting PNGs that have not been
//! validated for a long time.
//!
//! ```text
//! is_outdated(path)
//!     │
//!     ├─ mtime == MISSING ──► true (generate)
//!     │
//!     └─ schedule_cleanup(dir) ──► [delay] ──► sweep(dir, mtime - max_age)
//!        mtime < watermark
//! ```

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::mtime::{self, MISSING};

/// Delay before a scheduled sweep runs, long enough for a whole build
/// to re-validate the files it still uses.
pub const CLEANUP_DELAY: Duration = Duration::from_secs(5 * 60);

/// Files validated less recently than this before the reference time are evicted.
pub const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Extension of the files a sweep may delete.
const SWEEP_EXTENSION: &str = "png";

/// Staleness decisions plus the ledger of directories already scheduled for a sweep.
#[derive(Debug)]
pub struct StalenessCache {
    ledger: DashMap<PathBuf, Option<AbortHandle>>,
    delay: Duration,
    max_age: Duration,
}

impl StalenessCache {
    pub fn new() -> Self {
        Self::with_timing(CLEANUP_DELAY, MAX_AGE)
    }

    /// Create a cache with custom sweep delay and eviction age.
    pub fn with_timing(delay: Duration, max_age: Duration) -> Self {
        Self {
            ledger: DashMap::new(),
            delay,
            max_age,
        }
    }

    /// Check whether `output` has to be (re)generated.
    ///
    /// Missing files are always outdated. Existing files schedule a sweep
    /// of their directory and are outdated when older than `watermark`.
    pub async fn is_outdated(&self, output: &Path, watermark: u64) -> bool {
        let timestamp = mtime::last_modified(output).await;
        if timestamp == MISSING {
            return true;
        }

        self.schedule_cleanup(output, timestamp);
        timestamp < watermark
    }

    /// Arm a one-shot sweep of `path`'s parent directory.
    ///
    /// At most one sweep is scheduled per directory; later calls are no-ops.
    pub fn schedule_cleanup(&self, path: &Path, timestamp: u64) {
        let Some(dir) = path.parent() else {
            return;
        };

        let Entry::Vacant(slot) = self.ledger.entry(dir.to_path_buf()) else {
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            crate::debug!("sweep"; "no runtime, skipping sweep of {}", dir.display());
            slot.insert(None);
            return;
        };

        let max_age = u64::try_from(self.max_age.as_millis()).unwrap_or(u64::MAX);
        let cutoff = timestamp.saturating_sub(max_age);
        let delay = self.delay;
        let dir = dir.to_path_buf();
        let task_dir = dir.clone();

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let removed = sweep(&task_dir, cutoff).await;
            if removed > 0 {
                crate::debug!("sweep"; "removed {} stale files from {}", removed, task_dir.display());
            }
        });

        crate::debug!("sweep"; "scheduled sweep of {} in {:?}", dir.display(), delay);
        slot.insert(Some(handle.abort_handle()));
    }

    /// Check whether a sweep was already scheduled for `dir`.
    pub fn is_scheduled(&self, dir: &Path) -> bool {
        self.ledger.contains_key(dir)
    }

    /// Abort every sweep that has not run yet.
    ///
    /// Directories stay in the ledger, so they are not rescheduled.
    pub fn cancel_pending(&self) {
        for entry in &self.ledger {
            if let Some(handle) = entry.value() {
                handle.abort();
            }
        }
    }
}

impl Default for StalenessCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StalenessCache {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Delete `.png` files in `dir` last modified before `cutoff` (ms).
///
/// Runs one file at a time so it never competes with build I/O. Errors
/// are swallowed: a listing failure ends the sweep, a failed entry is
/// skipped. Returns the number of deleted files.
pub async fn sweep(dir: &Path, cutoff: u64) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            crate::debug!("sweep"; "cannot list {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                crate::debug!("sweep"; "listing {} stopped: {}", dir.display(), e);
                break;
            }
        };

        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != SWEEP_EXTENSION) {
            continue;
        }

        let modified = mtime::last_modified(&path).await;
        if modified == MISSING || modified >= cutoff {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => crate::debug!("sweep"; "cannot remove {}: {}", path.display(), e),
        }
    }

    removed
}
