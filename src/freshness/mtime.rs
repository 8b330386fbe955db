//! Mtime access for generated files.
//!
//! Generated PNGs carry no index or manifest: their modification time is
//! both "last validated at" and the value compared against the config
//! watermark. Reads never fail, a missing or unreadable file reports
//! [`MISSING`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use std::fs::{File, FileTimes};

/// Timestamp reported for files that don't exist or can't be read.
pub const MISSING: u64 = 0;

/// Convert a system time to milliseconds since the unix epoch.
///
/// Times before the epoch clamp to zero.
pub fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Current wall-clock time in milliseconds since the unix epoch.
#[inline]
pub fn now_millis() -> u64 {
    to_millis(SystemTime::now())
}

/// Get the modification time of a file in milliseconds.
///
/// Returns [`MISSING`] if the file doesn't exist or mtime cannot be read.
pub async fn last_modified(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(to_millis)
        .unwrap_or(MISSING)
}

/// Set access and modification time of an existing file.
pub async fn set_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        // write(true) without truncate leaves the content untouched
        let file = File::options().write(true).open(&path)?;
        file.set_times(FileTimes::new().set_accessed(time).set_modified(time))
    })
    .await
    .map_err(io::Error::other)?
}

/// Bump a file's timestamps to now.
///
/// Silently does nothing if the file is missing or the update fails.
pub async fn touch(path: &Path) {
    if let Err(e) = set_modified(path, SystemTime::now()).await {
        crate::debug!("cache"; "touch {} failed: {}", path.display(), e);
    }
}
