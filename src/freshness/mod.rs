//! Freshness of generated files: mtime store and watermark staleness cache.

pub mod mtime;
mod stale;

pub use mtime::{MISSING, last_modified, now_millis, touch};
pub use stale::{CLEANUP_DELAY, MAX_AGE, StalenessCache, sweep};
