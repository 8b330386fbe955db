//! `sweep` command.

use anyhow::{Result, bail};
use std::path::Path;
use svg_asset_plugin::freshness::{now_millis, sweep};
use svg_asset_plugin::log;

const HOUR_MILLIS: u64 = 60 * 60 * 1000;

/// Sweep `dir` right away, relative to the current time.
pub async fn run_sweep(dir: &Path, max_age_hours: u64) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let cutoff = now_millis().saturating_sub(max_age_hours.saturating_mul(HOUR_MILLIS));
    let removed = sweep(dir, cutoff).await;

    log!("sweep"; "removed {} file(s) from {}", removed, dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use svg_asset_plugin::freshness::mtime::set_modified;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sweep_respects_max_age() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.png");
        let recent = dir.path().join("recent.png");
        fs::write(&old, b"").unwrap();
        fs::write(&recent, b"").unwrap();
        set_modified(&old, SystemTime::now() - Duration::from_secs(3 * 3600))
            .await
            .unwrap();

        run_sweep(dir.path(), 2).await.unwrap();

        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(run_sweep(&dir.path().join("nope"), 24).await.is_err());
    }
}
