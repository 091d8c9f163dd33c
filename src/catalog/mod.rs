// clickvault/src/catalog/mod.rs
//! Backup catalog: name-derived artifact metadata across the local and remote
//! tiers, plus the retention sweep.
//!
//! The catalog never mutates artifacts except through `purge_older_than_*`;
//! listing and name resolution are read-only.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime};

use crate::errors::AppError;
use crate::storage::BlobStore;

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Identity parsed out of `<environment>_backup_<YYYYMMDD>_<HHMMSS>.tar.gz`.
///
/// The timestamp is compared as a parsed `NaiveDateTime`, not as a string, so
/// retention does not depend on the zero-padded width of the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub environment: String,
    pub timestamp: NaiveDateTime,
}

impl ArtifactName {
    pub fn new(environment: &str, timestamp: NaiveDateTime) -> Self {
        ArtifactName {
            environment: environment.to_string(),
            timestamp,
        }
    }

    pub fn parse(file_name: &str) -> crate::errors::Result<Self> {
        let stem = file_name
            .strip_suffix(ARCHIVE_SUFFIX)
            .ok_or_else(|| AppError::ArtifactName(format!("missing {ARCHIVE_SUFFIX} suffix: {file_name}")))?;
        let (environment, ts) = stem
            .split_once("_backup_")
            .ok_or_else(|| AppError::ArtifactName(format!("missing '_backup_' separator: {file_name}")))?;
        if environment.is_empty() {
            return Err(AppError::ArtifactName(format!(
                "empty environment in artifact name: {file_name}"
            )));
        }
        let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).map_err(|e| {
            AppError::ArtifactName(format!("bad timestamp '{ts}' in {file_name}: {e}"))
        })?;
        Ok(ArtifactName {
            environment: environment.to_string(),
            timestamp,
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_backup_{}{}",
            self.environment,
            self.timestamp.format(TIMESTAMP_FORMAT),
            ARCHIVE_SUFFIX
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Local,
    Remote,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Local => write!(f, "local"),
            Tier::Remote => write!(f, "remote"),
        }
    }
}

/// One known artifact on one tier.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    pub name: ArtifactName,
    pub tier: Tier,
    /// Set for local artifacts only.
    pub path: Option<PathBuf>,
}

/// Lists local artifacts, newest first. Files whose names don't parse as
/// artifacts are ignored (the backup dir may hold unrelated files).
pub fn list_local(backup_dir: &Path) -> Result<Vec<ArtifactRef>> {
    let mut artifacts = Vec::new();
    if !backup_dir.exists() {
        return Ok(artifacts);
    }
    let entries = fs::read_dir(backup_dir)
        .with_context(|| format!("Failed to read backup directory {}", backup_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Ok(name) = ArtifactName::parse(&file_name) {
            artifacts.push(ArtifactRef {
                name,
                tier: Tier::Local,
                path: Some(entry.path()),
            });
        }
    }
    artifacts.sort_by(|a, b| b.name.timestamp.cmp(&a.name.timestamp));
    Ok(artifacts)
}

/// Lists remote artifacts, newest first.
pub async fn list_remote<S: BlobStore>(store: &S) -> Result<Vec<ArtifactRef>> {
    let mut artifacts = Vec::new();
    for key in store.list().await? {
        if let Ok(name) = ArtifactName::parse(&key) {
            artifacts.push(ArtifactRef {
                name,
                tier: Tier::Remote,
                path: None,
            });
        }
    }
    artifacts.sort_by(|a, b| b.name.timestamp.cmp(&a.name.timestamp));
    Ok(artifacts)
}

pub fn retention_cutoff(retention_days: i64) -> NaiveDateTime {
    Local::now().naive_local() - Duration::days(retention_days)
}

/// Deletes local artifacts older than the cutoff. Per-file failures are
/// logged and do not stop the sweep. Returns the names actually removed.
pub fn purge_older_than_local(backup_dir: &Path, cutoff: NaiveDateTime) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for artifact in list_local(backup_dir)? {
        if artifact.name.timestamp >= cutoff {
            continue;
        }
        let file_name = artifact.name.file_name();
        let path = match &artifact.path {
            Some(p) => p.clone(),
            None => continue,
        };
        match fs::remove_file(&path) {
            Ok(_) => {
                println!("🧹 Removed expired local backup: {}", file_name);
                removed.push(file_name);
            }
            Err(e) => {
                eprintln!("⚠ Failed to remove expired local backup {}: {}", file_name, e);
            }
        }
    }
    Ok(removed)
}

/// Deletes remote artifacts older than the cutoff, same contract as the
/// local sweep.
pub async fn purge_older_than_remote<S: BlobStore>(
    store: &S,
    cutoff: NaiveDateTime,
) -> Result<Vec<String>> {
    let mut removed = Vec::new();
    for artifact in list_remote(store).await? {
        if artifact.name.timestamp >= cutoff {
            continue;
        }
        let file_name = artifact.name.file_name();
        match store.delete(&file_name).await {
            Ok(_) => {
                println!("🧹 Removed expired remote backup: {}", file_name);
                removed.push(file_name);
            }
            Err(e) => {
                eprintln!(
                    "⚠ Failed to remove expired remote backup {}: {:#}",
                    file_name, e
                );
            }
        }
    }
    Ok(removed)
}

/// Runs the retention sweep over both tiers with a single cutoff. Tier-level
/// listing failures are logged rather than propagated; retention must not
/// fail a backup run that already produced an artifact.
pub async fn run_retention<S: BlobStore>(
    backup_dir: &Path,
    retention_days: i64,
    store: Option<&S>,
) -> (usize, usize) {
    let cutoff = retention_cutoff(retention_days);
    println!(
        "🧹 Applying retention policy: removing artifacts older than {} ({} days)",
        cutoff.format("%Y-%m-%d %H:%M:%S"),
        retention_days
    );

    let local_removed = match purge_older_than_local(backup_dir, cutoff) {
        Ok(removed) => removed.len(),
        Err(e) => {
            eprintln!("⚠ Local retention sweep failed: {:#}", e);
            0
        }
    };

    let remote_removed = match store {
        Some(store) => match purge_older_than_remote(store, cutoff).await {
            Ok(removed) => removed.len(),
            Err(e) => {
                eprintln!("⚠ Remote retention sweep failed: {:#}", e);
                0
            }
        },
        None => 0,
    };

    (local_removed, remote_removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fake::FakeStore;
    use chrono::NaiveDate;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_artifact_name_round_trip() {
        let name = ArtifactName::new("prod", ts(2025, 3, 14, 9, 26, 53));
        let encoded = name.file_name();
        assert_eq!(encoded, "prod_backup_20250314_092653.tar.gz");
        assert_eq!(ArtifactName::parse(&encoded).unwrap(), name);
    }

    #[test]
    fn test_artifact_name_rejects_garbage() {
        assert!(ArtifactName::parse("notes.txt").is_err());
        assert!(ArtifactName::parse("prod_backup_20250314_092653.zip").is_err());
        assert!(ArtifactName::parse("prod_backup_2025-03-14.tar.gz").is_err());
        assert!(ArtifactName::parse("_backup_20250314_092653.tar.gz").is_err());
        // 13th month: fixed-width but not a real date
        assert!(ArtifactName::parse("prod_backup_20251399_092653.tar.gz").is_err());
    }

    #[test]
    fn test_timestamps_compare_temporally() {
        let older = ArtifactName::parse("prod_backup_20241231_235959.tar.gz").unwrap();
        let newer = ArtifactName::parse("prod_backup_20250101_000000.tar.gz").unwrap();
        assert!(older.timestamp < newer.timestamp);
    }

    #[test]
    fn test_list_local_sorted_newest_first() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "prod_backup_20250102_000000.tar.gz",
            "prod_backup_20250301_120000.tar.gz",
            "prod_backup_20250101_000000.tar.gz",
            "README.md", // ignored
        ] {
            fs::write(dir.path().join(name), b"x")?;
        }

        let listed = list_local(dir.path())?;
        let names: Vec<String> = listed.iter().map(|a| a.name.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "prod_backup_20250301_120000.tar.gz",
                "prod_backup_20250102_000000.tar.gz",
                "prod_backup_20250101_000000.tar.gz",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_purge_local_removes_exactly_older_than_cutoff() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let old = "prod_backup_20250101_000000.tar.gz";
        let boundary = "prod_backup_20250201_000000.tar.gz";
        let fresh = "prod_backup_20250301_000000.tar.gz";
        for name in [old, boundary, fresh] {
            fs::write(dir.path().join(name), b"x")?;
        }

        let cutoff = ts(2025, 2, 1, 0, 0, 0);
        let removed = purge_older_than_local(dir.path(), cutoff)?;

        assert_eq!(removed, vec![old.to_string()]);
        assert!(!dir.path().join(old).exists());
        // Exactly at the cutoff is kept; only strictly older goes.
        assert!(dir.path().join(boundary).exists());
        assert!(dir.path().join(fresh).exists());
        Ok(())
    }

    #[test]
    fn test_purge_local_empty_dir_is_noop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let removed = purge_older_than_local(&dir.path().join("missing"), ts(2025, 1, 1, 0, 0, 0))?;
        assert!(removed.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_purge_remote_removes_exactly_older_than_cutoff() -> anyhow::Result<()> {
        let store = FakeStore::new();
        let old = "prod_backup_20250101_000000.tar.gz";
        let boundary = "prod_backup_20250201_000000.tar.gz";
        let fresh = "prod_backup_20250301_000000.tar.gz";
        for name in [old, boundary, fresh, "unrelated.txt"] {
            store.seed(name, b"x");
        }

        let cutoff = ts(2025, 2, 1, 0, 0, 0);
        let removed = purge_older_than_remote(&store, cutoff).await?;

        assert_eq!(removed, vec![old.to_string()]);
        // Exactly at the cutoff is kept; unparseable names are never touched.
        assert_eq!(
            store.names(),
            vec![boundary.to_string(), fresh.to_string(), "unrelated.txt".to_string()]
        );
        assert_eq!(store.deleted.lock().unwrap().as_slice(), [old.to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_remote_sorted_newest_first() -> anyhow::Result<()> {
        let store = FakeStore::new();
        store.seed("prod_backup_20250102_000000.tar.gz", b"x");
        store.seed("prod_backup_20250301_120000.tar.gz", b"x");
        store.seed("prod_backup_20250101_000000.tar.gz", b"x");
        store.seed("README.md", b"x"); // ignored

        let listed = list_remote(&store).await?;
        let names: Vec<String> = listed.iter().map(|a| a.name.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "prod_backup_20250301_120000.tar.gz",
                "prod_backup_20250102_000000.tar.gz",
                "prod_backup_20250101_000000.tar.gz",
            ]
        );
        assert!(listed.iter().all(|a| a.tier == Tier::Remote && a.path.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_retention_sweeps_both_tiers_independently() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let old = "prod_backup_20200101_000000.tar.gz";
        fs::write(dir.path().join(old), b"x")?;
        let store = FakeStore::new();
        store.seed(old, b"x");
        store.seed("prod_backup_20990101_000000.tar.gz", b"x");

        let (local_removed, remote_removed) = run_retention(dir.path(), 14, Some(&store)).await;
        assert_eq!(local_removed, 1);
        assert_eq!(remote_removed, 1);
        assert!(!dir.path().join(old).exists());
        assert_eq!(store.names(), vec!["prod_backup_20990101_000000.tar.gz".to_string()]);
        Ok(())
    }
}
