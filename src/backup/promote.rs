//! Long tier promotion.
//!
//! A promoted entry shares its files with the short tier through hard links,
//! so keeping a backup in both tiers costs no extra space until one side
//! deletes it.

use crate::backup::backup_set::{is_backup_name, list_backups, BackupEntry};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use chrono::NaiveDateTime;
use std::fs::{create_dir, hard_link, read_dir, remove_dir_all, rename};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Suffix of an entry directory still being populated.
///
/// The suffix makes the name non-conforming, so half-built entries are never
/// enumerated or pruned.
pub static STAGING_SUFFIX: &str = ".partial";

pub fn staging_path(tier_dir: &Path, name: &str) -> PathBuf {
    tier_dir.join(format!("{name}{STAGING_SUFFIX}"))
}

/// Deletes staging directories an interrupted run left in `tier_dir`.
///
/// Only `<TIMESTAMP>.partial` names are touched. A failed removal is logged
/// and the rest are still attempted.
pub fn remove_stale_staging<P: AsRef<Path>>(tier_dir: P) -> Result<Vec<PathBuf>> {
    let tier_dir = tier_dir.as_ref();
    let mut removed = Vec::new();
    for child in read_dir(tier_dir)
        .map_err(Error::from)
        .with_msg(format!("Listing {:?} failed", tier_dir))?
    {
        let path = child?.path();
        let is_staging = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(STAGING_SUFFIX))
            .is_some_and(is_backup_name);
        if !is_staging {
            continue;
        }

        info!("Removing {:?} left by an interrupted backup", path);
        match remove_dir_all(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Removing {:?} failed: {}", path, e),
        }
    }
    Ok(removed)
}

/// Whether a new entry created at `now` should also go to the long tier.
///
/// An empty long tier always takes one. Otherwise the newest long entry must
/// be at least `long_freq` old.
pub fn should_promote<P: AsRef<Path>>(
    long_dir: P,
    now: NaiveDateTime,
    long_freq: Duration,
) -> Result<bool> {
    let long_dir = long_dir.as_ref();
    match list_backups(long_dir)?.last() {
        None => {
            info!("No long term backup in {:?} yet", long_dir);
            Ok(true)
        }
        Some(newest) => {
            let due = newest.age(now).is_some_and(|age| age >= long_freq);
            debug!(
                "Newest long term backup is {}, promotion due: {}",
                newest.name(),
                due
            );
            Ok(due)
        }
    }
}

/// Mirrors `entry` into `dst_tier` by hard-linking each of its files.
///
/// The copy is assembled under a staging name and renamed into place, so the
/// destination tier only ever shows complete entries.
pub fn promote_entry<P: AsRef<Path>>(entry: &BackupEntry, dst_tier: P) -> Result<BackupEntry> {
    let dst_tier = dst_tier.as_ref();
    let staging = staging_path(dst_tier, entry.name());
    let target = dst_tier.join(entry.name());

    info!("Copying {:?} to {:?}", entry.path(), target);
    create_dir(&staging)
        .map_err(Error::from)
        .with_msg(format!("Creating {:?} failed", staging))?;

    let res = link_files(entry.path(), &staging).and_then(|linked| {
        rename(&staging, &target)?;
        debug!("Linked {} files into {:?}", linked, target);
        Ok(())
    });

    if let Err(e) = res {
        if let Err(remove_err) = remove_dir_all(&staging) {
            warn!("Removing {:?} failed: {}", staging, remove_err);
        }
        return Err(e.with_msg(format!(
            "Promoting {:?} into {:?} failed",
            entry.path(),
            dst_tier
        )));
    }

    BackupEntry::from_path(target.clone()).ok_or_else(|| {
        Error::from(std::io::Error::other(format!(
            "{:?} is not a backup entry",
            target
        )))
    })
}

fn link_files(src: &Path, dst: &Path) -> Result<usize> {
    let mut linked = 0;
    for child in read_dir(src)? {
        let child = child?;
        if child.file_type()?.is_file() {
            hard_link(child.path(), dst.join(child.file_name()))?;
            linked += 1;
        } else {
            warn!("Not promoting {:?}, not a regular file", child.path());
        }
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, day)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap()
    }

    fn make_entry(tier: &Path, name: &str) -> BackupEntry {
        let path = tier.join(name);
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("files.tar.gz"), "files").unwrap();
        std::fs::write(path.join("dbdump.sql.gz"), "dump").unwrap();
        BackupEntry::from_path(path).unwrap()
    }

    #[test]
    fn test_should_promote_on_empty_tier() {
        let long = TempDir::new().unwrap();
        std::fs::write(long.path().join("README"), "ignored").unwrap();
        assert!(should_promote(long.path(), at(5), 7 * DAY).unwrap());
    }

    #[test]
    fn test_should_promote_uses_newest_entry() {
        let long = TempDir::new().unwrap();
        make_entry(long.path(), "2021-04-01-11-00-00");
        make_entry(long.path(), "2021-04-03-11-00-00");

        assert!(!should_promote(long.path(), at(9), 7 * DAY).unwrap());
        assert!(should_promote(long.path(), at(10), 7 * DAY).unwrap());
    }

    #[test]
    fn test_promote_hard_links_every_file() {
        let short = TempDir::new().unwrap();
        let long = TempDir::new().unwrap();
        let entry = make_entry(short.path(), "2021-04-05-11-00-00");

        let promoted = promote_entry(&entry, long.path()).unwrap();

        assert_eq!(promoted.name(), entry.name());
        assert_eq!(promoted.path(), &long.path().join("2021-04-05-11-00-00"));
        for file in ["files.tar.gz", "dbdump.sql.gz"] {
            let src = std::fs::metadata(entry.path().join(file)).unwrap();
            let dst = std::fs::metadata(promoted.path().join(file)).unwrap();
            assert_eq!(src.ino(), dst.ino());
            assert_eq!(dst.nlink(), 2);
        }
        assert!(!staging_path(long.path(), entry.name()).exists());
    }

    #[test]
    fn test_promote_existing_target_fails_and_cleans_staging() {
        let short = TempDir::new().unwrap();
        let long = TempDir::new().unwrap();
        let entry = make_entry(short.path(), "2021-04-05-11-00-00");
        let existing = make_entry(long.path(), "2021-04-05-11-00-00");

        assert!(promote_entry(&entry, long.path()).is_err());
        assert!(!staging_path(long.path(), entry.name()).exists());
        assert_eq!(
            std::fs::read_to_string(existing.path().join("files.tar.gz")).unwrap(),
            "files"
        );
    }
    #[test]
    fn test_remove_stale_staging_only_touches_partial_entries() {
        let tier = TempDir::new().unwrap();
        let stale = staging_path(tier.path(), "2021-04-05-11-00-00");
        std::fs::create_dir(&stale).unwrap();
        std::fs::write(stale.join("files.tar.gz"), "half").unwrap();
        make_entry(tier.path(), "2021-04-04-11-00-00");
        std::fs::create_dir(tier.path().join("photos.partial")).unwrap();

        let removed = remove_stale_staging(tier.path()).unwrap();

        assert_eq!(removed, vec![stale.clone()]);
        assert!(!stale.exists());
        assert!(tier.path().join("2021-04-04-11-00-00").is_dir());
        assert!(tier.path().join("photos.partial").is_dir());
        assert!(remove_stale_staging(tier.path()).unwrap().is_empty());
    }
}
