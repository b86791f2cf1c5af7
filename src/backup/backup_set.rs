//! Backup entries are directory entries named exactly `YYYY-MM-DD-HH-MM-SS`.
//!
//! Anything else living in a tier directory is left alone.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use chrono::NaiveDateTime;
use getset::Getters;
use regex::Regex;
use std::fs::read_dir;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub static TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}-[0-9]{2}-[0-9]{2}-[0-9]{2}$")
        .expect("timestamp pattern is valid")
});

/// Whether `name` is a full match of the fixed-width timestamp pattern.
pub fn is_backup_name(name: &str) -> bool {
    TIMESTAMP_RE.is_match(name)
}

pub fn timestamp_name(date_time: &NaiveDateTime) -> String {
    date_time.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupEntry {
    name: String,
    path: PathBuf,
    date_time: NaiveDateTime,
}

impl BackupEntry {
    /// Builds an entry from a directory child, `None` when the name does not conform.
    pub fn from_path(path: PathBuf) -> Option<BackupEntry> {
        let name = path.file_name()?.to_str()?.to_string();
        if !is_backup_name(&name) {
            return None;
        }
        match NaiveDateTime::parse_from_str(&name, TIMESTAMP_FORMAT) {
            Ok(date_time) => Some(BackupEntry {
                name,
                path,
                date_time,
            }),
            Err(e) => {
                tracing::debug!("Ignoring {:?}, not a valid point in time: {}", path, e);
                None
            }
        }
    }

    /// Age relative to `now`, `None` for entries stamped in the future.
    pub fn age(&self, now: NaiveDateTime) -> Option<Duration> {
        now.signed_duration_since(self.date_time).to_std().ok()
    }
}

/// Lists the backup entries of `dir`, oldest first.
pub fn list_backups<P: AsRef<Path>>(dir: P) -> Result<Vec<BackupEntry>> {
    let dir = dir.as_ref();
    let mut entries = Vec::new();
    for child in read_dir(dir)
        .map_err(Error::from)
        .with_msg(format!("Listing backups in {:?} failed", dir))?
    {
        if let Some(entry) = BackupEntry::from_path(child?.path()) {
            entries.push(entry);
        }
    }

    entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
    tracing::trace!("Found {} backups in {:?}", entries.len(), dir);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn names(entries: &[BackupEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name().as_str()).collect()
    }

    #[test]
    fn test_timestamp_pattern_full_match_only() {
        assert!(is_backup_name("2021-04-05-11-50-00"));
        assert!(!is_backup_name("202-04-05-11-50-00"));
        assert!(!is_backup_name("2021-4-05-11-50-00"));
        assert!(!is_backup_name("2021-04-05-11-50-00-more"));
        assert!(!is_backup_name("extra-2021-04-05-11-50-00"));
        assert!(!is_backup_name("2021-04-05-11-50-00\n"));
    }

    #[test]
    fn test_timestamp_name_is_zero_padded() {
        let dt = NaiveDate::from_ymd_opt(2021, 4, 5)
            .unwrap()
            .and_hms_opt(9, 5, 3)
            .unwrap();
        assert_eq!(timestamp_name(&dt), "2021-04-05-09-05-03");
        let entry = BackupEntry::from_path(PathBuf::from("/x/2021-04-05-09-05-03")).unwrap();
        assert_eq!(entry.date_time(), &dt);
    }

    #[test]
    fn test_list_backups_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        for name in [
            "2021-04-04-11-00-00",
            "2021-04-02-11-00-00",
            "foo",
            "2021-04-05-11-00-00",
            "2021-04-03-11-00-00-copy",
            "2021-04-03-11-00-00",
        ] {
            std::fs::create_dir(base.join(name)).unwrap();
        }

        let entries = list_backups(base).unwrap();
        assert_eq!(
            names(&entries),
            vec![
                "2021-04-02-11-00-00",
                "2021-04-03-11-00-00",
                "2021-04-04-11-00-00",
                "2021-04-05-11-00-00",
            ]
        );
        assert_eq!(entries[0].path(), &base.join("2021-04-02-11-00-00"));
    }

    #[test]
    fn test_list_backups_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("README"), "not a backup").unwrap();
        assert!(list_backups(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_list_backups_ignores_impossible_dates() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("2021-13-40-11-00-00")).unwrap();
        std::fs::create_dir(temp_dir.path().join("2021-04-05-11-00-00")).unwrap();

        let entries = list_backups(temp_dir.path()).unwrap();
        assert_eq!(names(&entries), vec!["2021-04-05-11-00-00"]);
    }

    #[test]
    fn test_list_backups_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let res = list_backups(temp_dir.path().join("missing"));
        assert!(res.is_err());
        assert!(res.unwrap_err().to_string().contains("Listing backups in"));
    }

    #[test]
    fn test_age_of_future_entry_is_none() {
        let entry = BackupEntry::from_path(PathBuf::from("2021-04-05-11-00-00")).unwrap();
        let before = NaiveDate::from_ymd_opt(2021, 4, 4)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        let after = NaiveDate::from_ymd_opt(2021, 4, 6)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        assert_eq!(entry.age(before), None);
        assert_eq!(entry.age(after), Some(Duration::from_secs(24 * 3600)));
    }
}
