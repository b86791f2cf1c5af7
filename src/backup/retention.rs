use crate::backup::backup_set::{list_backups, BackupEntry};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use chrono::NaiveDateTime;
use getset::Getters;
use humantime_serde::re::humantime::format_duration;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// What a pruning pass removed, and the deletions that failed along the way.
#[derive(Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct PruneOutcome {
    removed: Vec<BackupEntry>,
    errors: Option<Error>,
}

impl PruneOutcome {
    pub fn into_parts(self) -> (Vec<BackupEntry>, Option<Error>) {
        (self.removed, self.errors)
    }
}

/// An entry expires once its age reaches the retention, so an entry exactly
/// `retention` old is already gone.
pub fn is_expired(entry: &BackupEntry, now: NaiveDateTime, retention: Duration) -> bool {
    entry.age(now).is_some_and(|age| age >= retention)
}

/// Deletes every backup of `dir` that is at least `retention` old, oldest first.
///
/// A failed deletion is logged and collected; the remaining entries are still
/// processed. Only failing to list `dir` is returned as an error.
pub fn prune_expired<P: AsRef<Path>>(
    dir: P,
    now: NaiveDateTime,
    retention: Duration,
) -> Result<PruneOutcome> {
    let dir = dir.as_ref();
    let mut outcome = PruneOutcome::default();

    for entry in list_backups(dir)?
        .into_iter()
        .filter(|entry| is_expired(entry, now, retention))
    {
        info!(
            "Removing {:?}, older than {}",
            entry.path(),
            format_duration(retention)
        );
        match remove_entry(entry.path()) {
            Ok(()) => outcome.removed.push(entry),
            Err(e) => {
                let e = e.with_msg(format!("Removing out of retention backup {:?} failed", entry.path()));
                error!("{e}");
                outcome.errors = Some(Error::chain_opt(outcome.errors.take(), e));
            }
        }
    }

    Ok(outcome)
}

fn remove_entry(path: &Path) -> Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
