use crate::backup::archive::tree::create_tree_archive;
use crate::backup::archive::{
    artifact_name, DatabaseDump, EntryErrorPolicy, DB_DUMP_STEM, FILES_ARCHIVE_STEM,
};
use crate::backup::backup_config::ScheduleConfig;
use crate::backup::backup_set::{timestamp_name, BackupEntry};
use crate::backup::compress::CompressorConfig;
use crate::backup::promote::{promote_entry, remove_stale_staging, should_promote, staging_path};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::prune_expired;
use crate::backup::shutdown::Shutdown;
use bon::Builder;
use chrono::{Local, NaiveDateTime};
use getset::Getters;
use humantime_serde::re::humantime::format_duration;
use rayon::ThreadPool;
use std::fs::{create_dir, create_dir_all, remove_dir_all, rename};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub static SHORT_TIER_DIR: &str = "shorts";
pub static LONG_TIER_DIR: &str = "longs";

/// What one backup cycle did.
#[derive(Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct CycleOutcome {
    /// The new short term entry, absent when no artifact could be produced
    entry: Option<BackupEntry>,
    /// The long term copy of `entry`, when one was due
    promoted: Option<BackupEntry>,
    pruned_short: Vec<BackupEntry>,
    pruned_long: Vec<BackupEntry>,
    /// Failures the cycle recovered from
    errors: Option<Error>,
}

impl CycleOutcome {
    fn record(&mut self, e: Error) {
        self.errors = Some(Error::chain_opt(self.errors.take(), e));
    }
}

/// The backup daemon: a short tier refilled every `backup_freq` and a long
/// tier fed from it every `long_freq`, each pruned on its own retention.
#[derive(Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct TieredBackup {
    #[builder(into)]
    src_dir: PathBuf,
    #[builder(into)]
    dst_dir: PathBuf,
    #[builder(default)]
    schedule: ScheduleConfig,
    #[builder(default)]
    compressor: CompressorConfig,
    #[builder(default)]
    entry_error_policy: EntryErrorPolicy,
    database: Option<Arc<dyn DatabaseDump>>,
    pool: Arc<ThreadPool>,
}

impl TieredBackup {
    pub fn short_dir(&self) -> PathBuf {
        self.dst_dir.join(SHORT_TIER_DIR)
    }

    pub fn long_dir(&self) -> PathBuf {
        self.dst_dir.join(LONG_TIER_DIR)
    }

    /// Creates both tier directories if needed and clears staging
    /// directories left by an interrupted run.
    pub fn prepare(&self) -> Result<()> {
        for dir in [self.short_dir(), self.long_dir()] {
            create_dir_all(&dir)
                .map_err(Error::from)
                .with_msg(format!("Creating tier directory {:?} failed", dir))?;
            remove_stale_staging(&dir)?;
        }
        Ok(())
    }

    /// Runs cycles until `shutdown` fires, sleeping `backup_freq` after each.
    ///
    /// Returns `Err` only for failures that leave the short tier unusable.
    pub fn run(&self, shutdown: &Shutdown) -> Result<()> {
        self.prepare()?;
        let backup_freq = self.schedule.backup_freq();

        while !shutdown.is_triggered() {
            let outcome = self.run_cycle(Local::now().naive_local())?;
            if let Some(e) = outcome.errors() {
                warn!(
                    "Backup cycle finished with {} error(s):\n{}",
                    e.count(),
                    indent::indent_all_with("  ", e.to_string())
                );
            }

            info!(
                "Sleeping for {} == {} seconds",
                format_duration(backup_freq),
                backup_freq.as_secs()
            );
            if shutdown.wait_timeout(backup_freq) {
                break;
            }
        }

        info!("Shutdown requested, backup loop stopped");
        Ok(())
    }

    /// Makes the backup for `now`, then prunes and promotes.
    ///
    /// Artifact, pruning and promotion failures are collected in the outcome.
    /// Failing to create or publish the entry directory is returned as `Err`.
    pub fn run_cycle(&self, now: NaiveDateTime) -> Result<CycleOutcome> {
        let mut outcome = CycleOutcome::default();
        let short_dir = self.short_dir();
        let name = timestamp_name(&now);

        if short_dir.join(&name).exists() {
            let e = Error::from(std::io::Error::other(format!(
                "Backup {:?} already exists in {:?}, skipping this cycle's backup",
                name, short_dir
            )));
            error!("{e}");
            outcome.record(e);
        } else {
            outcome.entry = self.create_entry(&short_dir, &name, &mut outcome)?;
        }

        match prune_expired(&short_dir, now, self.schedule.short_keep()) {
            Ok(pruned) => {
                let (removed, errors) = pruned.into_parts();
                outcome.pruned_short = removed;
                errors.into_iter().for_each(|e| outcome.record(e));
            }
            Err(e) => {
                error!("{e}");
                outcome.record(e);
            }
        }

        if let Some(entry) = outcome.entry.clone() {
            self.promote_if_due(&entry, now, &mut outcome);
        }

        Ok(outcome)
    }

    fn create_entry(
        &self,
        short_dir: &Path,
        name: &str,
        outcome: &mut CycleOutcome,
    ) -> Result<Option<BackupEntry>> {
        info!("Archiving {}", name);
        let staging = staging_path(short_dir, name);
        create_dir(&staging)
            .map_err(Error::from)
            .with_msg(format!("Creating backup entry {:?} failed", staging))?;

        let produced = self.produce_artifacts(&staging, outcome);
        if produced == 0 {
            warn!("No artifact produced for {}, discarding the entry", name);
            if let Err(e) = remove_dir_all(&staging) {
                warn!("Removing {:?} failed: {}", staging, e);
            }
            return Ok(None);
        }

        let target = short_dir.join(name);
        rename(&staging, &target)
            .map_err(Error::from)
            .with_msg(format!("Publishing backup entry {:?} failed", target))?;
        info!("Archive at {} complete", name);
        Ok(BackupEntry::from_path(target))
    }

    /// Writes the tree archive and the database dump side by side, returning
    /// how many of them made it to disk.
    fn produce_artifacts(&self, entry_dir: &Path, outcome: &mut CycleOutcome) -> usize {
        let files_dst = entry_dir.join(artifact_name(FILES_ARCHIVE_STEM, &self.compressor));
        let dump_dst = entry_dir.join(artifact_name(DB_DUMP_STEM, &self.compressor));

        let (files_res, dump_res) = self.pool.join(
            || {
                create_tree_archive(
                    &self.src_dir,
                    &files_dst,
                    &self.compressor,
                    &self.entry_error_policy,
                )
                .map(|_| true)
            },
            || match &self.database {
                Some(database) => database.dump_to(&dump_dst, &self.compressor).map(|_| true),
                None => {
                    debug!("No database configured, skipping the dump");
                    Ok(false)
                }
            },
        );

        let mut produced = 0;
        for (what, res) in [("Archiving files", files_res), ("Dumping database", dump_res)] {
            match res {
                Ok(true) => produced += 1,
                Ok(false) => {}
                Err(e) => {
                    let e = e.with_msg(format!("{what} failed"));
                    error!("{e}");
                    outcome.record(e);
                }
            }
        }
        produced
    }

    fn promote_if_due(&self, entry: &BackupEntry, now: NaiveDateTime, outcome: &mut CycleOutcome) {
        let long_dir = self.long_dir();
        let due = match should_promote(&long_dir, now, self.schedule.long_freq()) {
            Ok(due) => due,
            Err(e) => {
                error!("{e}");
                outcome.record(e);
                return;
            }
        };
        if !due {
            debug!(
                "Newest long term backup is younger than {}, not promoting",
                format_duration(self.schedule.long_freq())
            );
            return;
        }

        match promote_entry(entry, &long_dir) {
            Ok(promoted) => outcome.promoted = Some(promoted),
            Err(e) => {
                error!("{e}");
                outcome.record(e);
                return;
            }
        }

        match prune_expired(&long_dir, now, self.schedule.long_keep()) {
            Ok(pruned) => {
                let (removed, errors) = pruned.into_parts();
                outcome.pruned_long = removed;
                errors.into_iter().for_each(|e| outcome.record(e));
            }
            Err(e) => {
                error!("{e}");
                outcome.record(e);
            }
        }
    }
}
