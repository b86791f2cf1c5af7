use crate::backup::archive::mysqldump::MysqlDumpConfig;
use crate::backup::archive::{DatabaseDump, EntryErrorPolicy};
use crate::backup::compress::CompressorConfig;
use crate::backup::duration::duration_str;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::tiered::TieredBackup;
use crate::backup::validate::{validate_dir_exist, validate_writable_dir};
use bon::Builder;
use getset::{CopyGetters, Getters, Setters};
use humantime_serde::re::humantime::format_duration;
use itertools::Itertools;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use validator::{Validate, ValidationError, ValidationErrors};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Shortest accepted `backup_freq`
pub const MIN_BACKUP_FREQ: Duration = Duration::from_secs(1);

fn default_backup_freq() -> Duration {
    DAY
}

fn default_short_keep() -> Duration {
    7 * DAY
}

fn default_long_freq() -> Duration {
    7 * DAY
}

fn default_long_keep() -> Duration {
    28 * DAY
}

fn default_src_dir() -> PathBuf {
    PathBuf::from("/src")
}

fn default_dst_dir() -> PathBuf {
    PathBuf::from("/dst")
}

/// How often backups are made and how long each tier keeps them.
///
/// Durations use the `2d4h7m` notation in YAML.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Builder, CopyGetters, Setters)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub", set = "pub")]
pub struct ScheduleConfig {
    #[serde(with = "duration_str", default = "default_backup_freq")]
    #[builder(default = default_backup_freq())]
    backup_freq: Duration,
    #[serde(with = "duration_str", default = "default_short_keep")]
    #[builder(default = default_short_keep())]
    short_keep: Duration,
    #[serde(with = "duration_str", default = "default_long_freq")]
    #[builder(default = default_long_freq())]
    long_freq: Duration,
    #[serde(with = "duration_str", default = "default_long_keep")]
    #[builder(default = default_long_keep())]
    long_keep: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn must_be_shorter(field: &str, other: &str, value: Duration, limit: Duration) -> ValidationError {
    ValidationError::new("InvalidSchedule").with_message(
        format!(
            "{field} ({}) must be shorter than {other} ({})",
            format_duration(value),
            format_duration(limit)
        )
        .into(),
    )
}

impl Validate for ScheduleConfig {
    /// Reports every violated ordering, not just the first one.
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.backup_freq < MIN_BACKUP_FREQ {
            errors.add(
                "backup_freq",
                ValidationError::new("InvalidSchedule").with_message(
                    format!(
                        "backup_freq must be at least {}",
                        format_duration(MIN_BACKUP_FREQ)
                    )
                    .into(),
                ),
            );
        }
        if self.backup_freq >= self.short_keep {
            errors.add(
                "backup_freq",
                must_be_shorter("backup_freq", "short_keep", self.backup_freq, self.short_keep),
            );
        }
        if self.backup_freq >= self.long_freq {
            errors.add(
                "backup_freq",
                must_be_shorter("backup_freq", "long_freq", self.backup_freq, self.long_freq),
            );
        }
        if self.long_freq >= self.long_keep {
            errors.add(
                "long_freq",
                must_be_shorter("long_freq", "long_keep", self.long_freq, self.long_keep),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Daemon configuration, loaded from YAML with every field optional.
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters, Setters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub", set = "pub")]
pub struct BackupConfig {
    #[serde(default = "default_src_dir")]
    #[validate(custom(function = validate_dir_exist))]
    #[builder(default = default_src_dir(), into)]
    src_dir: PathBuf,
    #[serde(default = "default_dst_dir")]
    #[validate(custom(function = validate_writable_dir))]
    #[builder(default = default_dst_dir(), into)]
    dst_dir: PathBuf,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    schedule: ScheduleConfig,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    compressor: CompressorConfig,
    #[serde(default)]
    #[builder(default)]
    entry_error_policy: EntryErrorPolicy,
    #[validate(nested)]
    database: Option<MysqlDumpConfig>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackupConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        File::open(path)
            .map_err(Error::from)
            .and_then(|f| serde_yml::from_reader::<_, BackupConfig>(f).map_err(Error::from))
            .with_msg(format!("Parse YAML config failed: {:?}", path))
    }

    /// Applies database connection overrides.
    ///
    /// Given values replace those of an existing `database` section, keeping
    /// its other settings. Without a section, host, user and password must all
    /// be given.
    pub fn override_database(
        &mut self,
        host: Option<String>,
        user: Option<String>,
        password: Option<RedactedString>,
    ) -> Result<()> {
        if let Some(database) = &mut self.database {
            if let Some(host) = host {
                database.set_host(host);
            }
            if let Some(user) = user {
                database.set_user(user);
            }
            if let Some(password) = password {
                database.set_password(password);
            }
            return Ok(());
        }

        match (host, user, password) {
            (None, None, None) => Ok(()),
            (Some(host), Some(user), Some(password)) => {
                self.database = Some(
                    MysqlDumpConfig::builder()
                        .host(host)
                        .user(user)
                        .password(password)
                        .build(),
                );
                Ok(())
            }
            (host, user, password) => {
                let missing = [
                    ("host", host.is_none()),
                    ("user", user.is_none()),
                    ("password", password.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .join(", ");
                let mut errors = ValidationErrors::new();
                errors.add(
                    "database",
                    ValidationError::new("IncompleteDatabase").with_message(
                        format!("no database section configured, missing database {missing}")
                            .into(),
                    ),
                );
                Err(Error::from(errors))
            }
        }
    }

    /// Logs the effective settings once at startup.
    pub fn log_settings(&self) {
        let schedule = &self.schedule;
        for (name, value) in [
            ("backup_freq", schedule.backup_freq),
            ("short_keep", schedule.short_keep),
            ("long_freq", schedule.long_freq),
            ("long_keep", schedule.long_keep),
        ] {
            info!(
                "{name} is {} == {} seconds",
                format_duration(value),
                value.as_secs()
            );
        }
        info!("Backing up {:?} into {:?}", self.src_dir, self.dst_dir);
        info!(
            "Compressing with {} ({:?})",
            self.compressor.file_ext().as_deref().unwrap_or("none"),
            self.compressor
        );
        info!("Unreadable source entries: {:?}", self.entry_error_policy);
        match &self.database {
            Some(db) => info!("Dumping database on {} as {}", db.host(), db.user()),
            None => info!("No database configured, backing up files only"),
        }
    }

    pub fn tiered_backup(&self, pool: Arc<ThreadPool>) -> TieredBackup {
        TieredBackup::builder()
            .src_dir(self.src_dir.clone())
            .dst_dir(self.dst_dir.clone())
            .schedule(self.schedule)
            .compressor(self.compressor.clone())
            .entry_error_policy(self.entry_error_policy)
            .maybe_database(
                self.database
                    .clone()
                    .map(|db| Arc::new(db) as Arc<dyn DatabaseDump>),
            )
            .pool(pool)
            .build()
    }
}
