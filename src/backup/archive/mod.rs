pub mod mysqldump;
pub mod tree;

use crate::backup::compress::CompressorConfig;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;

/// Stem of the source tree archive inside a backup entry
pub static FILES_ARCHIVE_STEM: &str = "files.tar";

/// Stem of the database dump inside a backup entry
pub static DB_DUMP_STEM: &str = "dbdump.sql";

/// File name of an artifact once the compressor's extension is appended,
/// e.g. `files.tar.gz`.
pub fn artifact_name(stem: &str, compressor: &CompressorConfig) -> String {
    match compressor.file_ext() {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// The part of the source tree left out of an archive after a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skipped<'a> {
    /// A directory whose children could not be listed, with everything below it
    Subtree(&'a Path),
    /// A single file, link or directory header that could not be added
    Entry(&'a Path),
}

impl Display for Skipped<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Skipped::Subtree(p) => write!(f, "directory {:?}", p),
            Skipped::Entry(p) => write!(f, "file or directory {:?}", p),
        }
    }
}

/// Decides what an archive failure on one part of the tree means for the rest.
///
/// Returning `Ok` skips the part and keeps archiving; returning `Err` aborts
/// the archive with that error.
pub trait EntryErrorHandler: Sync {
    fn on_error(&self, skipped: Skipped<'_>, error: Error) -> Result<()>;
}

/// Stock [`EntryErrorHandler`] strategies selectable from configuration
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryErrorPolicy {
    /// Log a warning and leave the part out of the backup
    #[default]
    SkipAndLog,
    /// Fail the whole archive on the first unreadable part
    Abort,
}

impl EntryErrorHandler for EntryErrorPolicy {
    fn on_error(&self, skipped: Skipped<'_>, error: Error) -> Result<()> {
        match self {
            EntryErrorPolicy::SkipAndLog => {
                tracing::warn!(
                    "Error handling {}: {}. It will not be saved in the backup.",
                    skipped,
                    error
                );
                Ok(())
            }
            EntryErrorPolicy::Abort => Err(error.with_msg(format!("Archiving {} failed", skipped))),
        }
    }
}

/// Produces the compressed database dump of a backup entry.
pub trait DatabaseDump: Debug + Send + Sync {
    /// Writes the dump, compressed with `compressor`, to `dst`.
    ///
    /// On failure no file is left at `dst`.
    fn dump_to(&self, dst: &Path, compressor: &CompressorConfig) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_artifact_names_follow_compressor() {
        let gzip = CompressorConfig::default();
        assert_eq!(artifact_name(FILES_ARCHIVE_STEM, &gzip), "files.tar.gz");
        assert_eq!(artifact_name(DB_DUMP_STEM, &gzip), "dbdump.sql.gz");

        let xz: CompressorConfig = serde_yml::from_str("compressor_type: xz\n").unwrap();
        assert_eq!(artifact_name(FILES_ARCHIVE_STEM, &xz), "files.tar.xz");
    }

    #[test]
    fn test_skip_and_log_swallows_error() {
        let path = PathBuf::from("/src/lost+found");
        let res = EntryErrorPolicy::SkipAndLog.on_error(
            Skipped::Subtree(&path),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied).into(),
        );
        assert!(res.is_ok());
    }

    #[test]
    fn test_abort_names_the_skipped_part() {
        let path = PathBuf::from("/src/wp-config.php");
        let err = EntryErrorPolicy::Abort
            .on_error(
                Skipped::Entry(&path),
                std::io::Error::from(std::io::ErrorKind::PermissionDenied).into(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("wp-config.php"));
    }

    #[test]
    fn test_policy_from_yaml() {
        let policy: EntryErrorPolicy = serde_yml::from_str("abort").unwrap();
        assert_eq!(policy, EntryErrorPolicy::Abort);
        assert_eq!(EntryErrorPolicy::default(), EntryErrorPolicy::SkipAndLog);
    }
}
