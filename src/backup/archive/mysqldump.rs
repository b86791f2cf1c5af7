use crate::backup::archive::DatabaseDump;
use crate::backup::compress::{
    create_compressed_file, finish_compressed_file, CompressedFile, CompressorConfig,
};
use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use bon::Builder;
use function_name::named;
use getset::{Getters, Setters};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};
use validator::Validate;

fn default_program() -> PathBuf {
    PathBuf::from("mysqldump")
}

fn default_args() -> Vec<String> {
    vec!["--all-databases".to_string()]
}

/// Dumps a MySQL/MariaDB server with `mysqldump`
///
/// The command runs as `<program> -h <host> -u <user> <args...>` with the
/// password in `MYSQL_PWD`, and its standard output is compressed into the
/// backup entry.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, Setters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub", set = "pub")]
pub struct MysqlDumpConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[validate(length(min = 1))]
    #[builder(into)]
    user: String,
    #[builder(into)]
    password: RedactedString,
    #[serde(default = "default_program")]
    #[builder(default = default_program(), into)]
    program: PathBuf,
    #[serde(default = "default_args")]
    #[builder(default = default_args())]
    args: Vec<String>,
}

impl DatabaseDump for MysqlDumpConfig {
    #[named]
    fn dump_to(&self, dst: &Path, compressor: &CompressorConfig) -> Result<()> {
        let writer = create_compressed_file(dst, compressor)
            .with_debug_object_and_fn_name(self.clone(), function_path!())?;

        let res = self.run_into(writer);
        if res.is_err() {
            if let Err(e) = std::fs::remove_file(dst) {
                warn!("Removing incomplete dump {:?} failed: {}", dst, e);
            }
        }
        res.with_debug_object_and_fn_name(self.clone(), function_path!())
    }
}

impl MysqlDumpConfig {
    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn run_into(&self, mut writer: CompressedFile) -> Result<()> {
        info!(
            "Dumping database on {} as {} with {}",
            self.host,
            self.user,
            self.program_name()
        );

        let mut child = Command::new(&self.program)
            .arg("-h")
            .arg(&self.host)
            .arg("-u")
            .arg(&self.user)
            .args(&self.args)
            .env("MYSQL_PWD", self.password.inner())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured);
                captured
            })
        });

        let copied = match child.stdout.take() {
            Some(mut stdout) => std::io::copy(&mut stdout, &mut writer).map_err(Error::from),
            None => Err(Error::from(std::io::Error::other("dump stdout was not captured"))),
        };

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(Error::CommandFailed {
                program: self.program_name(),
                status,
                stderr,
            });
        }

        let bytes = copied?;
        finish_compressed_file(writer)?;
        if !stderr.trim().is_empty() {
            warn!("{} reported: {}", self.program_name(), stderr.trim());
        }
        info!("Database dump complete, {} bytes before compression", bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs::File;
    use tempfile::TempDir;

    fn config_with_program(program: &str) -> MysqlDumpConfig {
        MysqlDumpConfig::builder()
            .host("db.internal")
            .user("wordpress")
            .password(RedactedString::from("s3cret-pass".to_string()))
            .program(program)
            .build()
    }

    #[test]
    fn test_dump_output_is_compressed_into_destination() {
        let out = TempDir::new().unwrap();
        let dst = out.path().join("dbdump.sql.gz");

        config_with_program("echo")
            .dump_to(&dst, &CompressorConfig::default())
            .unwrap();

        let mut dumped = String::new();
        GzDecoder::new(File::open(&dst).unwrap())
            .read_to_string(&mut dumped)
            .unwrap();
        assert_eq!(dumped.trim(), "-h db.internal -u wordpress --all-databases");
        assert!(!dumped.contains("s3cret-pass"));
    }

    #[test]
    fn test_failing_command_leaves_no_file() {
        let out = TempDir::new().unwrap();
        let dst = out.path().join("dbdump.sql.gz");

        let err = config_with_program("false")
            .dump_to(&dst, &CompressorConfig::default())
            .unwrap_err();

        assert!(err.to_string().contains("false exited with"));
        assert!(!dst.exists());
    }

    #[test]
    fn test_missing_program_leaves_no_file() {
        let out = TempDir::new().unwrap();
        let dst = out.path().join("dbdump.sql.gz");

        let res = config_with_program("/nonexistent/mysqldump")
            .dump_to(&dst, &CompressorConfig::default());

        assert!(res.is_err());
        assert!(!dst.exists());
    }

    #[test]
    fn test_config_from_yaml_uses_defaults_and_redacts() {
        let config: MysqlDumpConfig =
            serde_yml::from_str("host: mysql\nuser: root\npassword: topsecret\n").unwrap();

        assert_eq!(config.program(), &PathBuf::from("mysqldump"));
        assert_eq!(config.args(), &vec!["--all-databases".to_string()]);
        assert!(config.validate().is_ok());
        assert!(!format!("{:?}", config).contains("topsecret"));
    }

    #[test]
    fn test_empty_host_fails_validation() {
        let config: MysqlDumpConfig =
            serde_yml::from_str("host: ''\nuser: root\npassword: pw\n").unwrap();
        assert!(config.validate().is_err());
    }
}
