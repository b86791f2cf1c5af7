use clap::Parser;
use rayon::ThreadPoolBuilder;
use std::convert::Infallible;
use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;
use tiered_backup::backup::backup_config::BackupConfig;
use tiered_backup::backup::duration::parse_duration;
use tiered_backup::backup::redacted::RedactedString;
use tiered_backup::backup::result_error::error::Error;
use tiered_backup::backup::result_error::result::Result;
use tiered_backup::backup::result_error::WithMsg;
use tiered_backup::backup::shutdown::{install_signal_handler, Shutdown};
use tracing::{error, info};
use validator::Validate;

fn duration_arg(s: &str) -> std::result::Result<Duration, Infallible> {
    Ok(parse_duration(s))
}

/// Keep short and long term backups of a directory and a MySQL database
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of YAML config file, flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How often to make a backup, e.g. "2d4h7m" [default: 1d]
    #[arg(short, long, alias = "backup_freq", value_parser = duration_arg)]
    backup_freq: Option<Duration>,

    /// How long to keep short term backups [default: 7d]
    #[arg(long, alias = "short_keep", value_parser = duration_arg)]
    short_keep: Option<Duration>,

    /// How often to keep a long term backup [default: 7d]
    #[arg(short, long, alias = "long_freq", value_parser = duration_arg)]
    long_freq: Option<Duration>,

    /// How long to keep long term backups [default: 28d]
    #[arg(long, alias = "long_keep", value_parser = duration_arg)]
    long_keep: Option<Duration>,

    /// Directory to back up [default: /src]
    #[arg(long)]
    src_dir: Option<PathBuf>,

    /// Directory holding the backup tiers [default: /dst]
    #[arg(long)]
    dst_dir: Option<PathBuf>,

    /// Database host; with user and password enables the dump when the config has none
    #[arg(long)]
    db_host: Option<String>,

    /// Database user
    #[arg(long)]
    db_user: Option<String>,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,
}

fn load_config(args: Args) -> Result<BackupConfig> {
    let mut config = match &args.config {
        Some(path) => BackupConfig::from_yaml_file(path)?,
        None => BackupConfig::default(),
    };

    let mut schedule = *config.schedule();
    if let Some(v) = args.backup_freq {
        schedule.set_backup_freq(v);
    }
    if let Some(v) = args.short_keep {
        schedule.set_short_keep(v);
    }
    if let Some(v) = args.long_freq {
        schedule.set_long_freq(v);
    }
    if let Some(v) = args.long_keep {
        schedule.set_long_keep(v);
    }
    config.set_schedule(schedule);

    if let Some(v) = args.src_dir {
        config.set_src_dir(v);
    }
    if let Some(v) = args.dst_dir {
        config.set_dst_dir(v);
    }
    config.override_database(
        args.db_host,
        args.db_user,
        args.db_password.map(RedactedString::from),
    )?;

    config
        .validate()
        .map_err(Error::from)
        .map(|_| config)
        .with_msg("Config validation failed")
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // Before the thread pool exists, so every worker inherits the signal mask.
    let shutdown = Shutdown::new();
    let res = install_signal_handler(shutdown.clone())
        .and_then(|_| load_config(args))
        .and_then(|config| {
            config.log_settings();
            let thread_pool = ThreadPoolBuilder::new().build()?;
            config.tiered_backup(thread_pool.into()).run(&shutdown)
        });

    match res {
        Ok(_) => info!("Backup daemon stopped"),
        Err(e) => {
            error!("{e}");
            exit(1);
        }
    }
}
