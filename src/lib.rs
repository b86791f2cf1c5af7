//! # tiered_backup
//!
//! A backup daemon keeping two tiers of timestamped backups of a directory
//! tree and, optionally, a MySQL/MariaDB database.
//!
//! ## Features
//!
//! - **Short Tier**: A backup every `backup_freq`, kept for `short_keep`
//! - **Long Tier**: Every `long_freq` a short backup is hard-linked into the
//!   long tier and kept for `long_keep`
//! - **Compression**: gzip by default, XZ (LZMA) with parallel processing
//! - **Database Dump**: `mysqldump` output streamed into the backup
//! - **Parallel Processing**: File archive and database dump run side by side
//!
//! ## Quick Start
//!
//! ```no_run
//! use tiered_backup::backup::backup_config::BackupConfig;
//! use tiered_backup::backup::shutdown::Shutdown;
//!
//! // Load configuration from YAML file
//! let config = BackupConfig::from_yaml_file("config.yml")?;
//!
//! // Start the backup daemon
//! let thread_pool = rayon::ThreadPoolBuilder::new().build()?;
//! config
//!     .tiered_backup(std::sync::Arc::new(thread_pool))
//!     .run(&Shutdown::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
