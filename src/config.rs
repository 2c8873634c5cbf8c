//! Process configuration
//!
//! Settings come from three layers, strongest first: positional command-line
//! arguments, long flags, environment variables (`MYSQL_HOST`,
//! `MYSQL_DATABASE`, `BACKUP_WORKERS`, ...). The parsed [`Cli`] resolves into
//! an immutable [`BackupConfig`] that is passed to every component.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use mysql_async::{Opts, OptsBuilder, PoolConstraints, PoolOpts};
use std::path::PathBuf;

/// Command-line interface for the backup tool.
#[derive(Parser, Debug)]
#[command(name = "mysql-adaptive-backup")]
#[command(about = "Adaptive parallel MySQL backup tool producing replayable SQL dumps")]
pub struct Cli {
    /// Database to back up (takes precedence over MYSQL_DATABASE)
    #[arg(value_name = "DATABASE")]
    pub database: Option<String>,

    /// MySQL host (takes precedence over MYSQL_HOST)
    #[arg(value_name = "HOST")]
    pub host: Option<String>,

    /// MySQL username (takes precedence over MYSQL_USERNAME)
    #[arg(value_name = "USERNAME")]
    pub username: Option<String>,

    /// MySQL host
    #[arg(long, env = "MYSQL_HOST", default_value = "localhost")]
    pub mysql_host: String,

    /// MySQL port
    #[arg(long, env = "MYSQL_PORT", default_value_t = 3306)]
    pub mysql_port: u16,

    /// MySQL username
    #[arg(long, env = "MYSQL_USERNAME", default_value = "root")]
    pub mysql_username: String,

    /// MySQL password
    #[arg(long, env = "MYSQL_PASSWORD", default_value = "")]
    pub mysql_password: String,

    /// Database to back up
    #[arg(long, env = "MYSQL_DATABASE")]
    pub mysql_database: Option<String>,

    /// Directory for generated backup files (created if absent)
    #[arg(long, env = "BACKUP_OUTPUT_DIR", default_value = "./backups")]
    pub output_dir: PathBuf,

    /// Number of parallel table workers (default: logical CPU count)
    #[arg(long, env = "BACKUP_WORKERS", default_value_t = num_cpus::get())]
    pub workers: usize,

    /// Page size for cursor-paged extraction
    #[arg(long, env = "BACKUP_BATCH_SIZE", default_value_t = 50_000)]
    pub batch_size: usize,

    /// Maximum rows per multi-row INSERT statement
    #[arg(long, env = "BACKUP_MULTI_INSERT", default_value_t = 1_000)]
    pub multi_insert: usize,
}

impl Cli {
    /// Resolve the layered settings into a validated configuration record.
    pub fn into_config(self) -> Result<BackupConfig> {
        let database = self.database.or(self.mysql_database).context(
            "no database selected; pass DATABASE as the first argument or set MYSQL_DATABASE",
        )?;
        ensure!(self.workers >= 1, "--workers must be at least 1");
        ensure!(self.batch_size >= 1, "--batch-size must be at least 1");
        ensure!(self.multi_insert >= 1, "--multi-insert must be at least 1");

        Ok(BackupConfig {
            host: self.host.unwrap_or(self.mysql_host),
            port: self.mysql_port,
            username: self.username.unwrap_or(self.mysql_username),
            password: self.mysql_password,
            database,
            output_dir: self.output_dir,
            workers: self.workers,
            batch_size: self.batch_size,
            multi_insert: self.multi_insert,
        })
    }
}

/// Immutable configuration for one backup run.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub output_dir: PathBuf,
    /// Number of tables exported concurrently.
    pub workers: usize,
    /// Rows fetched per page by the cursor-paged strategies.
    pub batch_size: usize,
    /// Maximum value-tuples per multi-row INSERT statement.
    pub multi_insert: usize,
}

impl BackupConfig {
    /// Connection options with a pool sized for parallel table exports: at
    /// most two connections per worker, idle connections capped at the
    /// worker count, so concurrent tasks never exhaust the pool.
    pub fn mysql_opts(&self) -> Result<Opts> {
        let constraints = PoolConstraints::new(self.workers, self.workers * 2)
            .context("invalid MySQL pool constraints")?;
        let opts_builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(self.host.as_str())
            .tcp_port(self.port)
            .user(Some(self.username.as_str()))
            .pass(Some(self.password.as_str()))
            .db_name(Some(self.database.as_str()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        Ok(opts_builder.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    /// Clear every environment variable the CLI reads so parsing sees only
    /// the given arguments. The lock serializes env-mutating tests because
    /// the harness runs tests in parallel threads.
    fn scrubbed_env() -> MutexGuard<'static, ()> {
        static ENV_LOCK: Mutex<()> = Mutex::new(());
        let guard = ENV_LOCK.lock().unwrap();
        for key in [
            "MYSQL_HOST",
            "MYSQL_PORT",
            "MYSQL_USERNAME",
            "MYSQL_PASSWORD",
            "MYSQL_DATABASE",
            "BACKUP_OUTPUT_DIR",
            "BACKUP_WORKERS",
            "BACKUP_BATCH_SIZE",
            "BACKUP_MULTI_INSERT",
        ] {
            std::env::remove_var(key);
        }
        guard
    }

    #[test]
    fn positional_arguments_override_flag_values() {
        let _env = scrubbed_env();
        let cli = Cli::try_parse_from([
            "mysql-adaptive-backup",
            "proddb",
            "db.internal",
            "backup_user",
            "--mysql-host",
            "ignored.example.com",
            "--mysql-database",
            "ignored_db",
        ])
        .unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.database, "proddb");
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.username, "backup_user");
    }

    #[test]
    fn knobs_fall_back_to_documented_defaults() {
        let _env = scrubbed_env();
        let cli = Cli::try_parse_from(["mysql-adaptive-backup", "testdb"]).unwrap();
        let config = cli.into_config().unwrap();

        assert_eq!(config.batch_size, 50_000);
        assert_eq!(config.multi_insert, 1_000);
        assert_eq!(config.workers, num_cpus::get());
        assert_eq!(config.port, 3306);
    }

    #[test]
    fn missing_database_is_an_error() {
        let _env = scrubbed_env();
        let cli = Cli::try_parse_from(["mysql-adaptive-backup"]).unwrap();
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let _env = scrubbed_env();
        let cli =
            Cli::try_parse_from(["mysql-adaptive-backup", "testdb", "--workers", "0"]).unwrap();
        assert!(cli.into_config().is_err());
    }
}
