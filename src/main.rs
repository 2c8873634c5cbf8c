//! Command-line interface for mysql-adaptive-backup
//!
//! # Usage Examples
//!
//! ```bash
//! # Back up a database, settings from the environment
//! MYSQL_PASSWORD=secret mysql-adaptive-backup shop
//!
//! # Positional arguments override environment-sourced values
//! mysql-adaptive-backup shop db.internal backup_user
//!
//! # Tune the worker pool and paging knobs
//! mysql-adaptive-backup shop \
//!   --workers 8 \
//!   --batch-size 20000 \
//!   --multi-insert 500 \
//!   --output-dir /var/backups/mysql
//! ```
//!
//! The output is a single `<database>_backup_<YYYYMMDD_HHMMSS>.sql` file that
//! replays with `mysql < file.sql`.

use clap::Parser;
use mysql_adaptive_backup::config::Cli;
use mysql_adaptive_backup::session;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Cli::parse().into_config()?;

    info!("host: {}:{}", config.host, config.port);
    info!("user: {}", config.username);
    info!("database: {}", config.database);
    info!("output directory: {:?}", config.output_dir);
    info!("workers: {}", config.workers);
    info!("page size: {}", config.batch_size);
    info!("multi-insert size: {}", config.multi_insert);

    let summary = session::run_backup(&config).await?;
    info!(
        "backup completed: {} tables succeeded, {} failed",
        summary.succeeded, summary.failed
    );

    Ok(())
}
