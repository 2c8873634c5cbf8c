//! End-to-end backup session
//!
//! Drives one full run: connect and ping, list tables, write the file header,
//! export all tables concurrently, reassemble the successful fragments in
//! catalog order, write the footer, and report a summary. Connection,
//! catalog, and sink failures are fatal; per-table failures are already
//! absorbed into their `TableResult`.
//!
//! The sink is written by this task only, strictly after all table tasks
//! have completed, so no write-side locking is needed.

use crate::config::BackupConfig;
use crate::orchestrator::{self, TableResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use mysql_async::{prelude::*, Pool};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Trailing directive re-enabling foreign-key checks after the load.
pub const FOOTER: &str = "\nSET FOREIGN_KEY_CHECKS=1;\n";

/// Final accounting for one backup run.
#[derive(Debug)]
pub struct BackupSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total_rows: u64,
    pub elapsed: Duration,
    pub output_path: PathBuf,
}

impl BackupSummary {
    /// Exported rows per second over the whole run.
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_rows as f64 / secs
        } else {
            0.0
        }
    }
}

/// Timestamped backup file name for a database.
pub fn backup_filename(database: &str, stamp: DateTime<Local>) -> String {
    format!("{database}_backup_{}.sql", stamp.format("%Y%m%d_%H%M%S"))
}

/// Render the file header: run metadata plus the session directives that
/// make the script replayable (foreign-key checks off, non-strict auto-value
/// mode, UTC session time zone).
pub fn render_header(config: &BackupConfig, stamp: DateTime<Local>) -> String {
    format!(
        "-- MySQL database backup (adaptive strategy selection)\n\
         -- Database: {database}\n\
         -- Generated: {generated}\n\
         -- Host: {host}:{port}\n\
         -- Workers: {workers}\n\
         -- Page size: {batch_size}\n\
         -- Multi-insert size: {multi_insert}\n\
         \n\
         SET FOREIGN_KEY_CHECKS=0;\n\
         SET SQL_MODE=\"NO_AUTO_VALUE_ON_ZERO\";\n\
         SET time_zone = \"+00:00\";\n\
         \n",
        database = config.database,
        generated = stamp.format("%Y-%m-%d %H:%M:%S"),
        host = config.host,
        port = config.port,
        workers = config.workers,
        batch_size = config.batch_size,
        multi_insert = config.multi_insert,
    )
}

/// Write the successful fragments in ordinal order, skipping failed tables.
/// Returns `(succeeded, failed, total_rows)`.
pub fn write_fragments<W: Write>(
    writer: &mut W,
    results: &[TableResult],
) -> Result<(usize, usize, u64)> {
    let mut succeeded = 0;
    let mut failed = 0;
    let mut total_rows = 0u64;

    for result in results {
        match &result.error {
            Some(e) => {
                warn!("omitting table `{}` from output: {e:#}", result.table);
                failed += 1;
            }
            None => {
                writer
                    .write_all(result.fragment.as_bytes())
                    .with_context(|| format!("failed to write fragment for `{}`", result.table))?;
                writer.write_all(b"\n")?;
                succeeded += 1;
                total_rows += result.rows;
            }
        }
    }

    Ok((succeeded, failed, total_rows))
}

/// List the database's tables; the listing order fixes the output order.
async fn list_tables(conn: &mut mysql_async::Conn) -> Result<Vec<String>> {
    let tables: Vec<String> = conn
        .query("SHOW TABLES")
        .await
        .context("failed to list tables")?;
    Ok(tables)
}

/// Run the full backup and return its summary.
pub async fn run_backup(config: &BackupConfig) -> Result<BackupSummary> {
    let start = Instant::now();

    let pool = Pool::new(config.mysql_opts()?);
    let mut conn = pool.get_conn().await.with_context(|| {
        format!("failed to connect to MySQL at {}:{}", config.host, config.port)
    })?;
    conn.ping().await.context("MySQL ping failed")?;
    info!("connected to database `{}`", config.database);

    let tables = list_tables(&mut conn).await?;
    drop(conn);
    info!("found {} tables to back up", tables.len());

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("failed to create output directory {:?}", config.output_dir)
    })?;
    let stamp = Local::now();
    let output_path = config
        .output_dir
        .join(backup_filename(&config.database, stamp));
    let file = File::create(&output_path)
        .with_context(|| format!("failed to create backup file {output_path:?}"))?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);

    writer
        .write_all(render_header(config, stamp).as_bytes())
        .context("failed to write header")?;

    let table_count = tables.len();
    let results = orchestrator::export_all(&pool, config, tables).await?;

    let (succeeded, failed, total_rows) = write_fragments(&mut writer, &results)?;

    writer
        .write_all(FOOTER.as_bytes())
        .context("failed to write footer")?;
    writer.flush().context("failed to flush backup file")?;

    pool.disconnect()
        .await
        .context("failed to shut down connection pool")?;

    let summary = BackupSummary {
        succeeded,
        failed,
        total_rows,
        elapsed: start.elapsed(),
        output_path,
    };

    let elapsed_secs = summary.elapsed.as_secs_f64();
    info!("backup written to {:?}", summary.output_path);
    info!(
        "{} succeeded, {} failed, {} rows in {:.2}s ({:.2}s/table avg, {:.0} rows/s)",
        summary.succeeded,
        summary.failed,
        summary.total_rows,
        elapsed_secs,
        elapsed_secs / table_count.max(1) as f64,
        summary.rows_per_second(),
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config() -> BackupConfig {
        BackupConfig {
            host: "db.example.com".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: "shop".to_string(),
            output_dir: PathBuf::from("./backups"),
            workers: 4,
            batch_size: 50_000,
            multi_insert: 1_000,
        }
    }

    fn ok_result(index: usize, table: &str, rows: u64) -> TableResult {
        TableResult {
            table: table.to_string(),
            index,
            rows,
            fragment: format!("-- Structure for table `{table}`\n"),
            error: None,
        }
    }

    fn failed_result(index: usize, table: &str) -> TableResult {
        TableResult {
            table: table.to_string(),
            index,
            rows: 0,
            fragment: String::new(),
            error: Some(anyhow::anyhow!("data query failed")),
        }
    }

    #[test]
    fn filename_carries_database_and_stamp() {
        let stamp = Local.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        assert_eq!(
            backup_filename("shop", stamp),
            "shop_backup_20240309_143005.sql"
        );
    }

    #[test]
    fn header_contains_settings_and_session_directives() {
        let stamp = Local.with_ymd_and_hms(2024, 3, 9, 14, 30, 5).unwrap();
        let header = render_header(&test_config(), stamp);

        assert!(header.contains("-- Database: shop"));
        assert!(header.contains("-- Host: db.example.com:3306"));
        assert!(header.contains("-- Workers: 4"));
        assert!(header.contains("-- Page size: 50000"));
        assert!(header.contains("-- Multi-insert size: 1000"));
        assert!(header.contains("SET FOREIGN_KEY_CHECKS=0;"));
        assert!(header.contains("SET SQL_MODE=\"NO_AUTO_VALUE_ON_ZERO\";"));
        assert!(header.contains("SET time_zone = \"+00:00\";"));
    }

    #[test]
    fn failed_table_is_omitted_but_counted() {
        let results = vec![
            ok_result(0, "t1", 10),
            failed_result(1, "t2"),
            ok_result(2, "t3", 7),
        ];

        let mut sink = Vec::new();
        let (succeeded, failed, total_rows) = write_fragments(&mut sink, &results).unwrap();

        assert_eq!(succeeded, 2);
        assert_eq!(failed, 1);
        assert_eq!(succeeded + failed, results.len());
        assert_eq!(total_rows, 17);

        let output = String::from_utf8(sink).unwrap();
        let t1 = output.find("`t1`").unwrap();
        let t3 = output.find("`t3`").unwrap();
        assert!(t1 < t3);
        assert!(!output.contains("`t2`"));
    }

    #[test]
    fn fragments_appear_in_ordinal_order() {
        let results: Vec<TableResult> = (0..5)
            .map(|i| ok_result(i, &format!("table_{i}"), 1))
            .collect();

        let mut sink = Vec::new();
        write_fragments(&mut sink, &results).unwrap();
        let output = String::from_utf8(sink).unwrap();

        let positions: Vec<usize> = (0..5)
            .map(|i| output.find(&format!("`table_{i}`")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn throughput_is_zero_for_zero_elapsed() {
        let summary = BackupSummary {
            succeeded: 1,
            failed: 0,
            total_rows: 100,
            elapsed: Duration::ZERO,
            output_path: PathBuf::from("x.sql"),
        };
        assert_eq!(summary.rows_per_second(), 0.0);
    }
}
