//! Bounded worker pool with ordinal-ordered result collection
//!
//! One task is launched per table immediately; each blocks on a counting
//! permit before doing any query work and holds it for the table's entire
//! export. Results land in a pre-sized vector at the table's original index,
//! so the final order is always the catalog-listing order regardless of
//! which tasks finish first. Progress logging, by contrast, interleaves in
//! real completion order.

use crate::config::BackupConfig;
use crate::exporter;
use anyhow::{Context, Result};
use mysql_async::Pool;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Outcome of one table's export, indexed by the table's original position
/// in the job. A failed table keeps an empty fragment and carries its error;
/// it is omitted from the final file but still counted in the summary.
pub struct TableResult {
    pub table: String,
    pub index: usize,
    pub rows: u64,
    pub fragment: String,
    pub error: Option<anyhow::Error>,
}

/// Run `task` once per item under a counting permit bounded to
/// `min(limit, items.len())`, returning results in the items' original order
/// regardless of completion order. Individual item failures are the caller's
/// concern (encode them in `R`); only task panics and pool shutdown surface
/// as errors here.
pub async fn run_ordered<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let permits = limit.min(total).max(1);
    let semaphore = Arc::new(Semaphore::new(permits));
    let task = Arc::new(task);

    let mut handles = Vec::with_capacity(total);
    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let task = Arc::clone(&task);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .context("worker semaphore closed")?;
            Ok::<(usize, R), anyhow::Error>((index, task(index, item).await))
        }));
    }

    let mut results: Vec<Option<R>> = Vec::with_capacity(total);
    results.resize_with(total, || None);
    for handle in handles {
        let (index, result) = handle.await.context("table export task panicked")??;
        results[index] = Some(result);
    }

    results
        .into_iter()
        .map(|slot| slot.context("missing table export result"))
        .collect()
}

/// Export every table in the job concurrently, collecting one result per
/// table in catalog order. One table's failure never cancels its siblings;
/// there is no retry or timeout for an in-flight export.
pub async fn export_all(
    pool: &Pool,
    config: &BackupConfig,
    tables: Vec<String>,
) -> Result<Vec<TableResult>> {
    let workers = config.workers.min(tables.len()).max(1);
    info!("backing up {} tables with {} workers", tables.len(), workers);

    let pool = pool.clone();
    let config = config.clone();
    run_ordered(tables, workers, move |index, table| {
        let pool = pool.clone();
        let config = config.clone();
        async move {
            let start = Instant::now();
            info!("table `{table}`: export started");
            let outcome = export_one(&pool, &config, &table).await;
            let elapsed = start.elapsed().as_secs_f64();
            match outcome {
                Ok((fragment, rows)) => {
                    info!("table `{table}`: export finished ({elapsed:.2}s, {rows} rows)");
                    TableResult {
                        table,
                        index,
                        rows,
                        fragment,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("table `{table}`: export failed ({elapsed:.2}s): {e:#}");
                    TableResult {
                        table,
                        index,
                        rows: 0,
                        fragment: String::new(),
                        error: Some(e),
                    }
                }
            }
        }
    })
    .await
}

async fn export_one(pool: &Pool, config: &BackupConfig, table: &str) -> Result<(String, u64)> {
    // The pooled connection is acquired after the permit, inside the task.
    let mut conn = pool
        .get_conn()
        .await
        .context("failed to get connection from pool")?;
    exporter::export_table(&mut conn, config, table).await
}
