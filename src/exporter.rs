//! Per-table export: structure plus strategy-selected data
//!
//! Builds one table's complete script fragment. Structure is a prerequisite
//! for data, so a failed `SHOW CREATE TABLE` fails the table; any strategy
//! failure propagates as the table's error without affecting sibling tables.

use crate::analyzer;
use crate::config::BackupConfig;
use crate::strategy;
use crate::value::escape_identifier;
use anyhow::{Context, Result};
use mysql_async::{prelude::*, Conn};
use std::fmt::Write as _;
use tracing::debug;

/// Fetch the table's creation statement from the server.
async fn create_table_statement(conn: &mut Conn, table: &str) -> Result<String> {
    let query = format!("SHOW CREATE TABLE {}", escape_identifier(table));
    let row: Option<(String, String)> = conn.query_first(query).await?;
    let (_, create_sql) =
        row.with_context(|| format!("no creation statement returned for `{table}`"))?;
    Ok(create_sql)
}

/// Build one table's complete script fragment (DROP, CREATE, INSERTs) and
/// return it with the exported row count.
pub async fn export_table(
    conn: &mut Conn,
    config: &BackupConfig,
    table: &str,
) -> Result<(String, u64)> {
    let create_sql = create_table_statement(conn, table)
        .await
        .with_context(|| format!("failed to fetch structure of `{table}`"))?;

    let info = analyzer::analyze_table(conn, &config.database, table).await;
    debug!(
        "table `{table}`: ~{} rows, order column `{}` ({}), method {}",
        info.estimated_rows, info.order_column, info.order_column_type, info.method
    );

    let (data_sql, row_count) =
        strategy::export_table_data(conn, &info, config.batch_size, config.multi_insert)
            .await
            .with_context(|| format!("failed to export data of `{table}`"))?;

    let ident = escape_identifier(table);
    let mut fragment = String::new();
    writeln!(fragment, "-- Structure for table {ident}")?;
    writeln!(fragment, "DROP TABLE IF EXISTS {ident};")?;
    writeln!(fragment, "{create_sql};")?;
    if !data_sql.is_empty() {
        writeln!(fragment)?;
        writeln!(
            fragment,
            "-- Data for table {ident} ({row_count} rows, {})",
            info.method
        )?;
        writeln!(fragment, "{data_sql}")?;
    }

    Ok((fragment, row_count))
}
