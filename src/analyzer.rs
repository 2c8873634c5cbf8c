//! Table analysis: row-count estimation and ordering-column selection
//!
//! Each table is analyzed immediately before its export. The row estimate
//! comes from the statistics tables and is advisory only: it picks a
//! strategy, it is never used for correctness, and any failure to obtain it
//! degrades to zero instead of failing the table.

use mysql_async::{prelude::*, Conn};
use std::fmt;
use tracing::debug;

/// Estimated row count above which a table is exported with a paged or
/// streaming strategy instead of a single unrestricted scan.
pub const LARGE_TABLE_THRESHOLD: u64 = 10_000;

/// How a large table's rows are retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Keyset pagination over an auto-increment column.
    AutoIncrementCursor,
    /// Keyset pagination over the first integer-family primary-key column.
    IntegerPkCursor,
    /// Keyset pagination over a temporal column.
    TimestampCursor,
    /// Keyset pagination over the hidden `_rowid` pseudo-column, degrading to
    /// a streaming scan when the server does not expose it.
    RowidCursor,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ExtractionMethod::AutoIncrementCursor => "auto_increment_cursor",
            ExtractionMethod::IntegerPkCursor => "integer_pk_cursor",
            ExtractionMethod::TimestampCursor => "timestamp_cursor",
            ExtractionMethod::RowidCursor => "rowid_cursor",
        };
        f.write_str(tag)
    }
}

/// Per-table export plan, computed fresh right before the export and
/// discarded once the table's export completes.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    /// Best-effort statistics estimate; may be stale or zero.
    pub estimated_rows: u64,
    pub is_large: bool,
    /// Chosen ordering column; `_rowid` when synthetic.
    pub order_column: String,
    pub order_column_type: String,
    pub method: ExtractionMethod,
    pub has_auto_increment: bool,
    pub has_timestamp: bool,
}

/// Analyze one table. Selection never fails: the absence of any real
/// ordering candidate terminates at the synthetic `_rowid` fallback, and
/// catalog lookup errors are treated as missing candidates.
pub async fn analyze_table(conn: &mut Conn, database: &str, table: &str) -> TableInfo {
    let estimated_rows = estimate_rows(conn, database, table).await;
    let (order_column, order_column_type, method) =
        find_order_column(conn, database, table).await;
    let type_lowered = order_column_type.to_lowercase();

    TableInfo {
        name: table.to_string(),
        estimated_rows,
        is_large: estimated_rows > LARGE_TABLE_THRESHOLD,
        has_auto_increment: method == ExtractionMethod::AutoIncrementCursor,
        has_timestamp: type_lowered.contains("timestamp") || type_lowered.contains("datetime"),
        order_column,
        order_column_type,
        method,
    }
}

/// Best-effort row estimate from `INFORMATION_SCHEMA.TABLES`. Failures are
/// swallowed and reported as zero; they only affect the large/small
/// classification.
async fn estimate_rows(conn: &mut Conn, database: &str, table: &str) -> u64 {
    let query = "
        SELECT COALESCE(TABLE_ROWS, 0)
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
    ";

    match conn.exec_first::<u64, _, _>(query, (database, table)).await {
        Ok(Some(rows)) => rows,
        Ok(None) => 0,
        Err(e) => {
            debug!("row estimate for `{table}` failed, assuming 0: {e}");
            0
        }
    }
}

/// Pick the best ordering column by strict priority, first match wins:
/// auto-increment column, then the first integer-family primary-key column,
/// then a temporal column with name-based tie-breaking, then the hidden
/// `_rowid` pseudo-column.
async fn find_order_column(
    conn: &mut Conn,
    database: &str,
    table: &str,
) -> (String, String, ExtractionMethod) {
    let auto_increment_query = "
        SELECT COLUMN_NAME, COLUMN_TYPE
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        AND EXTRA LIKE '%auto_increment%'
        LIMIT 1
    ";
    if let Some((name, column_type)) =
        first_candidate(conn, auto_increment_query, (database, table)).await
    {
        return (name, column_type, ExtractionMethod::AutoIncrementCursor);
    }

    let integer_pk_query = "
        SELECT c.COLUMN_NAME, c.COLUMN_TYPE
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
        JOIN INFORMATION_SCHEMA.COLUMNS c ON k.COLUMN_NAME = c.COLUMN_NAME
        WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ?
        AND k.CONSTRAINT_NAME = 'PRIMARY'
        AND c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
        AND c.DATA_TYPE IN ('int', 'bigint', 'smallint', 'tinyint', 'mediumint')
        ORDER BY k.ORDINAL_POSITION
        LIMIT 1
    ";
    if let Some((name, column_type)) =
        first_candidate(conn, integer_pk_query, (database, table, database, table)).await
    {
        return (name, column_type, ExtractionMethod::IntegerPkCursor);
    }

    let timestamp_query = "
        SELECT COLUMN_NAME, COLUMN_TYPE
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        AND (DATA_TYPE IN ('timestamp', 'datetime')
             OR COLUMN_NAME IN ('created_at', 'updated_at', 'date_created', 'date_modified'))
        ORDER BY
            CASE
                WHEN COLUMN_NAME = 'created_at' THEN 1
                WHEN COLUMN_NAME = 'date_created' THEN 2
                WHEN COLUMN_NAME = 'updated_at' THEN 3
                WHEN DATA_TYPE = 'timestamp' THEN 4
                WHEN DATA_TYPE = 'datetime' THEN 5
                ELSE 6
            END
        LIMIT 1
    ";
    if let Some((name, column_type)) =
        first_candidate(conn, timestamp_query, (database, table)).await
    {
        return (name, column_type, ExtractionMethod::TimestampCursor);
    }

    (
        "_rowid".to_string(),
        "bigint".to_string(),
        ExtractionMethod::RowidCursor,
    )
}

/// Run one candidate lookup; a query error counts as "no candidate" so the
/// selection cascade can continue to the next priority.
async fn first_candidate<P>(conn: &mut Conn, query: &str, params: P) -> Option<(String, String)>
where
    P: Into<mysql_async::Params> + Send,
{
    match conn.exec_first::<(String, String), _, _>(query, params).await {
        Ok(candidate) => candidate,
        Err(e) => {
            debug!("ordering-column lookup failed, trying next priority: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tags_match_output_annotations() {
        assert_eq!(
            ExtractionMethod::AutoIncrementCursor.to_string(),
            "auto_increment_cursor"
        );
        assert_eq!(
            ExtractionMethod::IntegerPkCursor.to_string(),
            "integer_pk_cursor"
        );
        assert_eq!(
            ExtractionMethod::TimestampCursor.to_string(),
            "timestamp_cursor"
        );
        assert_eq!(ExtractionMethod::RowidCursor.to_string(), "rowid_cursor");
    }
}
