//! Data-extraction strategies
//!
//! Four interchangeable algorithms produce the complete INSERT script for one
//! table plus the exported row count. Small tables always use the full scan;
//! large tables dispatch on the analyzer's chosen method. Value rendering is
//! delegated to [`crate::value`] in every variant.

use crate::analyzer::{ExtractionMethod, TableInfo};
use crate::value::{escape_identifier, sql_literal};
use anyhow::{Context, Result};
use mysql_async::{prelude::*, Conn, Row, Value};
use tracing::debug;

/// Accumulates rendered value tuples and emits multi-row INSERT statements of
/// at most `multi_insert` tuples each.
pub struct InsertWriter {
    insert_prefix: String,
    multi_insert: usize,
    groups: Vec<String>,
    statements: Vec<String>,
    rows: u64,
}

impl InsertWriter {
    pub fn new(table: &str, columns: &[String], multi_insert: usize) -> Self {
        Self {
            insert_prefix: format!(
                "INSERT INTO {} ({}) VALUES ",
                escape_identifier(table),
                column_list(columns)
            ),
            multi_insert,
            groups: Vec::new(),
            statements: Vec::new(),
            rows: 0,
        }
    }

    /// Queue one row's rendered literals, emitting a statement when the
    /// current group reaches the configured size.
    pub fn push_row(&mut self, literals: &[String]) {
        self.groups.push(format!("({})", literals.join(", ")));
        self.rows += 1;
        if self.groups.len() >= self.multi_insert {
            self.flush();
        }
    }

    /// Emit the pending partial group as a statement. Called at page
    /// boundaries and at end of stream.
    pub fn flush(&mut self) {
        if self.groups.is_empty() {
            return;
        }
        self.statements.push(format!(
            "{}{};",
            self.insert_prefix,
            self.groups.join(", ")
        ));
        self.groups.clear();
    }

    /// Flush the final partial group and return all statements with the
    /// total row count.
    pub fn finish(mut self) -> (Vec<String>, u64) {
        self.flush();
        (self.statements, self.rows)
    }
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| escape_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a standalone single-row INSERT statement.
pub fn render_row_insert(table: &str, columns: &[String], literals: &[String]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        escape_identifier(table),
        column_list(columns),
        literals.join(", ")
    )
}

fn column_names(row: &Row) -> Vec<String> {
    row.columns_ref()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect()
}

fn row_literals(values: &[Value]) -> Vec<String> {
    values.iter().map(sql_literal).collect()
}

/// Single unrestricted scan emitting one INSERT per row.
///
/// Used for small tables, where batching overhead outweighs its benefit.
pub async fn full_scan(conn: &mut Conn, table: &str) -> Result<(String, u64)> {
    let query = format!("SELECT * FROM {}", escape_identifier(table));
    let rows: Vec<Row> = conn.query(query).await?;

    let Some(first) = rows.first() else {
        return Ok((String::new(), 0));
    };
    let columns = column_names(first);

    let mut statements = Vec::with_capacity(rows.len());
    for row in rows {
        let values = row.unwrap();
        statements.push(render_row_insert(table, &columns, &row_literals(&values)));
    }
    let count = statements.len() as u64;
    Ok((statements.join("\n"), count))
}

/// Keyset-paginated scan ordered by `order_column`.
///
/// Each page's filter excludes everything at or below the previous page's
/// last ordering value (the watermark). A page shorter than `batch_size`, or
/// an empty page, terminates the loop. Rows are grouped into multi-row
/// INSERTs of at most `multi_insert` tuples, flushed at page boundaries.
///
/// Correctness precondition: the ordering column must be unique and
/// monotonic under the server collation. Duplicate values spanning a page
/// boundary silently under-export; this is a documented limitation, not
/// guarded against.
pub async fn cursor_paged(
    conn: &mut Conn,
    table: &str,
    order_column: &str,
    batch_size: usize,
    multi_insert: usize,
) -> Result<(String, u64)> {
    let table_ident = escape_identifier(table);
    let order_ident = escape_identifier(order_column);
    let first_page =
        format!("SELECT * FROM {table_ident} ORDER BY {order_ident} LIMIT {batch_size}");
    let next_page = format!(
        "SELECT * FROM {table_ident} WHERE {order_ident} > ? \
         ORDER BY {order_ident} LIMIT {batch_size}"
    );

    let mut rows: Vec<Row> = conn.query(&first_page).await?;
    let Some(first) = rows.first() else {
        return Ok((String::new(), 0));
    };
    let columns = column_names(first);
    let order_index = columns
        .iter()
        .position(|c| c == order_column)
        .with_context(|| {
            format!("ordering column `{order_column}` missing from result set of `{table}`")
        })?;
    let mut writer = InsertWriter::new(table, &columns, multi_insert);

    loop {
        let page_len = rows.len();
        let mut watermark = Value::NULL;
        for row in rows {
            let values = row.unwrap();
            watermark = values[order_index].clone();
            writer.push_row(&row_literals(&values));
        }
        writer.flush();

        if page_len < batch_size {
            break;
        }
        rows = conn.exec(&next_page, (watermark,)).await?;
        if rows.is_empty() {
            break;
        }
    }

    let (statements, count) = writer.finish();
    Ok((statements.join("\n"), count))
}

/// Keyset pagination over the hidden `_rowid` pseudo-column.
///
/// Probes whether the server exposes `_rowid` for this table and falls back
/// to the streaming scan when it does not.
pub async fn rowid_paged(
    conn: &mut Conn,
    table: &str,
    batch_size: usize,
    multi_insert: usize,
) -> Result<(String, u64)> {
    let probe = format!("SELECT _rowid FROM {} LIMIT 1", escape_identifier(table));
    if let Err(e) = conn.query_drop(&probe).await {
        debug!("`_rowid` not available for `{table}`, using streaming scan: {e}");
        return streaming_scan(conn, table, multi_insert).await;
    }
    cursor_paged(conn, table, "_rowid", batch_size, multi_insert).await
}

/// Streaming scan of last resort: a single unrestricted query whose rows are
/// read incrementally off the wire and grouped into multi-row INSERT
/// statements, with the final partial group flushed at end of stream. Client
/// memory is bounded by the driver's incremental row delivery, not by
/// server-side paging.
pub async fn streaming_scan(
    conn: &mut Conn,
    table: &str,
    multi_insert: usize,
) -> Result<(String, u64)> {
    let query = format!("SELECT * FROM {}", escape_identifier(table));
    let mut result = conn.query_iter(query).await?;

    let mut writer: Option<InsertWriter> = None;
    while let Some(row) = result.next().await? {
        let writer = writer
            .get_or_insert_with(|| InsertWriter::new(table, &column_names(&row), multi_insert));
        let values = row.unwrap();
        writer.push_row(&row_literals(&values));
    }

    match writer {
        Some(writer) => {
            let (statements, count) = writer.finish();
            Ok((statements.join("\n"), count))
        }
        None => Ok((String::new(), 0)),
    }
}

/// Select and run the extraction strategy for one analyzed table. Small
/// tables always take the full scan regardless of the analyzer's method tag.
pub async fn export_table_data(
    conn: &mut Conn,
    info: &TableInfo,
    batch_size: usize,
    multi_insert: usize,
) -> Result<(String, u64)> {
    if !info.is_large {
        return full_scan(conn, &info.name).await;
    }

    match info.method {
        ExtractionMethod::AutoIncrementCursor
        | ExtractionMethod::IntegerPkCursor
        | ExtractionMethod::TimestampCursor => {
            cursor_paged(conn, &info.name, &info.order_column, batch_size, multi_insert).await
        }
        ExtractionMethod::RowidCursor => {
            rowid_paged(conn, &info.name, batch_size, multi_insert).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_n(writer: &mut InsertWriter, n: usize) {
        for i in 0..n {
            writer.push_row(&[format!("'{i}'")]);
        }
    }

    /// Number of value groups in one rendered statement. The column list
    /// contributes exactly one extra parenthesis pair.
    fn group_count(statement: &str) -> usize {
        statement.matches('(').count() - 1
    }

    #[test]
    fn streamed_rows_group_into_ceil_statements() {
        let mut writer = InsertWriter::new("t", &["id".to_string()], 500);
        push_n(&mut writer, 1200);
        let (statements, rows) = writer.finish();

        assert_eq!(rows, 1200);
        assert_eq!(statements.len(), 3);
        assert_eq!(group_count(&statements[0]), 500);
        assert_eq!(group_count(&statements[1]), 500);
        assert_eq!(group_count(&statements[2]), 200);
    }

    #[test]
    fn exact_multiple_produces_full_statements_only() {
        let mut writer = InsertWriter::new("t", &["id".to_string()], 500);
        push_n(&mut writer, 1000);
        let (statements, rows) = writer.finish();

        assert_eq!(rows, 1000);
        assert_eq!(statements.len(), 2);
        assert!(statements.iter().all(|s| group_count(s) == 500));
    }

    #[test]
    fn grouped_statement_count_is_ceil_of_rows_over_size() {
        for (rows, size) in [(1usize, 10usize), (9, 10), (10, 10), (11, 10), (25, 10)] {
            let mut writer = InsertWriter::new("t", &["id".to_string()], size);
            push_n(&mut writer, rows);
            let (statements, total) = writer.finish();
            assert_eq!(total as usize, rows);
            assert_eq!(statements.len(), rows.div_ceil(size));
        }
    }

    #[test]
    fn page_boundary_flush_emits_partial_statement() {
        let mut writer = InsertWriter::new("t", &["id".to_string()], 4);
        push_n(&mut writer, 10);
        writer.flush();
        push_n(&mut writer, 5);
        let (statements, rows) = writer.finish();

        assert_eq!(rows, 15);
        // Page one: 4 + 4 + 2; page two: 4 + 1.
        let groups: Vec<usize> = statements.iter().map(|s| group_count(s)).collect();
        assert_eq!(groups, vec![4, 4, 2, 4, 1]);
    }

    #[test]
    fn empty_writer_emits_nothing() {
        let writer = InsertWriter::new("t", &["id".to_string()], 100);
        let (statements, rows) = writer.finish();
        assert!(statements.is_empty());
        assert_eq!(rows, 0);
    }

    #[test]
    fn single_row_insert_renders_exact_statement() {
        let statement = render_row_insert(
            "users",
            &["id".to_string(), "name".to_string()],
            &["'1'".to_string(), "'bob'".to_string()],
        );
        assert_eq!(
            statement,
            "INSERT INTO `users` (`id`, `name`) VALUES ('1', 'bob');"
        );
    }

    #[test]
    fn statements_are_semicolon_terminated() {
        let mut writer = InsertWriter::new("t", &["id".to_string()], 2);
        push_n(&mut writer, 3);
        let (statements, _) = writer.finish();
        assert!(statements.iter().all(|s| s.ends_with(';')));
        assert!(statements[0].starts_with("INSERT INTO `t` (`id`) VALUES "));
    }
}
