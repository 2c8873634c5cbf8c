//! SQL literal rendering
//!
//! Maps raw driver values to the literal text embedded in the generated
//! INSERT statements. Rendering is total: every value the driver can produce
//! maps to some literal, so this layer has no failure mode.

use mysql_async::Value;

/// Escape a string for inclusion in a single-quoted MySQL literal.
///
/// Backslash and quote substitution happen in a single pass so a literal
/// backslash in the data is never re-escaped by the quote substitution.
pub fn escape_string(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\'' => escaped.push_str("\\'"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escape a MySQL identifier (table or column name) with backticks.
pub fn escape_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Render one column value as a SQL literal.
///
/// NULL renders as the bare keyword; byte and text values are single-quoted
/// and escaped; temporal values are rendered at seconds precision without a
/// timezone suffix (the output header forces a UTC session time zone); every
/// other scalar is single-quoted in its plain textual form.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::NULL => "NULL".to_string(),
        Value::Bytes(bytes) => {
            format!("'{}'", escape_string(&String::from_utf8_lossy(bytes)))
        }
        Value::Int(i) => format!("'{i}'"),
        Value::UInt(u) => format!("'{u}'"),
        Value::Float(f) => format!("'{f}'"),
        Value::Double(d) => format!("'{d}'"),
        Value::Date(year, month, day, hour, minute, second, _micro) => {
            format!("'{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}'")
        }
        Value::Time(negative, days, hours, minutes, seconds, _micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = *days * 24 + u32::from(*hours);
            format!("'{sign}{total_hours}:{minutes:02}:{seconds:02}'")
        }
    }
}
