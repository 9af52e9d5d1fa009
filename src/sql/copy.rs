//! Rewrite `COPY ... FROM stdin` blocks into INSERT statements.
//!
//! Sandbox content is loaded over the simple-query protocol, which cannot feed
//! COPY data, so pg_dump output is turned into plain INSERTs first.

use regex::Regex;
use std::sync::LazyLock;

static COPY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^COPY\s+((?:"[^"]+"|\w+)(?:\.(?:"[^"]+"|\w+))?)\s*(\([^)]*\))?\s+FROM\s+stdin\b[^;\n]*;?"#,
    )
    .expect("valid regex")
});

/// Rows per generated INSERT.
const ROWS_PER_INSERT: usize = 500;

/// Convert a split `COPY ... FROM stdin` statement (header, data lines, `\.`)
/// into INSERT statements. Returns `None` when the statement is not a COPY
/// data block; an empty block yields no statements.
pub fn copy_to_inserts(statement: &str) -> Option<Vec<String>> {
    let caps = COPY_HEADER.captures(statement)?;
    let table = &caps[1];
    let columns = caps.get(2).map(|m| format!(" {}", m.as_str())).unwrap_or_default();
    let data = &statement[caps.get(0)?.end()..];

    let rows: Vec<String> = data
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .take_while(|line| *line != "\\.")
        .filter(|line| !line.is_empty())
        .map(|line| {
            let values: Vec<String> = line.split('\t').map(copy_field_to_literal).collect();
            format!("({})", values.join(", "))
        })
        .collect();

    Some(
        rows.chunks(ROWS_PER_INSERT)
            .map(|chunk| format!("INSERT INTO {table}{columns} VALUES\n{}", chunk.join(",\n")))
            .collect(),
    )
}

/// Turn one COPY text-format field into a SQL literal.
fn copy_field_to_literal(field: &str) -> String {
    if field == "\\N" {
        return "NULL".to_string();
    }

    let mut value = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => value.push('\t'),
            Some('n') => value.push('\n'),
            Some('r') => value.push('\r'),
            Some('b') => value.push('\u{8}'),
            Some('f') => value.push('\u{c}'),
            Some('v') => value.push('\u{b}'),
            Some(other) => value.push(other),
            None => value.push('\\'),
        }
    }
    format!("'{}'", value.replace('\'', "''"))
}
