//! Dialect detection and MySQL to PostgreSQL conversion
//!
//! Conversion is best-effort: anything the converter does not recognise is
//! passed through unchanged and recorded as a note, so gaps surface when the
//! script is executed rather than here.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use super::splitter::{split_statements_with, LiteralEscapes};
use super::tokens::{
    integer_literal, matching_paren, normalize_mysql_quoting, parse_value_tuples, quote_ident,
    split_top_level, table_name, unquote_ident,
};

static PG_DUMP_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)pg_dump\s+version|SET\s+client_encoding").expect("valid regex")
});

static MYSQL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ENGINE\s*=|AUTO_INCREMENT|CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?`|\bint\s*\(\s*\d+\s*\)")
        .expect("valid regex")
});

static SESSION_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:SET\s+(?:NAMES|FOREIGN_KEY_CHECKS|UNIQUE_CHECKS|SQL_MODE|SQL_NOTES|TIME_ZONE|AUTOCOMMIT|CHARACTER_SET_\w+|COLLATION_\w+|@)|LOCK\s+TABLES|UNLOCK\s+TABLES|USE\s|CREATE\s+(?:DATABASE|SCHEMA)\s|START\s+TRANSACTION|COMMIT$)",
    )
    .expect("valid regex")
});

const IDENT: &str = r#"(?:"[^"]+"|\w+)(?:\.(?:"[^"]+"|\w+))?"#;

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^CREATE\s+(?:TEMPORARY\s+)?TABLE\s+(IF\s+NOT\s+EXISTS\s+)?({IDENT})\s*\("
    ))
    .expect("valid regex")
});

static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)^INSERT\s+(IGNORE\s+)?INTO\s+({IDENT})\s*(?:\(([^)]*)\))?\s*VALUES\s*(.+)$"
    ))
    .expect("valid regex")
});

static ALTER_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)^ALTER\s+TABLE\s+(?:ONLY\s+)?({IDENT})\s+(.+)$"))
        .expect("valid regex")
});

static AUTO_INCREMENT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^((?:tiny|small|medium|big)?int(?:eger)?(?:\s*\(\s*\d+\s*\))?(?:\s+unsigned)?)(.*?)\s*\bAUTO_INCREMENT\b(.*)$",
    )
    .expect("valid regex")
});

static TABLE_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:DEFAULT\s+)?(?:ENGINE|(?:CHARACTER\s+SET|CHARSET)|COLLATE|AUTO_INCREMENT|ROW_FORMAT|COMMENT|PACK_KEYS|CHECKSUM)\s*=?\s*(?:'(?:[^']|'')*'|\w+)",
    )
    .expect("valid regex")
});

static COLUMN_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s+(?:ON\s+UPDATE\s+CURRENT_TIMESTAMP(?:\s*\(\s*\d*\s*\))?|COMMENT\s+'(?:[^']|'')*'|CHARACTER\s+SET\s+\w+|COLLATE\s+\w+|unsigned\b|zerofill\b)",
    )
    .expect("valid regex")
});

static INDEX_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(UNIQUE\s+)?(?:KEY|INDEX)\s+((?:"[^"]+"|\w+)\s*)?(\(.*\))"#)
        .expect("valid regex")
});

static MODIFY_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(?:MODIFY|CHANGE)\s+(?:COLUMN\s+)?("[^"]+"|\w+)\s+(.+)$"#)
        .expect("valid regex")
});

static ADD_INDEX_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^ADD\s+(UNIQUE\s+)?(?:KEY|INDEX)\s+("[^"]+"|\w+)?\s*(\(.*\))"#)
        .expect("valid regex")
});

/// Ordered MySQL type rewrites applied to column definitions.
static TYPE_MAP: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\btinyint\s*\(\s*1\s*\)", "boolean"),
        (r"(?i)\btinyint\b(?:\s*\(\s*\d+\s*\))?", "smallint"),
        (r"(?i)\bsmallint\s*\(\s*\d+\s*\)", "smallint"),
        (r"(?i)\bmediumint\b(?:\s*\(\s*\d+\s*\))?", "integer"),
        (r"(?i)\bbigint\s*\(\s*\d+\s*\)", "bigint"),
        (r"(?i)\bint\s*\(\s*\d+\s*\)", "integer"),
        (r"(?i)\bvarchar\s*\(\s*\d+\s*\)", "varchar"),
        (r"(?i)\b(?:tiny|medium|long)?blob\b", "bytea"),
        (r"(?i)\btext\s*\(\s*\d+\s*\)", "text"),
        (r"(?i)\b(?:tiny|medium|long)text\b", "text"),
        (r"(?i)\bdatetime\b", "timestamp"),
        (r"(?i)\bdouble(?:\s+precision)?\b", "double precision"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
    .collect()
});

/// SQL flavour of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MySql,
    PostgreSql,
    /// No markers found; treated as already PostgreSQL-compatible.
    Generic,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::MySql => write!(f, "mysql"),
            Dialect::PostgreSql => write!(f, "postgresql"),
            Dialect::Generic => write!(f, "generic"),
        }
    }
}

impl Dialect {
    /// How string literals in scripts of this dialect treat backslashes.
    pub fn literal_escapes(self) -> LiteralEscapes {
        match self {
            Dialect::MySql => LiteralEscapes::Backslash,
            Dialect::PostgreSql | Dialect::Generic => LiteralEscapes::Standard,
        }
    }
}

/// Classify a script by the markers it contains.
///
/// PostgreSQL dump markers win over MySQL markers since they name the tool
/// that produced the file.
pub fn detect_dialect(sql: &str) -> Dialect {
    if PG_DUMP_MARKER.is_match(sql) {
        Dialect::PostgreSql
    } else if MYSQL_MARKER.is_match(sql) {
        Dialect::MySql
    } else {
        Dialect::Generic
    }
}

/// Output of converting a whole MySQL script.
#[derive(Debug, Clone, Default)]
pub struct Conversion {
    /// Converted statements, in input order.
    pub statements: Vec<String>,
    /// Sequence statements that must run after every INSERT.
    pub sequence_backfill: Vec<String>,
    /// Fragments that were dropped or passed through unchanged.
    pub notes: Vec<String>,
}

/// Split and convert a MySQL script, including the sequence backfill.
pub fn convert_mysql(sql: &str) -> Conversion {
    let mut converter = MySqlConverter::new();
    let mut statements = Vec::new();
    for statement in split_statements_with(sql, LiteralEscapes::Backslash) {
        statements.extend(converter.convert_statement(&statement));
    }
    Conversion {
        statements,
        sequence_backfill: converter.sequence_backfill(),
        notes: converter.notes,
    }
}

#[derive(Debug, Default, Clone)]
struct TableShape {
    name: String,
    columns: Vec<String>,
    boolean_columns: Vec<String>,
    serial_columns: Vec<String>,
}

#[derive(Debug, Clone)]
struct InsertedRows {
    table: String,
    columns: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

/// Statement-at-a-time MySQL converter.
///
/// Keeps the table shapes and inserted rows it has seen so the sequence
/// backfill can be generated once the whole script has been converted.
#[derive(Debug, Default)]
pub struct MySqlConverter {
    tables: HashMap<String, TableShape>,
    table_order: Vec<String>,
    inserts: Vec<InsertedRows>,
    notes: Vec<String>,
}

impl MySqlConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes collected so far.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Convert one statement. May yield zero statements (session directives)
    /// or several (an `ALTER TABLE ... ADD KEY` becomes a `CREATE INDEX`).
    pub fn convert_statement(&mut self, statement: &str) -> Vec<String> {
        let trimmed = statement.trim();
        if trimmed.starts_with("/*!") && trimmed.ends_with("*/") {
            self.note(format!("dropped MySQL conditional comment: {}", preview(trimmed)));
            return Vec::new();
        }
        if SESSION_DIRECTIVE.is_match(trimmed) {
            self.note(format!("dropped MySQL session directive: {}", preview(trimmed)));
            return Vec::new();
        }

        let sql = normalize_mysql_quoting(trimmed);

        if let Some(converted) = self.convert_create_table(&sql) {
            return vec![converted];
        }
        if let Some(converted) = self.convert_insert(&sql) {
            return vec![converted];
        }
        if let Some(converted) = self.convert_alter_table(&sql) {
            return converted;
        }

        let first_word = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if !matches!(
            first_word.as_str(),
            "DROP" | "CREATE" | "SELECT" | "UPDATE" | "DELETE" | "TRUNCATE" | "WITH"
        ) {
            self.note(format!("passed through unchanged: {}", preview(&sql)));
        }
        vec![map_types(&sql)]
    }

    fn convert_create_table(&mut self, sql: &str) -> Option<String> {
        let caps = CREATE_TABLE.captures(sql)?;
        let if_not_exists = caps.get(1).is_some();
        let name = table_name(&caps[2]);
        let open = caps.get(0)?.end() - 1;
        let close = match matching_paren(sql, open) {
            Some(close) => close,
            None => {
                self.note(format!("unbalanced CREATE TABLE for {name}"));
                return None;
            }
        };

        let mut shape = TableShape {
            name: name.clone(),
            ..Default::default()
        };
        let mut definitions = Vec::new();

        for definition in split_top_level(&sql[open + 1..close], ',') {
            if let Some(converted) = self.convert_table_constraint(&name, &definition) {
                definitions.extend(converted);
                continue;
            }

            let mut parts = definition.splitn(2, char::is_whitespace);
            let column = unquote_ident(parts.next().unwrap_or_default());
            let rest = parts.next().unwrap_or_default().trim();

            let column_type = match AUTO_INCREMENT_COLUMN.captures(rest) {
                Some(auto) => {
                    shape.serial_columns.push(column.clone());
                    format!("SERIAL{}{}", &auto[2], &auto[3])
                }
                None => rest.to_string(),
            };
            let column_type = map_types(&COLUMN_NOISE.replace_all(&column_type, ""));

            if column_type.to_ascii_lowercase().starts_with("boolean") {
                shape.boolean_columns.push(column.clone());
            }
            let column_type = rewrite_boolean_default(&column_type);

            definitions.push(format!("{} {}", quote_ident(&column), column_type.trim()));
            shape.columns.push(column);
        }

        let options = sql[close + 1..].trim();
        let leftover = TABLE_OPTION.replace_all(options, "");
        let leftover = leftover.trim().trim_matches(',').trim();
        if !leftover.is_empty() {
            self.note(format!("kept unrecognised table options on {name}: {leftover}"));
        }

        self.register_table(shape);

        let mut converted = format!(
            "CREATE TABLE {}{} (\n  {}\n)",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(&name),
            definitions.join(",\n  ")
        );
        if !leftover.is_empty() {
            converted.push(' ');
            converted.push_str(leftover);
        }
        Some(converted)
    }

    /// Handle index and constraint lines inside CREATE TABLE. Returns `None`
    /// for ordinary column definitions.
    fn convert_table_constraint(&mut self, table: &str, definition: &str) -> Option<Vec<String>> {
        let first = definition
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match first.as_str() {
            "PRIMARY" | "CONSTRAINT" | "FOREIGN" | "CHECK" => Some(vec![map_types(definition)]),
            "UNIQUE" | "KEY" | "INDEX" => match INDEX_CLAUSE.captures(definition) {
                Some(caps) if caps.get(1).is_some() => Some(vec![format!("UNIQUE {}", &caps[3])]),
                Some(_) => {
                    self.note(format!("dropped inline index on {table}: {definition}"));
                    Some(Vec::new())
                }
                None => Some(vec![definition.to_string()]),
            },
            "FULLTEXT" | "SPATIAL" => {
                self.note(format!("dropped {first} index on {table}"));
                Some(Vec::new())
            }
            _ => None,
        }
    }

    fn convert_insert(&mut self, sql: &str) -> Option<String> {
        let caps = INSERT.captures(sql)?;
        let ignore = caps.get(1).is_some();
        let table = table_name(&caps[2]);
        let explicit_columns: Option<Vec<String>> = caps
            .get(3)
            .map(|m| split_top_level(m.as_str(), ',').iter().map(|c| unquote_ident(c)).collect());

        let (mut rows, rest) = match parse_value_tuples(&caps[4]) {
            Some(parsed) => parsed,
            None => {
                self.note(format!("passed through INSERT into {table}: unparseable VALUES"));
                return None;
            }
        };
        if !rest.is_empty() {
            self.note(format!("passed through INSERT into {table}: trailing clause {}", preview(&rest)));
            return None;
        }

        let shape = self.tables.get(&table.to_ascii_lowercase()).cloned();
        let columns = explicit_columns
            .clone()
            .or_else(|| shape.as_ref().map(|s| s.columns.clone()));

        if let (Some(shape), Some(columns)) = (&shape, &columns) {
            rewrite_boolean_values(shape, columns, &mut rows);
        }

        let column_list = explicit_columns
            .as_ref()
            .map(|cols| {
                let quoted: Vec<String> = cols.iter().map(|c| quote_ident(c)).collect();
                format!(" ({})", quoted.join(", "))
            })
            .unwrap_or_default();
        let values: Vec<String> = rows
            .iter()
            .map(|row| format!("({})", row.join(", ")))
            .collect();

        let mut converted = format!(
            "INSERT INTO {}{} VALUES\n{}",
            quote_ident(&table),
            column_list,
            values.join(",\n")
        );
        if ignore {
            converted.push_str("\nON CONFLICT DO NOTHING");
        }

        self.inserts.push(InsertedRows {
            table,
            columns,
            rows,
        });
        Some(converted)
    }

    fn convert_alter_table(&mut self, sql: &str) -> Option<Vec<String>> {
        let caps = ALTER_TABLE.captures(sql)?;
        let table = table_name(&caps[1]);
        let mut clauses = Vec::new();
        let mut extra = Vec::new();

        for clause in split_top_level(&caps[2], ',') {
            if clause.to_ascii_uppercase().starts_with("AUTO_INCREMENT") {
                continue;
            }
            if let Some(index) = ADD_INDEX_CLAUSE.captures(&clause) {
                let columns = &index[3];
                match (index.get(1).is_some(), index.get(2)) {
                    (true, Some(name)) => clauses.push(format!(
                        "ADD CONSTRAINT {} UNIQUE {}",
                        quote_ident(&unquote_ident(name.as_str())),
                        columns
                    )),
                    (true, None) => clauses.push(format!("ADD UNIQUE {columns}")),
                    (false, name) => {
                        let index_name = name
                            .map(|n| unquote_ident(n.as_str()))
                            .unwrap_or_else(|| format!("{table}_idx_{}", extra.len() + 1));
                        extra.push(format!(
                            "CREATE INDEX {} ON {} {}",
                            quote_ident(&index_name),
                            quote_ident(&table),
                            columns
                        ));
                    }
                }
                continue;
            }
            if let Some(modify) = MODIFY_CLAUSE.captures(&clause) {
                let column = unquote_ident(&modify[1]);
                let definition = modify[2].trim();
                if AUTO_INCREMENT_COLUMN.is_match(definition) {
                    self.mark_serial(&table, &column);
                    continue;
                }
                let definition = map_types(&COLUMN_NOISE.replace_all(definition, ""));
                let column_type = definition
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                clauses.push(format!(
                    "ALTER COLUMN {} TYPE {}",
                    quote_ident(&column),
                    column_type
                ));
                if definition.to_ascii_uppercase().contains("NOT NULL") {
                    clauses.push(format!("ALTER COLUMN {} SET NOT NULL", quote_ident(&column)));
                }
                continue;
            }
            clauses.push(map_types(&clause));
        }

        let mut statements = Vec::new();
        if !clauses.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} {}",
                quote_ident(&table),
                clauses.join(", ")
            ));
        }
        statements.extend(extra);
        Some(statements)
    }

    /// Statements that create a sequence for every auto-increment column and
    /// move it past the largest id already inserted.
    pub fn sequence_backfill(&self) -> Vec<String> {
        let mut statements = Vec::new();
        for key in &self.table_order {
            let Some(shape) = self.tables.get(key) else {
                continue;
            };
            for column in &shape.serial_columns {
                let next = self
                    .max_inserted(shape, column)
                    .map(|max| max.saturating_add(1))
                    .unwrap_or(1);
                let sequence = format!("{}_{}_seq", shape.name, column);
                statements.push(format!(
                    "CREATE SEQUENCE IF NOT EXISTS {}",
                    quote_ident(&sequence)
                ));
                statements.push(format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT nextval('{}')",
                    quote_ident(&shape.name),
                    quote_ident(column),
                    quote_ident(&sequence).replace('\'', "''")
                ));
                statements.push(format!(
                    "SELECT setval('{}', {}, false)",
                    quote_ident(&sequence).replace('\'', "''"),
                    next
                ));
            }
        }
        statements
    }

    fn max_inserted(&self, shape: &TableShape, column: &str) -> Option<i64> {
        self.inserts
            .iter()
            .filter(|insert| insert.table.eq_ignore_ascii_case(&shape.name))
            .filter_map(|insert| {
                let columns = insert.columns.as_ref()?;
                let index = columns.iter().position(|c| c.eq_ignore_ascii_case(column))?;
                insert
                    .rows
                    .iter()
                    .filter_map(|row| row.get(index).and_then(|v| integer_literal(v)))
                    .max()
            })
            .max()
    }

    fn register_table(&mut self, shape: TableShape) {
        let key = shape.name.to_ascii_lowercase();
        if !self.tables.contains_key(&key) {
            self.table_order.push(key.clone());
        }
        self.tables.insert(key, shape);
    }

    fn mark_serial(&mut self, table: &str, column: &str) {
        let key = table.to_ascii_lowercase();
        if !self.tables.contains_key(&key) {
            self.table_order.push(key.clone());
        }
        let shape = self.tables.entry(key).or_insert_with(|| TableShape {
            name: table.to_string(),
            ..Default::default()
        });
        if !shape.serial_columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            shape.serial_columns.push(column.to_string());
        }
    }

    fn note(&mut self, note: String) {
        self.notes.push(note);
    }
}

fn map_types(sql: &str) -> String {
    let mut converted = sql.to_string();
    for (pattern, replacement) in TYPE_MAP.iter() {
        converted = pattern.replace_all(&converted, *replacement).into_owned();
    }
    converted
}

/// `boolean DEFAULT 0` is rejected by PostgreSQL.
fn rewrite_boolean_default(column_type: &str) -> String {
    static BOOL_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)^(boolean\b.*\bDEFAULT\s+)'?([01])'?").expect("valid regex")
    });
    BOOL_DEFAULT
        .replace(column_type, |caps: &regex::Captures| {
            let value = if &caps[2] == "1" { "TRUE" } else { "FALSE" };
            format!("{}{}", &caps[1], value)
        })
        .into_owned()
}

/// Bare `0`/`1` literals are not valid boolean values in PostgreSQL.
fn rewrite_boolean_values(shape: &TableShape, columns: &[String], rows: &mut [Vec<String>]) {
    let positions: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| shape.boolean_columns.iter().any(|b| b.eq_ignore_ascii_case(c)))
        .map(|(i, _)| i)
        .collect();
    for row in rows.iter_mut() {
        for &i in &positions {
            if let Some(value) = row.get_mut(i) {
                match value.trim() {
                    "0" => *value = "FALSE".to_string(),
                    "1" => *value = "TRUE".to_string(),
                    _ => {}
                }
            }
        }
    }
}

fn preview(sql: &str) -> String {
    let single_line = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > 80 {
        let cut: String = single_line.chars().take(77).collect();
        format!("{cut}...")
    } else {
        single_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_detect_dialect() {
        assert_eq!(
            detect_dialect("CREATE TABLE `t` (id int(11)) ENGINE=InnoDB;"),
            Dialect::MySql
        );
        assert_eq!(detect_dialect("id INT AUTO_INCREMENT"), Dialect::MySql);
        assert_eq!(
            detect_dialect("-- Dumped by pg_dump version 15.3\nSET client_encoding = 'UTF8';"),
            Dialect::PostgreSql
        );
        assert_eq!(
            detect_dialect("CREATE TABLE t (id serial primary key);"),
            Dialect::Generic
        );
    }

    #[test]
    fn test_create_table_conversion() {
        let conversion = convert_mysql(
            "CREATE TABLE `u` (id int(11) NOT NULL AUTO_INCREMENT, ok tinyint(1)) ENGINE=InnoDB;",
        );
        assert_eq!(conversion.statements.len(), 1);
        let statement = &conversion.statements[0];
        assert!(statement.contains("\"u\""));
        assert!(statement.contains("SERIAL"));
        assert!(statement.contains("boolean"));
        assert!(!statement.contains("ENGINE"));
        assert!(!statement.contains('`'));
        assert!(!statement.contains("AUTO_INCREMENT"));
    }

    #[test]
    fn test_type_mapping() {
        let conversion = convert_mysql(
            "CREATE TABLE `p` (\n\
             `a` int(10) unsigned NOT NULL,\n\
             `b` varchar(255) DEFAULT NULL,\n\
             `c` tinyint(4),\n\
             `d` blob,\n\
             `e` text(100),\n\
             `f` datetime DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,\n\
             `g` tinyint(1) NOT NULL DEFAULT '0',\n\
             PRIMARY KEY (`a`),\n\
             UNIQUE KEY `b_unique` (`b`),\n\
             KEY `c_idx` (`c`)\n\
             ) ENGINE=InnoDB AUTO_INCREMENT=12 DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;",
        );
        assert_eq!(
            conversion.statements[0],
            "CREATE TABLE \"p\" (\n  \
             \"a\" integer NOT NULL,\n  \
             \"b\" varchar DEFAULT NULL,\n  \
             \"c\" smallint,\n  \
             \"d\" bytea,\n  \
             \"e\" text,\n  \
             \"f\" timestamp DEFAULT CURRENT_TIMESTAMP,\n  \
             \"g\" boolean NOT NULL DEFAULT FALSE,\n  \
             PRIMARY KEY (\"a\"),\n  \
             UNIQUE (\"b\")\n)"
        );
        assert!(conversion.notes.iter().any(|n| n.contains("c_idx")));
    }

    #[test]
    fn test_multi_row_insert_normalized() {
        let conversion = convert_mysql(
            "CREATE TABLE `u` (id int(11) NOT NULL AUTO_INCREMENT, name varchar(20), ok tinyint(1));\n\
             INSERT INTO `u` (`id`, `name`, `ok`) VALUES (1,'O\\'Brien',1),(2,'b;c',0);",
        );
        assert_eq!(
            conversion.statements[1],
            "INSERT INTO \"u\" (\"id\", \"name\", \"ok\") VALUES\n(1, 'O''Brien', TRUE),\n(2, 'b;c', FALSE)"
        );
    }

    #[test]
    fn test_backticks_in_seed_values_are_data() {
        let conversion = convert_mysql(
            "INSERT INTO `t` (`a`, `b`) VALUES ('run `ls` now', 'it\\'s `x`');",
        );
        assert_eq!(
            conversion.statements[0],
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES\n('run `ls` now', 'it''s `x`')"
        );
    }

    #[test]
    fn test_backfill_saturates_at_largest_id() {
        let conversion = convert_mysql(&format!(
            "CREATE TABLE `u` (id bigint(20) NOT NULL AUTO_INCREMENT);\n\
             INSERT INTO `u` (`id`) VALUES ({});",
            i64::MAX
        ));
        assert_eq!(
            conversion.sequence_backfill[2],
            format!("SELECT setval('\"u_id_seq\"', {}, false)", i64::MAX)
        );
    }

    #[test]
    fn test_sequence_backfill_exceeds_max_id() {
        let conversion = convert_mysql(
            "CREATE TABLE `u` (id int(11) NOT NULL AUTO_INCREMENT, name varchar(20));\n\
             INSERT INTO `u` VALUES (3,'a'),(17,'b');\n\
             INSERT INTO `u` (`name`, `id`) VALUES ('c', 9);",
        );
        assert_eq!(
            conversion.sequence_backfill,
            vec![
                "CREATE SEQUENCE IF NOT EXISTS \"u_id_seq\"".to_string(),
                "ALTER TABLE \"u\" ALTER COLUMN \"id\" SET DEFAULT nextval('\"u_id_seq\"')"
                    .to_string(),
                "SELECT setval('\"u_id_seq\"', 18, false)".to_string(),
            ]
        );
    }

    #[test]
    fn test_backfill_for_every_serial_table() {
        let conversion = convert_mysql(
            "CREATE TABLE a (id integer NOT NULL AUTO_INCREMENT);\n\
             CREATE TABLE b (bid int(11) AUTO_INCREMENT, x int(11));\n\
             INSERT INTO a (id) VALUES (5);\n\
             INSERT INTO b (bid, x) VALUES (40, 1), (2, 2);",
        );
        let setvals: Vec<&String> = conversion
            .sequence_backfill
            .iter()
            .filter(|s| s.starts_with("SELECT setval"))
            .collect();
        assert_eq!(setvals.len(), 2);
        assert!(setvals[0].contains(", 6, false"));
        assert!(setvals[1].contains(", 41, false"));
    }

    #[test]
    fn test_alter_modify_auto_increment_and_indexes() {
        let conversion = convert_mysql(
            "CREATE TABLE `t` (`id` int(11) NOT NULL, `x` int(11));\n\
             INSERT INTO `t` (`id`, `x`) VALUES (4, 1);\n\
             ALTER TABLE `t` ADD PRIMARY KEY (`id`), ADD KEY `x_idx` (`x`);\n\
             ALTER TABLE `t` MODIFY `id` int(11) NOT NULL AUTO_INCREMENT, AUTO_INCREMENT=5;",
        );
        assert_eq!(
            conversion.statements[2],
            "ALTER TABLE \"t\" ADD PRIMARY KEY (\"id\")"
        );
        assert_eq!(
            conversion.statements[3],
            "CREATE INDEX \"x_idx\" ON \"t\" (\"x\")"
        );
        assert_eq!(conversion.statements.len(), 4);
        assert!(conversion
            .sequence_backfill
            .contains(&"SELECT setval('\"t_id_seq\"', 5, false)".to_string()));
    }

    #[test]
    fn test_session_directives_dropped() {
        let conversion = convert_mysql(
            "/*!40101 SET NAMES utf8 */;\nSET FOREIGN_KEY_CHECKS=0;\nLOCK TABLES `t` WRITE;\nUNLOCK TABLES;\nDROP TABLE IF EXISTS `t`;",
        );
        assert_eq!(conversion.statements, vec!["DROP TABLE IF EXISTS \"t\""]);
        assert_eq!(conversion.notes.len(), 4);
    }

    #[test]
    fn test_unrecognised_passes_through() {
        let conversion = convert_mysql("REPLACE INTO t VALUES (1);");
        assert_eq!(conversion.statements, vec!["REPLACE INTO t VALUES (1)"]);
        assert_eq!(conversion.notes.len(), 1);
    }

    #[test]
    fn test_insert_ignore() {
        let conversion = convert_mysql("INSERT IGNORE INTO t (a) VALUES (1);");
        assert_eq!(
            conversion.statements[0],
            "INSERT INTO \"t\" (\"a\") VALUES\n(1)\nON CONFLICT DO NOTHING"
        );
    }
}
