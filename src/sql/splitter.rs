//! Statement splitter
//!
//! Turns a SQL script into individually executable statements with a single
//! left-to-right scan. A `;` only terminates a statement when the scanner is
//! outside a string literal, a `--` line comment, and a `COPY ... FROM stdin`
//! data block.

/// How a backslash inside a string literal is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LiteralEscapes {
    /// PostgreSQL standard strings: a backslash is data, except in `E'...'`.
    #[default]
    Standard,
    /// MySQL: a backslash escapes the next character in every literal.
    Backslash,
}

/// Split a PostgreSQL script into trimmed, non-empty statements.
///
/// Line comments are dropped. A `COPY ... FROM stdin` statement keeps its data
/// lines and ends with the `\.` terminator line.
pub fn split_statements(sql: &str) -> Vec<String> {
    split_statements_with(sql, LiteralEscapes::Standard)
}

/// Split a script whose string literals follow `escapes`.
pub fn split_statements_with(sql: &str, escapes: LiteralEscapes) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut string_escapes = false;
    let mut in_line_comment = false;
    let mut in_copy = false;
    let mut line_start = 0;

    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if in_copy {
            if c == '\n' {
                if current[line_start..].trim_end_matches('\r') == "\\." {
                    push_statement(&mut statements, &current);
                    current.clear();
                    in_copy = false;
                    line_start = 0;
                    continue;
                }
                current.push(c);
                line_start = current.len();
            } else {
                current.push(c);
            }
            continue;
        }

        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                current.push(c);
            }
            continue;
        }

        if in_string {
            current.push(c);
            match c {
                '\\' if string_escapes => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '\'' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '\'' => {
                in_string = true;
                string_escapes =
                    escapes == LiteralEscapes::Backslash || ends_with_escape_prefix(&current);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                in_line_comment = true;
            }
            ';' => {
                if is_copy_from_stdin(&current) {
                    current.push(c);
                    in_copy = true;
                    // Data starts on the line after the COPY header.
                    if chars.peek() == Some(&'\r') {
                        chars.next();
                    }
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    current.push('\n');
                    line_start = current.len();
                } else {
                    push_statement(&mut statements, &current);
                    current.clear();
                }
            }
            _ => current.push(c),
        }
    }

    push_statement(&mut statements, &current);
    statements
}

/// Whether a statement buffer is the header of a `COPY ... FROM stdin` block.
pub fn is_copy_from_stdin(statement: &str) -> bool {
    let upper = statement.trim_start().to_ascii_uppercase();
    upper.starts_with("COPY") && upper.contains("FROM STDIN")
}

/// Whether the buffer ends in the `E` of an `E'...'` escape string.
fn ends_with_escape_prefix(buffer: &str) -> bool {
    let mut rev = buffer.chars().rev();
    matches!(rev.next(), Some('E' | 'e'))
        && !rev
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '"')
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
