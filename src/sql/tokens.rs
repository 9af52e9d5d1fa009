//! Small quote-aware scanning helpers shared by the converter and COPY rewrite.

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Strip one layer of `"` or `` ` `` quoting from an identifier.
pub fn unquote_ident(raw: &str) -> String {
    let raw = raw.trim();
    for quote in ['"', '`'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            let doubled = format!("{quote}{quote}");
            return raw[1..raw.len() - 1].replace(&doubled, &quote.to_string());
        }
    }
    raw.to_string()
}

/// Last segment of a possibly schema-qualified name, unquoted.
///
/// `"db"."users"` and `users` both yield `users`.
pub fn table_name(raw: &str) -> String {
    let parts = split_top_level(raw, '.');
    parts
        .last()
        .map(|p| unquote_ident(p))
        .unwrap_or_default()
}

/// Split on `delimiter` where it appears outside quotes and parentheses.
pub fn split_top_level(text: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            c if c == delimiter && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Byte offset of the `)` matching the `(` at `open`, ignoring quoted text.
pub fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse `(a, b), (c, d)` into rows of raw value expressions.
///
/// Returns the rows and whatever text follows the last tuple, or `None` when
/// the text does not start with a tuple or a tuple is unterminated.
pub fn parse_value_tuples(text: &str) -> Option<(Vec<Vec<String>>, String)> {
    let mut rows = Vec::new();
    let mut rest = text.trim_start();

    loop {
        if !rest.starts_with('(') {
            break;
        }
        let close = matching_paren(rest, 0)?;
        rows.push(split_top_level(&rest[1..close], ','));
        rest = rest[close + 1..].trim_start();
        match rest.strip_prefix(',') {
            Some(after) => rest = after.trim_start(),
            None => break,
        }
    }

    if rows.is_empty() {
        None
    } else {
        Some((rows, rest.trim().to_string()))
    }
}

/// Rewrite MySQL quoting into standard SQL.
///
/// Backtick identifiers become double-quoted. Inside string literals `\'`
/// becomes `''`, `\\` becomes `\`, and `\n`/`\t`/`\r` become the literal
/// characters; backticks there are data and stay as they are.
pub fn normalize_mysql_quoting(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_string = false;
    let mut in_ident = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if in_ident {
            if c == '`' {
                in_ident = false;
                out.push('"');
            } else {
                out.push(c);
            }
            continue;
        }
        if !in_string {
            match c {
                '`' => {
                    in_ident = true;
                    out.push('"');
                }
                '\'' => {
                    in_string = true;
                    out.push(c);
                }
                _ => out.push(c),
            }
            continue;
        }
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push_str("''"),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => {}
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '\'' => {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push_str("''");
                } else {
                    in_string = false;
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Parse a raw value expression as an integer literal (`42`, `'42'`, `-1`).
pub fn integer_literal(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed);
    unquoted.trim().parse().ok()
}
