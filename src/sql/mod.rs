//! SQL processing - splitting, dialect conversion, and safety validation
//!
//! Instructor-authored schema and seed scripts pass through
//! [`prepare_content`] before they are ever executed in a sandbox:
//! detect dialect → split → convert MySQL → rewrite COPY blocks → deny-list.

mod copy;
mod dialect;
mod splitter;
mod tokens;
mod validator;

pub use copy::copy_to_inserts;
pub use dialect::{convert_mysql, detect_dialect, Conversion, Dialect, MySqlConverter};
pub use splitter::{
    is_copy_from_stdin, split_statements, split_statements_with, LiteralEscapes,
};
pub use validator::{
    first_keyword, validate_read_only, validate_sql_safety, validate_statement,
    ValidationPolicy, ValidationResult, READ_ONLY_KEYWORDS,
};

use tracing::debug;

use crate::sandbox::{SandboxError, SandboxResult};

/// Schema and seed scripts ready to be loaded into a sandbox.
#[derive(Debug, Clone)]
pub struct PreparedContent {
    /// Dialect detected on the combined script
    pub dialect: Dialect,
    /// Converted DDL, executed first
    pub schema: String,
    /// Converted DML followed by the sequence backfill
    pub seed: String,
    /// Conversion notes (dropped or passed-through fragments)
    pub notes: Vec<String>,
}

impl PreparedContent {
    /// Number of statements across schema and seed.
    pub fn statement_count(&self) -> usize {
        split_statements(&self.schema).len() + split_statements(&self.seed).len()
    }
}

/// Convert and validate a schema/seed pair.
///
/// Fails with [`SandboxError::SqlValidation`] if any resulting statement hits
/// the deny-list; nothing is executed in that case.
pub fn prepare_content(schema: &str, seed: &str) -> SandboxResult<PreparedContent> {
    let dialect = detect_dialect(&format!("{schema}\n{seed}"));
    let escapes = dialect.literal_escapes();
    let mut schema_statements = split_statements_with(schema, escapes);
    let mut seed_statements = split_statements_with(seed, escapes);
    let mut notes = Vec::new();

    if dialect == Dialect::MySql {
        let mut converter = MySqlConverter::new();
        schema_statements = schema_statements
            .iter()
            .flat_map(|s| converter.convert_statement(s))
            .collect();
        seed_statements = seed_statements
            .iter()
            .flat_map(|s| converter.convert_statement(s))
            .collect();
        seed_statements.extend(converter.sequence_backfill());
        notes.extend(converter.notes().iter().cloned());
    }

    let schema_statements = expand_copy_blocks(schema_statements);
    let seed_statements = expand_copy_blocks(seed_statements);

    for statement in schema_statements.iter().chain(seed_statements.iter()) {
        let result = validate_sql_safety(statement);
        if !result.valid {
            let reason = result.reason.unwrap_or_else(|| "rejected".to_string());
            return Err(SandboxError::SqlValidation {
                reason: format!("{reason}: {}", first_line(statement)),
            });
        }
    }

    for note in &notes {
        debug!("Conversion note: {}", note);
    }
    debug!(
        "Prepared {} content: {} schema and {} seed statements",
        dialect,
        schema_statements.len(),
        seed_statements.len()
    );

    Ok(PreparedContent {
        dialect,
        schema: join_statements(&schema_statements),
        seed: join_statements(&seed_statements),
        notes,
    })
}

/// Validate every statement of a script under `policy`.
pub fn validate_script(sql: &str, policy: ValidationPolicy) -> SandboxResult<Vec<String>> {
    let statements = split_statements(sql);
    if statements.is_empty() {
        return Err(SandboxError::SqlValidation {
            reason: "Query is empty".to_string(),
        });
    }
    for statement in &statements {
        let result = validate_statement(statement, policy);
        if !result.valid {
            return Err(SandboxError::SqlValidation {
                reason: result.reason.unwrap_or_else(|| "rejected".to_string()),
            });
        }
    }
    Ok(statements)
}

fn expand_copy_blocks(statements: Vec<String>) -> Vec<String> {
    statements
        .into_iter()
        .flat_map(|statement| {
            if is_copy_from_stdin(&statement) {
                copy_to_inserts(&statement).unwrap_or_else(|| vec![statement])
            } else {
                vec![statement]
            }
        })
        .collect()
}

fn join_statements(statements: &[String]) -> String {
    if statements.is_empty() {
        String::new()
    } else {
        format!("{};", statements.join(";\n"))
    }
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}
