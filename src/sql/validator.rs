//! SQL safety validator
//!
//! Two stateless policies over a single statement:
//! - the deny-list, applied to everything that reaches a sandbox
//! - the read-only allow-list, applied to the ad-hoc query path only

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Statement kinds accepted by the read-only policy.
pub const READ_ONLY_KEYWORDS: [&str; 4] = ["SELECT", "WITH", "EXPLAIN", "SHOW"];

/// Outcome of validating one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        ValidationResult {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Which policy a statement is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationPolicy {
    /// Deny-list only (content import, exercise solutions)
    DenyList,
    /// Allow-list of read-only statements plus the deny-list
    ReadOnly,
}

struct DenyRule {
    regex: Regex,
    reason: &'static str,
}

static DENY_RULES: LazyLock<Vec<DenyRule>> = LazyLock::new(|| {
    [
        (
            r"(?is)^DROP\s+(?:DATABASE|SCHEMA|USER|ROLE|OWNED)\b",
            "Dropping databases, schemas, users, or roles is not allowed",
        ),
        (
            r"(?is)^(?:CREATE|ALTER)\s+(?:ROLE|USER)\b",
            "Creating or altering roles and users is not allowed",
        ),
        (r"(?is)\bGRANT\s+ALL\b", "GRANT ALL is not allowed"),
        (r"(?is)^ALTER\s+SYSTEM\b", "ALTER SYSTEM is not allowed"),
        (
            r"(?is)^COPY\b.*\bPROGRAM\b",
            "COPY ... PROGRAM is not allowed",
        ),
        (
            r"(?is)^COPY\b.*\b(?:FROM|TO)\s+'",
            "COPY to or from server files is not allowed",
        ),
        (
            r"(?i)\b(?:pg_read_file|pg_read_binary_file|pg_ls_dir|pg_stat_file|lo_import|lo_export)\s*\(",
            "File system access functions are not allowed",
        ),
        (
            r"(?is)^(?:UPDATE|DELETE|DROP|TRUNCATE)\b.*\bWHERE\s+(?:1\s*=\s*1|TRUE)\b",
            "Mass UPDATE/DELETE/DROP/TRUNCATE with an always-true condition is not allowed",
        ),
    ]
    .into_iter()
    .map(|(pattern, reason)| DenyRule {
        regex: Regex::new(pattern).expect("valid regex"),
        reason,
    })
    .collect()
});

static DATA_MODIFYING_CTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bAS\s*(?:NOT\s+)?(?:MATERIALIZED\s*)?\(\s*(?:INSERT|UPDATE|DELETE|MERGE)\b")
        .expect("valid regex")
});

static EXPLAIN_ANALYZE_WRITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^EXPLAIN\b.*\bANALY[SZ]E\b.*\b(?:INSERT|UPDATE|DELETE|MERGE)\b")
        .expect("valid regex")
});

/// Check one statement against the deny-list.
pub fn validate_sql_safety(statement: &str) -> ValidationResult {
    let body = strip_leading_comments(statement);
    for rule in DENY_RULES.iter() {
        if rule.regex.is_match(body) {
            return ValidationResult::rejected(rule.reason);
        }
    }
    ValidationResult::ok()
}

/// Check one statement against the read-only allow-list, then the deny-list.
pub fn validate_read_only(statement: &str) -> ValidationResult {
    let body = strip_leading_comments(statement);
    let keyword = first_keyword(body);
    if keyword.is_empty() {
        return ValidationResult::rejected("Query is empty");
    }
    if !READ_ONLY_KEYWORDS.contains(&keyword.as_str()) {
        return ValidationResult::rejected(format!(
            "{keyword} statements are not allowed here; only {} queries can be run",
            READ_ONLY_KEYWORDS.join(", ")
        ));
    }
    if keyword == "WITH" && DATA_MODIFYING_CTE.is_match(body) {
        return ValidationResult::rejected("Data-modifying WITH clauses are not allowed here");
    }
    if keyword == "EXPLAIN" && EXPLAIN_ANALYZE_WRITE.is_match(body) {
        return ValidationResult::rejected("EXPLAIN ANALYZE of a write statement is not allowed here");
    }
    validate_sql_safety(body)
}

/// Validate a statement under the given policy.
pub fn validate_statement(statement: &str, policy: ValidationPolicy) -> ValidationResult {
    match policy {
        ValidationPolicy::DenyList => validate_sql_safety(statement),
        ValidationPolicy::ReadOnly => validate_read_only(statement),
    }
}

/// Leading keyword of a statement, upper-cased, ignoring opening parentheses.
pub fn first_keyword(statement: &str) -> String {
    strip_leading_comments(statement)
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

fn strip_leading_comments(statement: &str) -> &str {
    let mut rest = statement.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else {
            return rest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_list_rejects_drop_database() {
        let result = validate_sql_safety("DROP DATABASE foo");
        assert!(!result.valid);
        assert!(result.reason.is_some());
    }

    #[test]
    fn test_deny_list_rules() {
        for statement in [
            "drop schema public cascade",
            "DROP USER bob",
            "CREATE ROLE admin",
            "ALTER USER postgres WITH PASSWORD 'x'",
            "GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO bob",
            "COPY t FROM PROGRAM 'cat /etc/passwd'",
            "COPY t TO '/tmp/out.csv'",
            "SELECT pg_read_file('/etc/passwd')",
            "UPDATE t SET x = 1 WHERE 1=1",
            "DELETE FROM t WHERE TRUE",
            "-- sneaky\nDROP DATABASE prod",
        ] {
            assert!(!validate_sql_safety(statement).valid, "{statement}");
        }
    }

    #[test]
    fn test_deny_list_allows_ordinary_content() {
        for statement in [
            "CREATE TABLE t (id serial primary key)",
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET x = 1 WHERE id = 3",
            "DROP TABLE IF EXISTS t",
            "COPY t (id) FROM stdin;\n1\n\\.",
            "SELECT 'DROP DATABASE' AS text",
        ] {
            assert!(validate_sql_safety(statement).valid, "{statement}");
        }
    }

    #[test]
    fn test_read_only_allow_list() {
        assert!(validate_read_only("SELECT 1").valid);
        assert!(validate_read_only("  with x as (select 1) select * from x").valid);
        assert!(validate_read_only("EXPLAIN SELECT * FROM t").valid);
        assert!(validate_read_only("SHOW search_path").valid);
        assert!(validate_read_only("(SELECT 1) UNION (SELECT 2)").valid);

        let update = validate_read_only("UPDATE t SET x=1");
        let delete = validate_read_only("DELETE FROM t");
        assert!(!update.valid);
        assert!(!delete.valid);
        let update_reason = update.reason.unwrap();
        let delete_reason = delete.reason.unwrap();
        assert_ne!(update_reason, delete_reason);
        assert!(update_reason.contains("UPDATE"));
        assert!(delete_reason.contains("DELETE"));
        assert!(update_reason.contains("SELECT, WITH, EXPLAIN, SHOW"));
    }

    #[test]
    fn test_read_only_rejects_hidden_writes() {
        assert!(!validate_read_only("WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d").valid);
        assert!(!validate_read_only("EXPLAIN ANALYZE DELETE FROM t").valid);
        assert!(!validate_read_only("").valid);
        assert!(!validate_read_only("SELECT lo_import('/etc/passwd')").valid);
    }

    #[test]
    fn test_first_keyword() {
        assert_eq!(first_keyword("  select * from t"), "SELECT");
        assert_eq!(first_keyword("/* hi */ (WITH x AS (SELECT 1) SELECT 1)"), "WITH");
        assert_eq!(first_keyword(""), "");
    }
}
