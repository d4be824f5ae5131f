//! SQL safety utilities for generated validation queries.
//!
//! Every identifier that ends up inside generated SQL passes through
//! [`SqlSecurity::validate_identifier`] when definitions are loaded, and is
//! always emitted double-quoted by [`quote_identifier`]. Free-form row
//! conditions are screened by [`SqlSecurity::validate_sql_expression`].

use crate::error::{Result, TvalError};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum identifier length accepted in table and column names.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Maximum length of a row condition expression.
pub const MAX_EXPRESSION_LENGTH: usize = 5000;

/// SQL identifier and expression validation.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a SQL identifier (table name, column name).
    ///
    /// # Examples
    /// ```rust
    /// use tval_guard::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("user_id").unwrap(), "\"user_id\"");
    /// assert!(SqlSecurity::escape_identifier("id; DROP TABLE users--").is_err());
    /// ```
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;
        Ok(quote_identifier(identifier))
    }

    /// Validates a SQL identifier without escaping it.
    ///
    /// Keywords such as `order` or `end` are accepted; generated SQL always
    /// quotes identifiers.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(TvalError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(TvalError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
                .expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(TvalError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, and underscores"
            )));
        }

        Ok(())
    }

    /// Validates a row condition expression such as `end_date >= start_date`.
    ///
    /// The expression is embedded as `NOT (<expr>)` inside a generated count
    /// query, so statement separators, comments and subqueries are rejected.
    pub fn validate_sql_expression(expression: &str) -> Result<()> {
        if expression.trim().is_empty() {
            return Err(TvalError::SecurityError(
                "SQL expression cannot be empty".to_string(),
            ));
        }

        if expression.len() > MAX_EXPRESSION_LENGTH {
            return Err(TvalError::SecurityError(format!(
                "SQL expression too long (max {MAX_EXPRESSION_LENGTH} characters)"
            )));
        }

        if expression.contains('\0') {
            return Err(TvalError::SecurityError(
                "SQL expression cannot contain null bytes".to_string(),
            ));
        }

        for token in [";", "--", "/*", "*/"] {
            if expression.contains(token) {
                return Err(TvalError::SecurityError(format!(
                    "SQL expression contains forbidden token: '{token}'"
                )));
            }
        }

        Self::check_dangerous_sql_patterns(expression)?;
        Self::check_balanced_parentheses(expression)
    }

    /// Validates a chrono-style date/time parse pattern (`%Y-%m-%d`).
    pub fn validate_format_pattern(pattern: &str) -> Result<()> {
        static FORMAT_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[%A-Za-z0-9\-/.: ]+$").expect("Hard-coded regex pattern should be valid")
        });

        if !FORMAT_REGEX.is_match(pattern) {
            return Err(TvalError::SecurityError(format!(
                "Invalid format pattern: '{pattern}'"
            )));
        }
        Ok(())
    }

    fn check_dangerous_sql_patterns(expression: &str) -> Result<()> {
        static KEYWORD_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(
                r"(?i)\b(select|insert|update|delete|merge|drop|create|alter|truncate|copy|attach|detach|exec|execute|declare|grant|revoke|commit|rollback|pragma|information_schema)\b",
            )
            .expect("Hard-coded regex pattern should be valid")
        });

        if let Some(found) = KEYWORD_REGEX.find(expression) {
            return Err(TvalError::SecurityError(format!(
                "SQL expression contains dangerous keyword: '{}'",
                found.as_str().to_lowercase()
            )));
        }
        Ok(())
    }

    fn check_balanced_parentheses(expression: &str) -> Result<()> {
        let mut depth: i64 = 0;
        let mut in_string = false;
        for ch in expression.chars() {
            match ch {
                '\'' => in_string = !in_string,
                '(' if !in_string => depth += 1,
                ')' if !in_string => {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        if depth != 0 || in_string {
            return Err(TvalError::SecurityError(
                "SQL expression has unbalanced parentheses or quotes".to_string(),
            ));
        }
        Ok(())
    }
}

/// Wraps an identifier in double quotes, doubling any embedded quote.
///
/// Callers are expected to have validated the identifier already; quoting
/// keeps mixed-case names intact in DataFusion.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Renders a string as a SQL literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
