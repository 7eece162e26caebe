//! SQL queries returned as delimited text.
//!
//! The host's SQL function returns one string with caller-chosen column and
//! row separators. Fixed separators would eventually collide with field
//! content, so every query gets a fresh pair of random tokens.

use rand::Rng;
use serde_json::Value;

use crate::{Bindings, Bridge, BridgeError, CallOptions, Host, encode_literal};

/// The host's SQL function answers `?` instead of rows when a query fails;
/// diagnostic builds append the error text after a space.
pub const SQL_ERROR_MARKER: &str = "?";

/// Rows of columns, as decoded from a query result
pub type Rows = Vec<Vec<String>>;

/// The column and row separators used for one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    /// Separates columns within a row
    pub column: String,
    /// Separates rows
    pub row: String,
}

impl Delimiters {
    /// Separators built around a fresh random token
    pub fn random() -> Self {
        let token: u64 = rand::thread_rng().r#gen();
        Self {
            column: format!("~{token:016x}|c~"),
            row: format!("~{token:016x}|r~"),
        }
    }

    /// Split raw query output into rows of columns. Empty output has no
    /// rows.
    pub fn decode(&self, raw: &str) -> Rows {
        if raw.is_empty() {
            return Vec::new();
        }

        raw.split(self.row.as_str())
            .map(|row| row.split(self.column.as_str()).map(str::to_owned).collect())
            .collect()
    }
}

/// Build the expression that runs `sql` with positional `parameters`
pub fn build_query(delimiters: &Delimiters, parameters: &[Value]) -> String {
    let mut arguments = vec![
        "~sql".to_owned(),
        encode_literal(&Value::String(delimiters.column.clone())),
        encode_literal(&Value::String(delimiters.row.clone())),
    ];
    arguments.extend(parameters.iter().map(encode_literal));

    format!("ExecuteSQL ( {} )", arguments.join(" ; "))
}

fn check_for_sql_error(raw: &str) -> Result<(), BridgeError> {
    if raw == SQL_ERROR_MARKER {
        return Err(BridgeError::QueryFailed(
            "the host could not execute the query".into(),
        ));
    }

    match raw.strip_prefix(SQL_ERROR_MARKER) {
        Some(detail) if detail.starts_with(char::is_whitespace) => {
            Err(BridgeError::QueryFailed(detail.trim().to_owned()))
        }
        _ => Ok(()),
    }
}

impl<H> Bridge<H>
where
    H: Host + 'static,
{
    /// Run a SQL query through the host and split its output into rows.
    ///
    /// `parameters` fill the query's `?` placeholders in order.
    pub async fn execute_query(&self, sql: &str, parameters: &[Value]) -> Result<Rows, BridgeError> {
        let delimiters = Delimiters::random();
        let bindings = Bindings::new().bind("~sql", sql)?;
        let expression = build_query(&delimiters, parameters);

        let raw = match self
            .evaluate_with(
                &expression,
                &bindings,
                CallOptions::default().always_return_string(),
            )
            .await?
        {
            Value::String(raw) => raw,
            Value::Null => String::new(),
            other => other.to_string(),
        };

        check_for_sql_error(&raw)?;
        Ok(delimiters.decode(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fixed() -> Delimiters {
        Delimiters {
            column: "|COL|".into(),
            row: "~ROW~".into(),
        }
    }

    #[test]
    fn it_splits_rows_then_columns() {
        assert_eq!(
            fixed().decode("a|COL|b~ROW~c|COL|d"),
            vec![vec!["a", "b"], vec!["c", "d"]]
        );
    }

    #[test]
    fn it_decodes_empty_output_as_no_rows() {
        assert_eq!(fixed().decode(""), Rows::new());
    }

    #[test]
    fn it_keeps_empty_cells() {
        assert_eq!(
            fixed().decode("|COL|b~ROW~c|COL|"),
            vec![vec!["", "b"], vec!["c", ""]]
        );
    }

    #[test]
    fn it_generates_distinct_delimiters() {
        let first = Delimiters::random();
        let second = Delimiters::random();

        assert_ne!(first.column, first.row);
        assert_ne!(first, second);
    }

    #[test]
    fn it_passes_parameters_positionally() {
        let expression = build_query(&fixed(), &[json!("ACME"), json!(3)]);
        assert_eq!(
            expression,
            r#"ExecuteSQL ( ~sql ; "|COL|" ; "~ROW~" ; "ACME" ; 3 )"#
        );
    }

    #[test]
    fn it_raises_host_sql_errors() {
        assert!(matches!(
            check_for_sql_error("?"),
            Err(BridgeError::QueryFailed(_))
        ));
        assert_eq!(
            check_for_sql_error("? ERROR: Unknown table Invoice"),
            Err(BridgeError::QueryFailed("ERROR: Unknown table Invoice".into()))
        );
        assert_eq!(check_for_sql_error("?ok"), Ok(()));
        assert_eq!(check_for_sql_error("a|COL|b"), Ok(()));
    }
}
