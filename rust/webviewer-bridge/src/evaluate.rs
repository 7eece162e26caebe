//! Evaluating host expressions with local bindings.
//!
//! Rather than giving every feature its own host script, the bridge sends
//! host calculation expressions to a single evaluation script. Values are
//! bound as locals in a `Let` block so they never need to be spliced into
//! the expression text by hand:
//!
//! ```text
//! Let ( [ ~table = "Invoices" ; ~limit = 10 ] ; <expression> )
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::{Bridge, BridgeError, CallOptions, Host};

/// Separates bindings inside a `Let` block
pub const STATEMENT_SEPARATOR: &str = " ; ";

/// An ordered set of named values bound as locals around an expression
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    entries: Vec<(String, Value)>,
}

impl Bindings {
    /// An empty set of bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `name`. Binding the same name twice replaces the
    /// earlier value.
    pub fn bind<V>(mut self, name: &str, value: V) -> Result<Self, BridgeError>
    where
        V: Serialize,
    {
        if !is_valid_name(name) {
            return Err(BridgeError::InvalidBinding(name.to_owned()));
        }
        let value = serde_json::to_value(value)?;

        match self.entries.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_owned(), value)),
        }
        Ok(self)
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the bindings in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '~' | '$' | '.'))
}

/// Render a value as a host literal.
///
/// Text is quoted with the host's escapes; objects and arrays travel as
/// quoted JSON text for host-side JSON functions to unpack; `null` becomes
/// empty text.
pub fn encode_literal(value: &Value) -> String {
    match value {
        Value::Null => quote(""),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => quote(text),
        Value::Array(_) | Value::Object(_) => quote(&value.to_string()),
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' | '\\' | '¶' => {
                quoted.push('\\');
                quoted.push(c);
            }
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Wrap `expression` in a `Let` block declaring `bindings`. Without
/// bindings the expression is returned as is.
pub fn build_expression(expression: &str, bindings: &Bindings) -> String {
    if bindings.is_empty() {
        return expression.to_owned();
    }

    let declarations = bindings
        .iter()
        .map(|(name, value)| format!("{name} = {}", encode_literal(value)))
        .collect::<Vec<_>>()
        .join(STATEMENT_SEPARATOR);

    format!("Let ( [ {declarations} ] ; {expression} )")
}

impl<H> Bridge<H>
where
    H: Host + 'static,
{
    /// Evaluate a host expression with `bindings` in scope
    pub async fn evaluate(
        &self,
        expression: &str,
        bindings: &Bindings,
    ) -> Result<Value, BridgeError> {
        self.evaluate_with(expression, bindings, CallOptions::default())
            .await
    }

    /// Evaluate a host expression with `bindings` in scope, using explicit
    /// call options
    pub async fn evaluate_with(
        &self,
        expression: &str,
        bindings: &Bindings,
        options: CallOptions,
    ) -> Result<Value, BridgeError> {
        let expression = build_expression(expression, bindings);
        self.perform_script(&self.config().evaluate_script, &expression, options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_encodes_host_literals() {
        assert_eq!(encode_literal(&json!("Invoices")), r#""Invoices""#);
        assert_eq!(
            encode_literal(&json!(r#"say "hi" \ ¶"#)),
            r#""say \"hi\" \\ \¶""#
        );
        assert_eq!(encode_literal(&json!(12.5)), "12.5");
        assert_eq!(encode_literal(&json!(true)), "True");
        assert_eq!(encode_literal(&json!(null)), r#""""#);
        assert_eq!(encode_literal(&json!({ "a": 1 })), r#""{\"a\":1}""#);
    }

    #[test]
    fn it_wraps_expressions_in_a_let_block() {
        let bindings = Bindings::new()
            .bind("~table", "Invoices")
            .unwrap()
            .bind("~limit", 10)
            .unwrap();

        assert_eq!(
            build_expression("~table & ~limit", &bindings),
            r#"Let ( [ ~table = "Invoices" ; ~limit = 10 ] ; ~table & ~limit )"#
        );
    }

    #[test]
    fn it_sends_bare_expressions_without_bindings() {
        assert_eq!(
            build_expression("Get ( CurrentDate )", &Bindings::new()),
            "Get ( CurrentDate )"
        );
    }

    #[test]
    fn it_replaces_rebound_names() {
        let bindings = Bindings::new().bind("a", 1).unwrap().bind("a", 2).unwrap();
        assert_eq!(bindings.iter().collect::<Vec<_>>(), vec![("a", &json!(2))]);
    }

    #[test]
    fn it_rejects_names_that_would_break_the_expression() {
        for name in ["", "a b", "a;b", "x]", "1st", "a=b"] {
            assert_eq!(
                Bindings::new().bind(name, 1).unwrap_err(),
                BridgeError::InvalidBinding(name.into())
            );
        }
    }
}
