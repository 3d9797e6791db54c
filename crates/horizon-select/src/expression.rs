//! Expression evaluation capability.
//!
//! The choices pipeline never interprets binding expressions itself. Track-by
//! keys, disable predicates, group-by names and attribute options are all
//! resolved through an injected [`ExpressionEvaluator`], parameterized by the
//! expression text and a small [`Scope`] of named locals.
//!
//! [`PathEvaluator`] is a reference implementation for hosts that do not bring
//! their own expression language. It serializes items with `serde` and
//! supports:
//!
//! - dotted and indexed paths: `person.address.city`, `person.tags[0]`
//! - literals: `'text'`, `"text"`, numbers, `true`, `false`, `null`
//! - negation: `!person.active`
//! - equality: `person.role == 'admin'`, `person.age != 0`

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::EvalError;

/// Named locals visible to an expression.
///
/// A scope usually binds a single name, the repeat item name, to the item
/// being evaluated.
pub struct Scope<'a, T> {
    locals: Vec<(&'a str, &'a T)>,
}

impl<'a, T> Scope<'a, T> {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self { locals: Vec::new() }
    }

    /// Create a scope binding `name` to `item`.
    pub fn item(name: &'a str, item: &'a T) -> Self {
        Self::new().with(name, item)
    }

    /// Add a local, shadowing any earlier binding of the same name.
    pub fn with(mut self, name: &'a str, item: &'a T) -> Self {
        self.locals.push((name, item));
        self
    }

    /// Look up a local by name.
    pub fn get(&self, name: &str) -> Option<&'a T> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| *local == name)
            .map(|(_, item)| *item)
    }

    /// Whether the scope has no locals.
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

impl<T> Default for Scope<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Scope<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.locals.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Evaluates binding expressions against a scope.
///
/// Implementations must be deterministic and free of side effects, and must
/// not call back into the widget that invokes them.
pub trait ExpressionEvaluator<T>: Send + Sync {
    /// Evaluate `expression` with the locals in `scope`.
    fn evaluate(&self, expression: &str, scope: &Scope<'_, T>) -> Result<Value, EvalError>;
}

impl<T, F> ExpressionEvaluator<T> for F
where
    F: Fn(&str, &Scope<'_, T>) -> Result<Value, EvalError> + Send + Sync,
{
    fn evaluate(&self, expression: &str, scope: &Scope<'_, T>) -> Result<Value, EvalError> {
        self(expression, scope)
    }
}

/// Truthiness of an evaluated value.
///
/// `null`, `false`, `0` and the empty string are falsy; everything else,
/// including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Render a value as a display name, without quotes for strings.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reference evaluator over `serde`-serializable items.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathEvaluator;

impl PathEvaluator {
    /// Create a path evaluator.
    pub fn new() -> Self {
        Self
    }

    fn eval<T: Serialize>(&self, text: &str, scope: &Scope<'_, T>) -> Result<Value, EvalError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EvalError::new("empty expression"));
        }

        if let Some((lhs, rhs, negated)) = split_comparison(text) {
            let equal = self.eval_operand(lhs, scope)? == self.eval_operand(rhs, scope)?;
            return Ok(Value::Bool(equal != negated));
        }

        self.eval_operand(text, scope)
    }

    fn eval_operand<T: Serialize>(
        &self,
        text: &str,
        scope: &Scope<'_, T>,
    ) -> Result<Value, EvalError> {
        let text = text.trim();

        if let Some(rest) = text.strip_prefix('!') {
            let inner = self.eval_operand(rest, scope)?;
            return Ok(Value::Bool(!is_truthy(&inner)));
        }

        if let Some(literal) = parse_literal(text) {
            return Ok(literal);
        }

        self.eval_path(text, scope)
    }

    fn eval_path<T: Serialize>(&self, text: &str, scope: &Scope<'_, T>) -> Result<Value, EvalError> {
        let (root, mut rest) = take_identifier(text)
            .ok_or_else(|| EvalError::new(format!("unexpected token in '{text}'")))?;
        let item = scope
            .get(root)
            .ok_or_else(|| EvalError::new(format!("unknown identifier '{root}'")))?;
        let mut value = serde_json::to_value(item)
            .map_err(|e| EvalError::new(format!("cannot inspect '{root}': {e}")))?;

        while !rest.is_empty() {
            if let Some(after_dot) = rest.strip_prefix('.') {
                let (name, after_name) = take_identifier(after_dot)
                    .ok_or_else(|| EvalError::new(format!("expected member name in '{text}'")))?;
                value = member(value, name);
                rest = after_name;
            } else if let Some(after_bracket) = rest.strip_prefix('[') {
                let end = after_bracket
                    .find(']')
                    .ok_or_else(|| EvalError::new(format!("unclosed '[' in '{text}'")))?;
                let index = after_bracket[..end].trim();
                value = match parse_literal(index) {
                    Some(Value::Number(n)) => match (value, n.as_u64()) {
                        (Value::Array(mut items), Some(i)) if (i as usize) < items.len() => {
                            items.swap_remove(i as usize)
                        }
                        _ => Value::Null,
                    },
                    Some(Value::String(name)) => member(value, &name),
                    _ => return Err(EvalError::new(format!("unsupported index '{index}'"))),
                };
                rest = &after_bracket[end + 1..];
            } else {
                return Err(EvalError::new(format!("unexpected '{rest}' in '{text}'")));
            }
        }

        Ok(value)
    }
}

impl<T: Serialize> ExpressionEvaluator<T> for PathEvaluator {
    fn evaluate(&self, expression: &str, scope: &Scope<'_, T>) -> Result<Value, EvalError> {
        self.eval(expression, scope)
    }
}

fn member(value: Value, name: &str) -> Value {
    match value {
        Value::Object(mut map) => map.remove(name).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn take_identifier(text: &str) -> Option<(&str, &str)> {
    let end = text
        .char_indices()
        .find(|(_, c)| !is_identifier_char(*c))
        .map_or(text.len(), |(i, _)| i);
    (end > 0).then(|| text.split_at(end))
}

fn parse_literal(text: &str) -> Option<Value> {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Some(Value::String(text[1..text.len() - 1].to_string()));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
            Some(value)
        }
        _ => None,
    }
}

/// Split `a == b` / `a != b` at the first operator outside quotes.
fn split_comparison(text: &str) -> Option<(&str, &str, bool)> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i + 1 < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if bytes[i + 1] == b'=' && (b == b'=' || b == b'!') => {
                return Some((&text[..i], &text[i + 2..], b == b'!'));
            }
            None => {}
        }
        i += 1;
    }
    None
}
