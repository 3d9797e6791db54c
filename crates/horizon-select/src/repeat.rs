//! Repeat binding parser.
//!
//! A choices list is bound with a repeat expression such as
//! `person in people | filter: $select.search track by person.id`. Parsing
//! produces a [`RepeatDescriptor`] naming the loop variable, the collection
//! expression and the optional track-by and group-by clauses.
//!
//! Supported forms (whitespace tolerant):
//!
//! ```text
//! item in collection
//! item in collection track by item.id
//! item.id as item in collection
//! (key, value) in (object | filter: x)
//! ```

use regex::Regex;

use horizon_select_core::logging::targets;

use crate::error::{ChoicesError, Result};

/// Grammar of a repeat binding.
///
/// Groups: 1 select-as, 2 item name, 3 key name, 4 value name, 5 source,
/// 6 track-by.
const REPEAT_PATTERN: &str = r"^\s*(?:([\s\S]+?)\s+as\s+)?(?:([$\w][$\w]*)|(?:\(\s*([$\w][$\w]*)\s*,\s*([$\w][$\w]*)\s*\)))\s+in\s+([\s\S]+?)(?:\s+track\s+by\s+([\s\S]+?))?\s*$";

/// Repeat fragment iterating the groups of a grouped list.
pub const GROUP_REPEAT_EXPRESSION: &str = "$group in $select.groups track by $group.name";

/// Normalized form of a repeat binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatDescriptor {
    item_name: String,
    key_name: Option<String>,
    collection_expression: String,
    filters: Option<String>,
    select_as_expression: Option<String>,
    track_by_expression: Option<String>,
    group_by_expression: Option<String>,
}

impl RepeatDescriptor {
    /// Parse a repeat binding.
    ///
    /// Returns [`ChoicesError::MalformedExpression`] when the text does not
    /// have the `<item> in <collection>` shape.
    pub fn parse(text: &str) -> Result<Self> {
        let grammar =
            Regex::new(REPEAT_PATTERN).map_err(|e| ChoicesError::malformed(text, e.to_string()))?;
        let caps = grammar.captures(text).ok_or_else(|| {
            ChoicesError::malformed(
                text,
                "expected '_item_ in _collection_[ track by _id_]'",
            )
        })?;

        let group = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());

        let select_as_expression = group(1).filter(|s| !s.is_empty());
        let track_by_expression = group(6).filter(|s| !s.is_empty());
        let source = group(5).unwrap_or_default();

        let descriptor = match group(2) {
            Some(item_name) => Self {
                item_name,
                key_name: None,
                collection_expression: source,
                filters: None,
                select_as_expression,
                track_by_expression,
                group_by_expression: None,
            },
            None => {
                let (collection, filters) = split_filters(strip_parens(&source));
                Self {
                    item_name: group(4).unwrap_or_default(),
                    key_name: group(3),
                    collection_expression: collection,
                    filters,
                    select_as_expression,
                    track_by_expression,
                    group_by_expression: None,
                }
            }
        };

        if descriptor.item_name.is_empty() || descriptor.collection_expression.is_empty() {
            return Err(ChoicesError::malformed(text, "missing item name or collection"));
        }

        tracing::trace!(
            target: targets::REPEAT,
            item = %descriptor.item_name,
            collection = %descriptor.collection_expression,
            track_by = ?descriptor.track_by_expression,
            "parsed repeat binding"
        );

        Ok(descriptor)
    }

    /// Attach a group-by expression.
    ///
    /// A quoted literal such as `'department'` is shorthand for the property
    /// path `<item>.department`. An empty expression removes grouping.
    pub fn with_group_by(mut self, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let expression = expression.trim();
        self.group_by_expression = if expression.is_empty() {
            None
        } else if let Some(property) = unquote(expression) {
            Some(format!("{}.{}", self.item_name, property))
        } else {
            Some(expression.to_string())
        };
        self
    }

    /// Use `expression` as the track-by clause unless the binding has one.
    pub fn with_track_by_fallback(mut self, expression: impl Into<String>) -> Self {
        if self.track_by_expression.is_none() {
            let expression = expression.into();
            let expression = expression.trim();
            if !expression.is_empty() {
                self.track_by_expression = Some(expression.to_string());
            }
        }
        self
    }

    /// The loop variable name.
    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// The key variable name of the `(key, value)` form.
    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// The collection expression, without the filter chain in the
    /// `(key, value)` form.
    pub fn collection_expression(&self) -> &str {
        &self.collection_expression
    }

    /// Filter chain split off the collection in the `(key, value)` form.
    pub fn filters(&self) -> Option<&str> {
        self.filters.as_deref()
    }

    /// The `<expr> as` projection, if any.
    pub fn select_as_expression(&self) -> Option<&str> {
        self.select_as_expression.as_deref()
    }

    /// The expression the selection model binds to: the projection when
    /// present, the loop variable otherwise.
    pub fn model_expression(&self) -> &str {
        self.select_as_expression
            .as_deref()
            .unwrap_or(&self.item_name)
    }

    pub fn track_by_expression(&self) -> Option<&str> {
        self.track_by_expression.as_deref()
    }

    pub fn group_by_expression(&self) -> Option<&str> {
        self.group_by_expression.as_deref()
    }

    /// Whether a group-by expression is attached.
    pub fn is_grouped(&self) -> bool {
        self.group_by_expression.is_some()
    }

    /// The repeat fragment the renderer iterates.
    ///
    /// Grouped lists iterate `$group.items` inside the
    /// [`GROUP_REPEAT_EXPRESSION`] wrapper; flat lists iterate
    /// `$select.items`.
    pub fn repeat_expression(&self, group_by_expression: Option<&str>) -> String {
        let grouped = group_by_expression.is_some_and(|g| !g.trim().is_empty());
        let source = if grouped {
            "$group.items"
        } else {
            "$select.items"
        };
        let mut expression = format!("{} in {}", self.item_name, source);
        if let Some(track_by) = &self.track_by_expression {
            expression.push_str(" track by ");
            expression.push_str(track_by);
        }
        expression
    }
}

fn strip_parens(source: &str) -> &str {
    let source = source.strip_prefix('(').unwrap_or(source);
    source.strip_suffix(')').unwrap_or(source).trim()
}

/// Split `collection | filter: x` at the first single `|`.
fn split_filters(source: &str) -> (String, Option<String>) {
    let bytes = source.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'|' {
            continue;
        }
        let prev_pipe = i > 0 && bytes[i - 1] == b'|';
        let next_pipe = bytes.get(i + 1) == Some(&b'|');
        if !prev_pipe && !next_pipe {
            let collection = source[..i].trim().to_string();
            let filters = source[i + 1..].trim();
            return (
                collection,
                (!filters.is_empty()).then(|| filters.to_string()),
            );
        }
    }
    (source.trim().to_string(), None)
}

fn unquote(expression: &str) -> Option<&str> {
    let inner = expression
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| {
            expression
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
        })?;
    let is_path = !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.');
    is_path.then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_binding() {
        let d = RepeatDescriptor::parse("person in people").unwrap();
        assert_eq!(d.item_name(), "person");
        assert_eq!(d.collection_expression(), "people");
        assert_eq!(d.track_by_expression(), None);
        assert_eq!(d.group_by_expression(), None);
        assert_eq!(d.model_expression(), "person");
    }

    #[test]
    fn parses_filters_and_track_by() {
        let d = RepeatDescriptor::parse(
            "  person in people | filter: {name: $select.search}   track by person.id ",
        )
        .unwrap();
        assert_eq!(d.item_name(), "person");
        assert_eq!(
            d.collection_expression(),
            "people | filter: {name: $select.search}"
        );
        assert_eq!(d.track_by_expression(), Some("person.id"));
    }

    #[test]
    fn parses_select_as() {
        let d = RepeatDescriptor::parse("person.email as person in people").unwrap();
        assert_eq!(d.item_name(), "person");
        assert_eq!(d.select_as_expression(), Some("person.email"));
        assert_eq!(d.model_expression(), "person.email");
    }

    #[test]
    fn parses_key_value_form() {
        let d = RepeatDescriptor::parse("(code, country) in (countries | filter: x)").unwrap();
        assert_eq!(d.key_name(), Some("code"));
        assert_eq!(d.item_name(), "country");
        assert_eq!(d.collection_expression(), "countries");
        assert_eq!(d.filters(), Some("filter: x"));

        let d = RepeatDescriptor::parse("(k, v) in a || b").unwrap();
        assert_eq!(d.collection_expression(), "a || b");
        assert_eq!(d.filters(), None);
    }

    #[test]
    fn collection_containing_as_word() {
        let d = RepeatDescriptor::parse("item in assets").unwrap();
        assert_eq!(d.item_name(), "item");
        assert_eq!(d.collection_expression(), "assets");
        assert_eq!(d.select_as_expression(), None);
    }

    #[test]
    fn rejects_malformed_bindings() {
        for text in ["person people", "", "in people", "person in ", "(a b) in c"] {
            let err = RepeatDescriptor::parse(text).unwrap_err();
            assert!(err.is_fatal(), "{text:?} should be fatal");
        }
    }

    #[test]
    fn group_by_literal_is_normalized() {
        let d = RepeatDescriptor::parse("person in people")
            .unwrap()
            .with_group_by("'department'");
        assert_eq!(d.group_by_expression(), Some("person.department"));
        assert!(d.is_grouped());

        let d = d.with_group_by("groupFn(person)");
        assert_eq!(d.group_by_expression(), Some("groupFn(person)"));

        let d = d.with_group_by("");
        assert!(!d.is_grouped());
    }

    #[test]
    fn track_by_fallback_only_when_missing() {
        let d = RepeatDescriptor::parse("p in people")
            .unwrap()
            .with_track_by_fallback("p.id");
        assert_eq!(d.track_by_expression(), Some("p.id"));

        let d = RepeatDescriptor::parse("p in people track by p.email")
            .unwrap()
            .with_track_by_fallback("p.id");
        assert_eq!(d.track_by_expression(), Some("p.email"));
    }

    #[test]
    fn repeat_expression_fragments() {
        let d = RepeatDescriptor::parse("person in people track by person.id").unwrap();
        assert_eq!(
            d.repeat_expression(None),
            "person in $select.items track by person.id"
        );
        assert_eq!(
            d.repeat_expression(Some("person.department")),
            "person in $group.items track by person.id"
        );

        let d = RepeatDescriptor::parse("person in people").unwrap();
        assert_eq!(d.repeat_expression(Some("  ")), "person in $select.items");
        assert_eq!(
            GROUP_REPEAT_EXPRESSION,
            "$group in $select.groups track by $group.name"
        );
    }
}
