//! Widget configuration.
//!
//! [`ChoicesConfig`] is a plain struct with builder setters. It can also be
//! loaded from JSON, using the camelCase option names:
//!
//! ```
//! use horizon_select::ChoicesConfig;
//!
//! let config = ChoicesConfig::from_json(
//!     r#"{ "visibleLimitWhenSearching": 50, "searchDebounce": 0 }"#,
//! ).unwrap();
//! assert_eq!(config.visible_limit_when_searching, Some(50));
//! assert!(config.search_debounce.is_zero());
//! assert_eq!(config.visible_limit_when_searching_step, 50);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use horizon_select_core::logging::targets;

use crate::error::{ChoicesError, Result};
use crate::expression::{ExpressionEvaluator, Scope};

/// Default quiet period before a search change refreshes the list.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(200);
/// Default delay before the external refresh collaborator is invoked.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(1000);
/// Default global show-more increment.
pub const DEFAULT_VISIBLE_LIMIT_STEP: usize = 50;
/// Default per-group show-more increment.
pub const DEFAULT_GROUP_VISIBLE_LIMIT_STEP: usize = 10;

/// Options of a choices widget.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChoicesConfig {
    /// Quiet period for search changes. Zero disables debouncing.
    #[serde(with = "millis")]
    pub search_debounce: Duration,
    /// Cap applied whether or not a search is active.
    pub visible_limit: Option<usize>,
    /// Initial global cap while searching.
    pub visible_limit_when_searching: Option<usize>,
    /// Global show-more increment.
    pub visible_limit_when_searching_step: usize,
    /// Initial per-group cap while searching.
    pub group_visible_limit_when_searching: Option<usize>,
    /// Per-group show-more increment.
    pub group_visible_limit_when_searching_step: usize,
    /// Searches shorter than this (in characters) show nothing.
    pub minimum_input_length: usize,
    /// Delay before the external refresh collaborator runs.
    #[serde(with = "millis")]
    pub refresh_delay: Duration,
    /// Track-by expression used when the repeat binding has none.
    pub track_by: Option<String>,
}

impl Default for ChoicesConfig {
    fn default() -> Self {
        Self {
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            visible_limit: None,
            visible_limit_when_searching: None,
            visible_limit_when_searching_step: DEFAULT_VISIBLE_LIMIT_STEP,
            group_visible_limit_when_searching: None,
            group_visible_limit_when_searching_step: DEFAULT_GROUP_VISIBLE_LIMIT_STEP,
            minimum_input_length: 0,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            track_by: None,
        }
    }
}

impl ChoicesConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON. Missing options keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ChoicesError::invalid_config(e.to_string()))
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ChoicesError::invalid_config(e.to_string()))
    }

    /// Set the search debounce.
    pub fn search_debounce(mut self, delay: Duration) -> Self {
        self.search_debounce = delay;
        self
    }

    /// Set the cap applied regardless of search state.
    pub fn visible_limit(mut self, limit: usize) -> Self {
        self.visible_limit = Some(limit);
        self
    }

    /// Set the initial global cap while searching.
    pub fn visible_limit_when_searching(mut self, limit: usize) -> Self {
        self.visible_limit_when_searching = Some(limit);
        self
    }

    /// Set the global show-more increment.
    pub fn visible_limit_when_searching_step(mut self, step: usize) -> Self {
        self.visible_limit_when_searching_step = step;
        self
    }

    /// Set the initial per-group cap while searching.
    pub fn group_visible_limit_when_searching(mut self, limit: usize) -> Self {
        self.group_visible_limit_when_searching = Some(limit);
        self
    }

    /// Set the per-group show-more increment.
    pub fn group_visible_limit_when_searching_step(mut self, step: usize) -> Self {
        self.group_visible_limit_when_searching_step = step;
        self
    }

    /// Set the minimum search length.
    pub fn minimum_input_length(mut self, length: usize) -> Self {
        self.minimum_input_length = length;
        self
    }

    /// Set the external refresh delay.
    pub fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Set the fallback track-by expression.
    pub fn track_by(mut self, expression: impl Into<String>) -> Self {
        self.track_by = Some(expression.into());
        self
    }

    /// Apply widget attributes.
    ///
    /// Attribute names may be kebab-case (`search-debounce`) or camelCase.
    /// Values are expressions evaluated with an empty scope; numeric options
    /// take the leading integer of the result, the way attribute strings are
    /// usually parsed. A value that is not a positive number leaves a limit
    /// unset. `track-by` is taken verbatim as an expression. Unknown
    /// attributes are ignored.
    pub fn resolve_attributes<'a, T>(
        mut self,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
        evaluator: &dyn ExpressionEvaluator<T>,
    ) -> Result<Self> {
        for (name, expression) in attributes {
            let option = name.replace('-', "").to_ascii_lowercase();
            if option == "trackby" {
                self.track_by = Some(expression.trim().to_string()).filter(|t| !t.is_empty());
                continue;
            }

            let known = matches!(
                option.as_str(),
                "searchdebounce"
                    | "visiblelimit"
                    | "visiblelimitwhensearching"
                    | "visiblelimitwhensearchingstep"
                    | "groupvisiblelimitwhensearching"
                    | "groupvisiblelimitwhensearchingstep"
                    | "minimuminputlength"
                    | "refreshdelay"
            );
            if !known {
                tracing::trace!(target: targets::REFRESH, attribute = name, "ignoring unknown attribute");
                continue;
            }

            let value = evaluator
                .evaluate(expression, &Scope::new())
                .map_err(|e| ChoicesError::invalid_config(format!("{name}: {e}")))?;
            let number = leading_integer(&value);
            let positive = number.filter(|n| *n > 0).map(|n| n as usize);

            match option.as_str() {
                "searchdebounce" => {
                    self.search_debounce = Duration::from_millis(positive.unwrap_or(0) as u64);
                }
                "visiblelimit" => self.visible_limit = positive,
                "visiblelimitwhensearching" => self.visible_limit_when_searching = positive,
                "visiblelimitwhensearchingstep" => {
                    self.visible_limit_when_searching_step =
                        positive.unwrap_or(DEFAULT_VISIBLE_LIMIT_STEP);
                }
                "groupvisiblelimitwhensearching" => {
                    self.group_visible_limit_when_searching = positive;
                }
                "groupvisiblelimitwhensearchingstep" => {
                    self.group_visible_limit_when_searching_step =
                        positive.unwrap_or(DEFAULT_GROUP_VISIBLE_LIMIT_STEP);
                }
                "minimuminputlength" => self.minimum_input_length = positive.unwrap_or(0),
                "refreshdelay" => {
                    if let Some(ms) = number.filter(|n| *n >= 0) {
                        self.refresh_delay = Duration::from_millis(ms as u64);
                    }
                }
                _ => {}
            }
        }
        Ok(self)
    }
}

/// Integer prefix of a value: `250`, `250.7` and `"250px"` all give 250.
fn leading_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().ok().map(|n| sign * n)
        }
        _ => None,
    }
}

/// `Duration` as whole milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
