//! Disabled-flag cache.
//!
//! The disable predicate is evaluated once per item per refresh and the
//! results are stored by [`ItemKey`], so the renderer can query the flag for
//! every visible row without re-evaluating the expression.
//!
//! A cache remembers the source revision it was built from. Once the source
//! reports a different revision, or none at all, lookups fall back to
//! evaluating the predicate directly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use horizon_select_core::logging::targets;

use crate::error::{ChoicesError, Result};
use crate::expression::{ExpressionEvaluator, Scope, is_truthy};
use crate::key::{ItemKey, KeyGetter};

/// A boolean expression deciding whether an item can be chosen.
pub struct DisablePredicate<T> {
    expression: String,
    item_name: String,
    evaluator: Arc<dyn ExpressionEvaluator<T>>,
}

impl<T> DisablePredicate<T> {
    pub fn new(
        expression: impl Into<String>,
        item_name: impl Into<String>,
        evaluator: Arc<dyn ExpressionEvaluator<T>>,
    ) -> Self {
        Self {
            expression: expression.into(),
            item_name: item_name.into(),
            evaluator,
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate the predicate for one item.
    pub fn evaluate(&self, item: &T) -> Result<bool> {
        let scope = Scope::item(&self.item_name, item);
        self.evaluator
            .evaluate(&self.expression, &scope)
            .map(|value| is_truthy(&value))
            .map_err(|e| ChoicesError::key_evaluation(self.expression.as_str(), e))
    }
}

impl<T> fmt::Debug for DisablePredicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisablePredicate")
            .field("expression", &self.expression)
            .finish()
    }
}

/// Per-key disabled flags, rebuilt wholesale on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledFlagCache {
    flags: HashMap<ItemKey, bool>,
    revision: Option<u64>,
}

impl DisabledFlagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `predicate` for every item.
    ///
    /// When several items share a key the last one wins.
    pub fn build<T>(
        items: &[Arc<T>],
        predicate: &DisablePredicate<T>,
        keys: &KeyGetter<T>,
    ) -> Result<Self> {
        let mut flags = HashMap::with_capacity(items.len());
        for item in items {
            let key = keys.key(item)?;
            flags.insert(key, predicate.evaluate(item)?);
        }
        tracing::trace!(
            target: targets::REFRESH,
            entries = flags.len(),
            "rebuilt disabled-flag cache"
        );
        Ok(Self {
            flags,
            revision: None,
        })
    }

    /// Record the source revision the cache was built from.
    pub fn at_revision(mut self, revision: Option<u64>) -> Self {
        self.revision = revision;
        self
    }

    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    /// Whether the cache still describes a source at `current`.
    pub fn is_fresh(&self, current: Option<u64>) -> bool {
        self.revision.is_some() && self.revision == current
    }

    /// Cached flag for `key`, if present.
    pub fn lookup(&self, key: &ItemKey) -> Option<bool> {
        self.flags.get(key).copied()
    }

    /// Whether `item` is disabled, given the source is at `current`.
    ///
    /// Falls back to evaluating the predicate when the cache is stale or the
    /// item is not cached.
    pub fn is_disabled<T>(
        &self,
        item: &Arc<T>,
        predicate: &DisablePredicate<T>,
        keys: &KeyGetter<T>,
        current: Option<u64>,
    ) -> Result<bool> {
        if keys.has_stable_keys()
            && self.is_fresh(current)
            && let Some(flag) = self.lookup(&keys.key(item)?)
        {
            return Ok(flag);
        }
        predicate.evaluate(item)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn clear(&mut self) {
        self.flags.clear();
    }
}
