//! Stable item keys.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ChoicesError, Result};
use crate::expression::{ExpressionEvaluator, Scope};
use crate::repeat::RepeatDescriptor;

/// Identity of an item across refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    /// Canonical JSON of the evaluated track-by expression.
    Tracked(String),
    /// Address of the shared allocation holding the item.
    Identity(usize),
}

impl ItemKey {
    /// Key for an evaluated track-by value.
    ///
    /// Two values produce equal keys exactly when they are equal.
    pub fn tracked(value: &Value) -> Self {
        Self::Tracked(value.to_string())
    }

    /// Reference-identity key for an item.
    pub fn identity<T>(item: &Arc<T>) -> Self {
        Self::Identity(Arc::as_ptr(item) as usize)
    }

    /// Whether the key survives re-creation of the item.
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tracked(value) => f.write_str(value),
            Self::Identity(addr) => write!(f, "@{addr:#x}"),
        }
    }
}

/// Derives [`ItemKey`]s from a track-by expression.
pub struct KeyGetter<T> {
    item_name: String,
    track_by: Option<String>,
    evaluator: Arc<dyn ExpressionEvaluator<T>>,
}

impl<T> KeyGetter<T> {
    /// Create a key getter. Without `track_by`, keys are reference identities.
    pub fn new(
        item_name: impl Into<String>,
        track_by: Option<String>,
        evaluator: Arc<dyn ExpressionEvaluator<T>>,
    ) -> Self {
        Self {
            item_name: item_name.into(),
            track_by: track_by.filter(|t| !t.trim().is_empty()),
            evaluator,
        }
    }

    /// Create a key getter for a parsed repeat binding.
    pub fn from_descriptor(
        descriptor: &RepeatDescriptor,
        evaluator: Arc<dyn ExpressionEvaluator<T>>,
    ) -> Self {
        Self::new(
            descriptor.item_name(),
            descriptor.track_by_expression().map(str::to_string),
            evaluator,
        )
    }

    pub fn track_by_expression(&self) -> Option<&str> {
        self.track_by.as_deref()
    }

    /// Whether keys are derived from item content rather than identity.
    pub fn has_stable_keys(&self) -> bool {
        self.track_by.is_some()
    }

    /// Key of a single item.
    pub fn key(&self, item: &Arc<T>) -> Result<ItemKey> {
        let Some(track_by) = &self.track_by else {
            return Ok(ItemKey::identity(item));
        };
        let scope = Scope::item(&self.item_name, item.as_ref());
        self.evaluator
            .evaluate(track_by, &scope)
            .map(|value| ItemKey::tracked(&value))
            .map_err(|e| ChoicesError::key_evaluation(track_by.as_str(), e))
    }

    /// Keys of a slice of items, in order.
    pub fn keys(&self, items: &[Arc<T>]) -> Result<Vec<ItemKey>> {
        items.iter().map(|item| self.key(item)).collect()
    }
}

impl<T> fmt::Debug for KeyGetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGetter")
            .field("item_name", &self.item_name)
            .field("track_by", &self.track_by)
            .finish()
    }
}
