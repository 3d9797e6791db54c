//! Collaborators supplying items to a choices widget.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::SourceError;

// ============================================================================
// Data Source Trait
// ============================================================================

/// Supplies the items a choices widget lists.
///
/// The widget never mutates what it receives.
pub trait DataSource<T>: Send + Sync {
    /// The full current collection.
    fn items(&self) -> Result<Vec<Arc<T>>, SourceError>;

    /// The items matching `search`, in display order.
    ///
    /// An empty search usually keeps everything.
    fn filter(&self, items: &[Arc<T>], search: &str) -> Result<Vec<Arc<T>>, SourceError>;

    /// A counter that changes whenever the collection changes.
    ///
    /// Show-more reuses the previous candidates only when this returns the
    /// same `Some` value as during the last refresh, and cached disabled
    /// flags are trusted under the same condition. The default `None` always
    /// forces a full refresh and direct predicate evaluation.
    fn revision(&self) -> Option<u64> {
        None
    }
}

// ============================================================================
// Refresh Handler Trait
// ============================================================================

/// External fetch run after the refresh delay, typically to load remote
/// results for the current search into the data source.
pub trait RefreshHandler: Send + Sync {
    fn refresh(&self, search: &str) -> Result<(), SourceError>;
}

impl<F> RefreshHandler for F
where
    F: Fn(&str) -> Result<(), SourceError> + Send + Sync,
{
    fn refresh(&self, search: &str) -> Result<(), SourceError> {
        self(search)
    }
}

// ============================================================================
// Case Sensitivity
// ============================================================================

/// Controls how the default text match handles letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseSensitivity {
    /// "Ann" does not match "anna".
    CaseSensitive,
    /// "Ann" matches "anna".
    #[default]
    CaseInsensitive,
}

// ============================================================================
// Vec Source
// ============================================================================

type MatchFn<T> = Arc<dyn Fn(&T, &str) -> bool + Send + Sync>;

/// An in-memory data source with a pluggable match predicate.
pub struct VecSource<T> {
    items: RwLock<Vec<Arc<T>>>,
    matcher: MatchFn<T>,
    revision: AtomicU64,
}

impl<T: Send + Sync + 'static> VecSource<T> {
    /// Create a source whose search keeps items for which `matcher` returns
    /// true.
    pub fn new<F>(items: Vec<T>, matcher: F) -> Self
    where
        F: Fn(&T, &str) -> bool + Send + Sync + 'static,
    {
        Self::from_shared(items.into_iter().map(Arc::new).collect(), matcher)
    }

    /// Create a source over already shared items.
    pub fn from_shared<F>(items: Vec<Arc<T>>, matcher: F) -> Self
    where
        F: Fn(&T, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            items: RwLock::new(items),
            matcher: Arc::new(matcher),
            revision: AtomicU64::new(0),
        }
    }

    /// Create a source matching the search as a substring of each item's
    /// display text.
    pub fn displayed(items: Vec<T>, case_sensitivity: CaseSensitivity) -> Self
    where
        T: fmt::Display,
    {
        Self::new(items, move |item: &T, search: &str| match case_sensitivity {
            CaseSensitivity::CaseSensitive => item.to_string().contains(search),
            CaseSensitivity::CaseInsensitive => item
                .to_string()
                .to_lowercase()
                .contains(&search.to_lowercase()),
        })
    }

    /// Snapshot of the current items.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.read().clone()
    }

    /// Replace every item.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.write() = items.into_iter().map(Arc::new).collect();
        self.bump();
    }

    /// Append an item.
    pub fn push(&self, item: T) {
        self.items.write().push(Arc::new(item));
        self.bump();
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.items.write().clear();
        self.bump();
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: Send + Sync + 'static> DataSource<T> for VecSource<T> {
    fn items(&self) -> Result<Vec<Arc<T>>, SourceError> {
        Ok(self.snapshot())
    }

    fn filter(&self, items: &[Arc<T>], search: &str) -> Result<Vec<Arc<T>>, SourceError> {
        if search.is_empty() {
            return Ok(items.to_vec());
        }
        Ok(items
            .iter()
            .filter(|&item| (self.matcher)(Arc::as_ref(item), search))
            .cloned()
            .collect())
    }

    fn revision(&self) -> Option<u64> {
        Some(self.revision.load(Ordering::SeqCst))
    }
}

impl<T> fmt::Debug for VecSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecSource")
            .field("len", &self.items.read().len())
            .field("revision", &self.revision.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruits() -> Vec<&'static str> {
        vec!["Apple", "apricot", "Banana", "Cherry"]
    }

    #[test]
    fn test_displayed_case_insensitive() {
        let source = VecSource::displayed(fruits(), CaseSensitivity::CaseInsensitive);
        let items = source.items().unwrap();
        let found = source.filter(&items, "AP").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(*found[0], "Apple");
        assert_eq!(*found[1], "apricot");
    }

    #[test]
    fn test_displayed_case_sensitive() {
        let source = VecSource::displayed(fruits(), CaseSensitivity::CaseSensitive);
        let items = source.items().unwrap();
        assert_eq!(source.filter(&items, "ap").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_search_keeps_everything() {
        let source = VecSource::new(fruits(), |_: &&str, _: &str| false);
        let items = source.items().unwrap();
        assert_eq!(source.filter(&items, "").unwrap().len(), 4);
        assert!(source.filter(&items, "x").unwrap().is_empty());
    }

    #[test]
    fn test_revision_tracks_changes() {
        let source = VecSource::displayed(fruits(), CaseSensitivity::default());
        let start = source.revision().unwrap();

        source.push("Date");
        assert_eq!(source.len(), 5);
        assert_eq!(source.revision(), Some(start + 1));

        source.set_items(vec!["Fig"]);
        source.clear();
        assert!(source.is_empty());
        assert_eq!(source.revision(), Some(start + 3));
    }

    #[test]
    fn test_closure_refresh_handler() {
        let handler = |search: &str| -> Result<(), SourceError> {
            if search == "fail" {
                Err(SourceError::new("offline"))
            } else {
                Ok(())
            }
        };
        assert!(handler.refresh("ok").is_ok());
        assert_eq!(handler.refresh("fail").unwrap_err().message, "offline");
    }
}
