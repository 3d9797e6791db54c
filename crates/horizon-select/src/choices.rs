//! The choices widget core.
//!
//! [`SelectChoices`] ties the pipeline together. It owns the parsed repeat
//! binding, debounces search changes, pulls items from a [`DataSource`],
//! groups and caps them, and publishes a [`VisibleSet`] through a signal the
//! renderer listens to.
//!
//! A refresh runs when
//!
//! - the search text settles after the debounce delay,
//! - the list is opened,
//! - the external refresh delay elapses, or
//! - more items are requested with show-more.
//!
//! Nothing runs on its own thread. Debounced and delayed work is queued on a
//! [`Scheduler`] that the host pumps with
//! [`run_ready`](Scheduler::run_ready).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use horizon_select::prelude::*;
//! use horizon_select_core::ManualClock;
//!
//! let clock = Arc::new(ManualClock::new());
//! let scheduler = Scheduler::with_clock(clock.clone());
//! let source = Arc::new(VecSource::displayed(
//!     vec!["Apple".to_string(), "Apricot".to_string(), "Banana".to_string()],
//!     CaseSensitivity::CaseInsensitive,
//! ));
//!
//! let choices = SelectChoices::builder("fruit in fruits", source, PathEvaluator)
//!     .scheduler(scheduler.clone())
//!     .build()
//!     .unwrap();
//!
//! choices.open().unwrap();
//! assert_eq!(choices.visible().len(), 3);
//!
//! choices.set_search("ap");
//! clock.advance(Duration::from_millis(200));
//! scheduler.run_ready();
//! assert_eq!(choices.visible().len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use horizon_select_core::logging::{span_names, targets};
use horizon_select_core::{Debouncer, PerfSpan, ScheduledTaskId, Scheduler, Signal};
use parking_lot::Mutex;

use crate::config::ChoicesConfig;
use crate::disabled::{DisablePredicate, DisabledFlagCache};
use crate::error::{ChoicesError, Result};
use crate::expression::{ExpressionEvaluator, Scope, display_value};
use crate::key::{ItemKey, KeyGetter};
use crate::limiter::{Candidates, Group, LimitedView, VisibilityLimiter};
use crate::repeat::{GROUP_REPEAT_EXPRESSION, RepeatDescriptor};
use crate::source::{DataSource, RefreshHandler};

// ============================================================================
// Visible Set
// ============================================================================

/// The items a renderer should display, as published after a refresh.
#[derive(Debug)]
pub struct VisibleSet<T> {
    /// Visible items in display order.
    pub items: Vec<Arc<T>>,
    /// Key of each visible item, parallel to `items`.
    pub keys: Vec<ItemKey>,
    /// Visible groups; empty when the list is not grouped.
    pub groups: Vec<Group<T>>,
    /// Whether a global cap, `visibleLimit` included, hid items while a
    /// search was active.
    pub truncated_while_searching: bool,
    /// Number of matching items hidden by the global caps.
    pub remaining_count: usize,
    /// The search text the set was computed for.
    pub search: String,
}

impl<T> VisibleSet<T> {
    fn empty(search: String) -> Self {
        Self {
            items: Vec::new(),
            keys: Vec::new(),
            groups: Vec::new(),
            truncated_while_searching: false,
            remaining_count: 0,
            search,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_grouped(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Look up a visible group by name.
    pub fn group(&self, name: &str) -> Option<&Group<T>> {
        self.groups.iter().find(|g| g.name == name)
    }
}

impl<T> Default for VisibleSet<T> {
    fn default() -> Self {
        Self::empty(String::new())
    }
}

impl<T> PartialEq for VisibleSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
            && self.groups == other.groups
            && self.truncated_while_searching == other.truncated_while_searching
            && self.remaining_count == other.remaining_count
            && self.search == other.search
            && self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

// ============================================================================
// Internal State
// ============================================================================

/// Filtered and grouped items of the last full refresh.
struct CandidateSnapshot<T> {
    search: String,
    revision: Option<u64>,
    candidates: Candidates<T>,
}

struct ChoicesState<T> {
    search: String,
    open: bool,
    limiter: VisibilityLimiter,
    disabled: Arc<DisabledFlagCache>,
    snapshot: Option<CandidateSnapshot<T>>,
    visible: Arc<VisibleSet<T>>,
    refresh_timer: Option<ScheduledTaskId>,
    torn_down: bool,
}

struct ChoicesInner<T> {
    descriptor: RepeatDescriptor,
    config: ChoicesConfig,
    keys: KeyGetter<T>,
    disable: Option<DisablePredicate<T>>,
    group_filter: Option<Vec<String>>,
    evaluator: Arc<dyn ExpressionEvaluator<T>>,
    source: Arc<dyn DataSource<T>>,
    refresh_handler: Option<Arc<dyn RefreshHandler>>,
    scheduler: Scheduler,
    state: Mutex<ChoicesState<T>>,
    published: Signal<Arc<VisibleSet<T>>>,
    refresh_failed: Signal<ChoicesError>,
}

impl<T: Send + Sync + 'static> ChoicesInner<T> {
    fn meets_minimum_length(&self, search: &str) -> bool {
        search.chars().count() >= self.config.minimum_input_length
    }

    /// Debounced reaction to a search change.
    fn on_search_changed(self: &Arc<Self>) {
        tracing::debug!(target: targets::REFRESH, "search settled");
        if let Err(err) = self.request_refresh() {
            self.report_failure(err);
        }
    }

    /// Recompute now and, with an external collaborator, (re)arm its timer.
    fn request_refresh(self: &Arc<Self>) -> Result<()> {
        let search = self.state.lock().search.clone();
        if self.refresh_handler.is_some() && self.meets_minimum_length(&search) {
            self.arm_refresh_timer();
        }
        self.refresh_items()
    }

    fn arm_refresh_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut state = self.state.lock();
        if state.torn_down {
            return;
        }
        if let Some(previous) = state.refresh_timer.take() {
            let _ = self.scheduler.cancel(previous);
        }
        let id = self
            .scheduler
            .schedule_once(self.config.refresh_delay, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.run_refresh_handler();
                }
            });
        state.refresh_timer = Some(id);
    }

    fn run_refresh_handler(&self) {
        let search = {
            let mut state = self.state.lock();
            state.refresh_timer = None;
            if state.torn_down {
                return;
            }
            state.search.clone()
        };
        let Some(handler) = &self.refresh_handler else {
            return;
        };

        tracing::debug!(target: targets::REFRESH, search = %search, "invoking refresh handler");
        let result = handler
            .refresh(&search)
            .map_err(ChoicesError::from)
            .and_then(|()| self.refresh_items());
        if let Err(err) = result {
            self.report_failure(err);
        }
    }

    /// Automatic refreshes keep the previous visible set on failure.
    fn report_failure(&self, err: ChoicesError) {
        tracing::warn!(
            target: targets::REFRESH,
            error = %err,
            "refresh failed; keeping previous results"
        );
        self.refresh_failed.emit(err);
    }

    /// Full pass: read, filter, cache flags, group, limit, publish.
    fn refresh_items(&self) -> Result<()> {
        let _span = PerfSpan::new(span_names::REFRESH);

        let search = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.torn_down {
                return Ok(());
            }
            state.limiter.observe_search(&state.search);
            state.search.clone()
        };

        if !self.meets_minimum_length(&search) {
            tracing::trace!(
                target: targets::REFRESH,
                minimum = self.config.minimum_input_length,
                "search too short; publishing empty set"
            );
            let empty = Arc::new(VisibleSet::empty(search));
            {
                let mut state = self.state.lock();
                state.snapshot = None;
                state.visible = empty.clone();
            }
            self.published.emit(empty);
            return Ok(());
        }

        let revision = self.source.revision();
        let items = self.source.items()?;
        let filtered = self.source.filter(&items, &search)?;

        let disabled = match &self.disable {
            Some(predicate) if self.keys.has_stable_keys() => {
                DisabledFlagCache::build(&items, predicate, &self.keys)?.at_revision(revision)
            }
            _ => DisabledFlagCache::new(),
        };

        let candidates = self.group(filtered)?;
        let view = self.state.lock().limiter.apply(&search, &candidates);
        let visible = self.visible_set(view, search.clone())?;

        {
            let mut state = self.state.lock();
            if state.torn_down {
                return Ok(());
            }
            state.disabled = Arc::new(disabled);
            state.snapshot = Some(CandidateSnapshot {
                search,
                revision,
                candidates,
            });
            state.visible = visible.clone();
        }

        tracing::debug!(
            target: targets::REFRESH,
            total = items.len(),
            shown = visible.len(),
            remaining = visible.remaining_count,
            "refreshed choices"
        );
        self.published.emit(visible);
        Ok(())
    }

    /// Limits-only pass over the last candidates, falling back to a full
    /// refresh when they are stale.
    fn relimit(&self) -> Result<()> {
        let _span = PerfSpan::new(span_names::RELIMIT);
        let revision = self.source.revision();

        let limited = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.torn_down {
                return Ok(());
            }
            match &state.snapshot {
                Some(snapshot)
                    if revision.is_some()
                        && snapshot.revision == revision
                        && snapshot.search == state.search =>
                {
                    let view = state.limiter.apply(&snapshot.search, &snapshot.candidates);
                    Some((view, snapshot.search.clone()))
                }
                _ => None,
            }
        };

        let Some((view, search)) = limited else {
            tracing::trace!(target: targets::REFRESH, "candidates stale; running full refresh");
            return self.refresh_items();
        };

        let visible = self.visible_set(view, search)?;
        {
            let mut state = self.state.lock();
            if state.torn_down {
                return Ok(());
            }
            state.visible = visible.clone();
        }
        self.published.emit(visible);
        Ok(())
    }

    fn group(&self, filtered: Vec<Arc<T>>) -> Result<Candidates<T>> {
        let Some(expression) = self.descriptor.group_by_expression() else {
            return Ok(Candidates::Flat(filtered));
        };
        let item_name = self.descriptor.item_name();

        let mut groups: Vec<Group<T>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for item in filtered {
            let value = {
                let scope = Scope::item(item_name, item.as_ref());
                self.evaluator
                    .evaluate(expression, &scope)
                    .map_err(|e| ChoicesError::key_evaluation(expression, e))?
            };
            let name = display_value(&value);
            let slot = match index.get(&name) {
                Some(&slot) => slot,
                None => {
                    index.insert(name.clone(), groups.len());
                    groups.push(Group::new(name));
                    groups.len() - 1
                }
            };
            groups[slot].items.push(item);
        }
        for group in &mut groups {
            group.total_count = group.items.len();
        }

        if let Some(filter) = &self.group_filter {
            let mut by_name: HashMap<String, Group<T>> =
                groups.into_iter().map(|g| (g.name.clone(), g)).collect();
            groups = filter.iter().filter_map(|name| by_name.remove(name)).collect();
        }

        Ok(Candidates::Grouped(groups))
    }

    fn visible_set(&self, view: LimitedView<T>, search: String) -> Result<Arc<VisibleSet<T>>> {
        let keys = self.keys.keys(&view.items)?;
        Ok(Arc::new(VisibleSet {
            items: view.items,
            keys,
            groups: view.groups,
            truncated_while_searching: view.truncated_while_searching,
            remaining_count: view.remaining_count,
            search,
        }))
    }
}

// ============================================================================
// Select Choices
// ============================================================================

/// A filterable, groupable list of choices bound to a data source.
///
/// Dropping the widget cancels its pending timers.
pub struct SelectChoices<T: Send + Sync + 'static> {
    inner: Arc<ChoicesInner<T>>,
    debouncer: Debouncer,
}

impl<T: Send + Sync + 'static> SelectChoices<T> {
    /// Start building a widget for the repeat binding `repeat`.
    ///
    /// `source` supplies the items; `evaluator` resolves the track-by,
    /// group-by and disable expressions.
    pub fn builder<S, E>(
        repeat: impl Into<String>,
        source: Arc<S>,
        evaluator: E,
    ) -> SelectChoicesBuilder<T>
    where
        S: DataSource<T> + 'static,
        E: ExpressionEvaluator<T> + 'static,
    {
        SelectChoicesBuilder {
            repeat: repeat.into(),
            source,
            evaluator: Arc::new(evaluator),
            config: ChoicesConfig::default(),
            group_by: None,
            group_filter: None,
            disable_choice: None,
            refresh_handler: None,
            scheduler: None,
        }
    }

    /// Update the search text.
    ///
    /// The text is stored immediately; the refresh runs once the debounce
    /// delay passes without another change.
    pub fn set_search(&self, text: impl Into<String>) {
        let text = text.into();
        {
            let mut state = self.inner.state.lock();
            if state.torn_down || state.search == text {
                return;
            }
            state.search = text;
        }
        self.debouncer.trigger();
    }

    /// The current search text.
    pub fn search(&self) -> String {
        self.inner.state.lock().search.clone()
    }

    /// Whether a debounced search refresh is waiting.
    pub fn is_search_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Open the list and refresh it.
    pub fn open(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.torn_down {
                return Ok(());
            }
            state.open = true;
        }
        self.inner.request_refresh()
    }

    /// Close the list.
    pub fn close(&self) {
        self.inner.state.lock().open = false;
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// Refresh now, re-arming the external refresh timer if configured.
    pub fn refresh(&self) -> Result<()> {
        self.inner.request_refresh()
    }

    /// Show more items while searching.
    ///
    /// `step` defaults to `visibleLimitWhenSearchingStep`.
    pub fn show_more(&self, step: Option<usize>) -> Result<()> {
        self.inner.state.lock().limiter.show_more(step);
        self.inner.relimit()
    }

    /// Show more items of one group while searching.
    ///
    /// Unknown groups are ignored and do not refresh.
    pub fn show_more_group(&self, name: &str, step: Option<usize>) -> Result<()> {
        let expanded = self
            .inner
            .state
            .lock()
            .limiter
            .show_more_group(name, step);
        if !expanded {
            return Ok(());
        }
        self.inner.relimit()
    }

    /// Whether `item` matches the disable expression.
    ///
    /// Uses the flags of the last refresh while the source revision is
    /// unchanged.
    pub fn is_disabled(&self, item: &Arc<T>) -> Result<bool> {
        let Some(predicate) = &self.inner.disable else {
            return Ok(false);
        };
        let current = self.inner.source.revision();
        let cache = self.inner.state.lock().disabled.clone();
        cache.is_disabled(item, predicate, &self.inner.keys, current)
    }

    /// The most recently published visible set.
    pub fn visible(&self) -> Arc<VisibleSet<T>> {
        self.inner.state.lock().visible.clone()
    }

    /// Emitted with every new visible set.
    pub fn published(&self) -> &Signal<Arc<VisibleSet<T>>> {
        &self.inner.published
    }

    /// Emitted when an automatic refresh fails.
    pub fn refresh_failed(&self) -> &Signal<ChoicesError> {
        &self.inner.refresh_failed
    }

    pub fn descriptor(&self) -> &RepeatDescriptor {
        &self.inner.descriptor
    }

    pub fn config(&self) -> &ChoicesConfig {
        &self.inner.config
    }

    /// The repeat fragment for the renderer.
    pub fn repeat_expression(&self) -> String {
        let descriptor = &self.inner.descriptor;
        descriptor.repeat_expression(descriptor.group_by_expression())
    }

    /// The group wrapper fragment, when the list is grouped.
    pub fn group_repeat_expression(&self) -> Option<&'static str> {
        self.inner
            .descriptor
            .is_grouped()
            .then_some(GROUP_REPEAT_EXPRESSION)
    }

    /// The current global cap while searching.
    pub fn current_global_limit(&self) -> Option<usize> {
        self.inner.state.lock().limiter.current_global_limit()
    }

    /// The current cap of a group while searching.
    pub fn group_limit(&self, name: &str) -> Option<usize> {
        self.inner.state.lock().limiter.group_limit(name)
    }

    /// Number of entries in the disabled-flag cache.
    pub fn disabled_cache_len(&self) -> usize {
        self.inner.state.lock().disabled.len()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Cancel pending timers and stop reacting to changes.
    pub fn teardown(&self) {
        self.debouncer.cancel();
        let mut state = self.inner.state.lock();
        if state.torn_down {
            return;
        }
        state.torn_down = true;
        if let Some(id) = state.refresh_timer.take() {
            let _ = self.inner.scheduler.cancel(id);
        }
        drop(state);
        tracing::debug!(target: targets::REFRESH, "choices torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.state.lock().torn_down
    }
}

impl<T: Send + Sync + 'static> Drop for SelectChoices<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for SelectChoices<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SelectChoices")
            .field("descriptor", &self.inner.descriptor)
            .field("search", &state.search)
            .field("open", &state.open)
            .field("visible", &state.visible.len())
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`SelectChoices`].
pub struct SelectChoicesBuilder<T> {
    repeat: String,
    source: Arc<dyn DataSource<T>>,
    evaluator: Arc<dyn ExpressionEvaluator<T>>,
    config: ChoicesConfig,
    group_by: Option<String>,
    group_filter: Option<Vec<String>>,
    disable_choice: Option<String>,
    refresh_handler: Option<Arc<dyn RefreshHandler>>,
    scheduler: Option<Scheduler>,
}

impl<T: Send + Sync + 'static> SelectChoicesBuilder<T> {
    /// Set the widget options.
    pub fn config(mut self, config: ChoicesConfig) -> Self {
        self.config = config;
        self
    }

    /// Group items by `expression`. A quoted property name such as
    /// `'department'` groups by that property of the item.
    pub fn group_by(mut self, expression: impl Into<String>) -> Self {
        self.group_by = Some(expression.into());
        self
    }

    /// Keep only the named groups, in the given order.
    pub fn group_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Mark items for which `expression` is truthy as disabled.
    pub fn disable_choice(mut self, expression: impl Into<String>) -> Self {
        self.disable_choice = Some(expression.into());
        self
    }

    /// Invoke `handler` after the refresh delay whenever a refresh is
    /// requested.
    pub fn refresh_handler<H: RefreshHandler + 'static>(mut self, handler: H) -> Self {
        self.refresh_handler = Some(Arc::new(handler));
        self
    }

    /// Queue timers on `scheduler` instead of a private one.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Parse the binding and create the widget.
    ///
    /// Fails with [`ChoicesError::MalformedExpression`] when the binding
    /// cannot be parsed.
    pub fn build(self) -> Result<SelectChoices<T>> {
        let mut descriptor = RepeatDescriptor::parse(&self.repeat)?;
        if let Some(track_by) = &self.config.track_by {
            descriptor = descriptor.with_track_by_fallback(track_by.as_str());
        }
        if let Some(group_by) = self.group_by {
            descriptor = descriptor.with_group_by(group_by);
        }

        let keys = KeyGetter::from_descriptor(&descriptor, self.evaluator.clone());
        let disable = self
            .disable_choice
            .filter(|expression| !expression.trim().is_empty())
            .map(|expression| {
                DisablePredicate::new(expression, descriptor.item_name(), self.evaluator.clone())
            });
        let scheduler = self.scheduler.unwrap_or_default();

        let state = ChoicesState {
            search: String::new(),
            open: false,
            limiter: VisibilityLimiter::new(&self.config),
            disabled: Arc::new(DisabledFlagCache::new()),
            snapshot: None,
            visible: Arc::new(VisibleSet::default()),
            refresh_timer: None,
            torn_down: false,
        };

        tracing::debug!(
            target: targets::REFRESH,
            binding = %self.repeat,
            grouped = descriptor.is_grouped(),
            track_by = ?descriptor.track_by_expression(),
            "created choices"
        );

        let inner = Arc::new(ChoicesInner {
            descriptor,
            keys,
            disable,
            group_filter: self.group_filter,
            evaluator: self.evaluator,
            source: self.source,
            refresh_handler: self.refresh_handler,
            scheduler: scheduler.clone(),
            state: Mutex::new(state),
            published: Signal::new(),
            refresh_failed: Signal::new(),
            config: self.config,
        });

        let weak = Arc::downgrade(&inner);
        let debouncer = Debouncer::new(scheduler, inner.config.search_debounce, move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_search_changed();
            }
        });

        Ok(SelectChoices { inner, debouncer })
    }
}
