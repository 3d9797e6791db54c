//! Visibility limits and show-more paging.
//!
//! While a search is active the candidate list can be capped globally and
//! per group. Caps start at the configured limits, grow with
//! [`show_more`](VisibilityLimiter::show_more) and
//! [`show_more_group`](VisibilityLimiter::show_more_group), and reset when
//! the search text changes.
//!
//! Per-group caps are applied first; the global cap then operates on the
//! concatenation of the truncated groups. A group the global cap cuts short
//! is flagged truncated, and a group it hides entirely is omitted. The
//! always-on `visible_limit` applies last.

use std::collections::HashMap;
use std::sync::Arc;

use horizon_select_core::logging::targets;

use crate::config::ChoicesConfig;

/// A named run of items sharing a group-by value.
#[derive(Debug)]
pub struct Group<T> {
    pub name: String,
    pub items: Vec<Arc<T>>,
    /// Whether some of the group's items are hidden.
    pub truncated: bool,
    /// Size of the group before any cap.
    pub total_count: usize,
}

impl<T> Group<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            truncated: false,
            total_count: 0,
        }
    }

    /// Number of the group's items that are hidden.
    pub fn hidden_count(&self) -> usize {
        self.total_count.saturating_sub(self.items.len())
    }
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            items: self.items.clone(),
            truncated: self.truncated,
            total_count: self.total_count,
        }
    }
}

impl<T> PartialEq for Group<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.truncated == other.truncated
            && self.total_count == other.total_count
            && self.items.len() == other.items.len()
            && self
                .items
                .iter()
                .zip(&other.items)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

/// Filtered items before limits are applied.
#[derive(Debug)]
pub enum Candidates<T> {
    Flat(Vec<Arc<T>>),
    Grouped(Vec<Group<T>>),
}

impl<T> Candidates<T> {
    /// Number of candidate items.
    pub fn len(&self) -> usize {
        match self {
            Self::Flat(items) => items.len(),
            Self::Grouped(groups) => groups.iter().map(|g| g.items.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Candidates after limits were applied.
#[derive(Debug)]
pub struct LimitedView<T> {
    /// Visible items in display order.
    pub items: Vec<Arc<T>>,
    /// Visible groups; empty for a flat list.
    pub groups: Vec<Group<T>>,
    /// Whether a global cap hid items while a search was active.
    pub truncated_while_searching: bool,
    /// Items hidden by the global caps.
    pub remaining_count: usize,
}

/// Tracks the current caps of one widget.
#[derive(Debug, Clone)]
pub struct VisibilityLimiter {
    default_global_limit: Option<usize>,
    global_step: usize,
    default_group_limit: Option<usize>,
    group_step: usize,
    visible_limit: Option<usize>,

    current_global_limit: Option<usize>,
    group_current_limit: HashMap<String, usize>,
    last_search: Option<String>,
    last_filtered_total: Option<usize>,
    last_group_totals: HashMap<String, usize>,
}

impl VisibilityLimiter {
    /// Create a limiter from the widget options. Zero limits count as unset.
    pub fn new(config: &ChoicesConfig) -> Self {
        let positive = |limit: Option<usize>| limit.filter(|n| *n > 0);
        let default_global_limit = positive(config.visible_limit_when_searching);
        Self {
            default_global_limit,
            global_step: config.visible_limit_when_searching_step,
            default_group_limit: positive(config.group_visible_limit_when_searching),
            group_step: config.group_visible_limit_when_searching_step,
            visible_limit: positive(config.visible_limit),
            current_global_limit: default_global_limit,
            group_current_limit: HashMap::new(),
            last_search: None,
            last_filtered_total: None,
            last_group_totals: HashMap::new(),
        }
    }

    /// Record the search text, resetting every cap if it changed.
    ///
    /// Returns whether the caps were reset.
    pub fn observe_search(&mut self, search: &str) -> bool {
        if self.last_search.as_deref() == Some(search) {
            return false;
        }
        self.reset();
        self.last_search = Some(search.to_string());
        true
    }

    /// Restore the configured caps.
    pub fn reset(&mut self) {
        self.current_global_limit = self.default_global_limit;
        self.group_current_limit.clear();
        self.last_filtered_total = None;
        self.last_group_totals.clear();
    }

    /// The current global cap while searching.
    pub fn current_global_limit(&self) -> Option<usize> {
        self.current_global_limit
    }

    /// The current cap of a group while searching.
    pub fn group_limit(&self, name: &str) -> Option<usize> {
        self.group_current_limit
            .get(name)
            .copied()
            .or(self.default_group_limit)
    }

    /// Raise the global cap by `step` or the configured step.
    ///
    /// The cap never decreases and never grows past the number of filtered
    /// items of the last pass, counted before group caps. Returns whether the
    /// cap changed.
    pub fn show_more(&mut self, step: Option<usize>) -> bool {
        let Some(current) = self.current_global_limit else {
            return false;
        };
        let mut next = current.saturating_add(step.unwrap_or(self.global_step));
        if let Some(total) = self.last_filtered_total {
            next = next.min(total).max(current);
        }
        self.current_global_limit = Some(next);
        tracing::debug!(target: targets::LIMITER, from = current, to = next, "show more");
        next != current
    }

    /// Raise the cap of one group by `step` or the configured group step.
    ///
    /// Empty names, groups absent from the last pass and groups without a
    /// cap are ignored. Returns whether the cap changed.
    pub fn show_more_group(&mut self, name: &str, step: Option<usize>) -> bool {
        if name.is_empty() {
            return false;
        }
        let Some(&total) = self.last_group_totals.get(name) else {
            return false;
        };
        let Some(current) = self.group_limit(name) else {
            return false;
        };
        let next = current
            .saturating_add(step.unwrap_or(self.group_step))
            .min(total)
            .max(current);
        self.group_current_limit.insert(name.to_string(), next);
        tracing::debug!(target: targets::LIMITER, group = name, from = current, to = next, "show more in group");
        next != current
    }

    /// Apply the current caps to `candidates`.
    pub fn apply<T>(&mut self, search: &str, candidates: &Candidates<T>) -> LimitedView<T> {
        let searching = !search.is_empty();
        let search_cap = if searching {
            self.current_global_limit
        } else {
            None
        };
        let cap = match (search_cap, self.visible_limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        match candidates {
            Candidates::Flat(items) => {
                self.last_group_totals.clear();
                let total = items.len();
                self.last_filtered_total = Some(total);

                let shown = cap.map_or(total, |c| c.min(total));
                LimitedView {
                    items: items[..shown].to_vec(),
                    groups: Vec::new(),
                    truncated_while_searching: searching && shown < total,
                    remaining_count: total - shown,
                }
            }
            Candidates::Grouped(groups) => {
                self.last_group_totals = groups
                    .iter()
                    .map(|g| (g.name.clone(), g.items.len()))
                    .collect();

                let allowed: Vec<usize> = groups
                    .iter()
                    .map(|g| {
                        let group_cap = if searching { self.group_limit(&g.name) } else { None };
                        group_cap.map_or(g.items.len(), |c| c.min(g.items.len()))
                    })
                    .collect();
                let total: usize = allowed.iter().sum();
                self.last_filtered_total = Some(candidates.len());

                let mut budget = cap.unwrap_or(usize::MAX);
                let mut items = Vec::with_capacity(total.min(budget));
                let mut visible = Vec::with_capacity(groups.len());
                for (group, allowed) in groups.iter().zip(allowed) {
                    let take = allowed.min(budget);
                    budget -= take;
                    if take == 0 {
                        continue;
                    }
                    let shown = group.items[..take].to_vec();
                    items.extend(shown.iter().cloned());
                    visible.push(Group {
                        name: group.name.clone(),
                        items: shown,
                        truncated: take < group.items.len(),
                        total_count: group.items.len(),
                    });
                }

                LimitedView {
                    remaining_count: total - items.len(),
                    truncated_while_searching: searching && items.len() < total,
                    items,
                    groups: visible,
                }
            }
        }
    }
}
