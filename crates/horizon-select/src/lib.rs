//! Filterable, groupable choice lists for Horizon Select.
//!
//! This crate provides the search and paging pipeline behind a select
//! widget's dropdown, featuring:
//!
//! - **Repeat Bindings**: `item in collection track by item.id` parsed into a descriptor
//! - **Stable Keys**: item identity from a track-by expression or the shared allocation
//! - **Disabled Flags**: the disable expression evaluated once per item per refresh
//! - **Debounced Search**: rapid keystrokes coalesced into a single refresh
//! - **Show More**: global and per-group caps while searching, expanded on demand
//! - **Pluggable Collaborators**: data sources, expression evaluators and external refreshes
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_select::prelude::*;
//!
//! let names: Vec<String> = (0..500).map(|i| format!("Employee {i}")).collect();
//! let source = Arc::new(VecSource::displayed(names, CaseSensitivity::CaseInsensitive));
//!
//! let choices = SelectChoices::builder("name in names", source, PathEvaluator)
//!     .config(
//!         ChoicesConfig::new()
//!             .search_debounce(std::time::Duration::ZERO)
//!             .visible_limit_when_searching(50),
//!     )
//!     .build()
//!     .unwrap();
//!
//! choices.set_search("employee");
//! choices.scheduler().run_ready();
//!
//! let visible = choices.visible();
//! assert_eq!(visible.len(), 50);
//! assert_eq!(visible.remaining_count, 450);
//!
//! choices.show_more(None).unwrap();
//! assert_eq!(choices.visible().len(), 100);
//! ```

pub mod choices;
pub mod config;
pub mod disabled;
pub mod expression;
pub mod key;
pub mod limiter;
pub mod repeat;
pub mod source;

mod error;

pub use choices::{SelectChoices, SelectChoicesBuilder, VisibleSet};
pub use config::ChoicesConfig;
pub use error::{ChoicesError, EvalError, Result, SourceError};
pub use repeat::RepeatDescriptor;

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::choices::{SelectChoices, SelectChoicesBuilder, VisibleSet};
    pub use crate::config::ChoicesConfig;
    pub use crate::disabled::{DisablePredicate, DisabledFlagCache};
    pub use crate::error::{ChoicesError, EvalError, SourceError};
    pub use crate::expression::{ExpressionEvaluator, PathEvaluator, Scope};
    pub use crate::key::{ItemKey, KeyGetter};
    pub use crate::limiter::{Group, VisibilityLimiter};
    pub use crate::repeat::{GROUP_REPEAT_EXPRESSION, RepeatDescriptor};
    pub use crate::source::{CaseSensitivity, DataSource, RefreshHandler, VecSource};

    pub use horizon_select_core::{Scheduler, Signal};
}
