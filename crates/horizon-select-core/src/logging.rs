//! Logging facilities for Horizon Select.
//!
//! Horizon Select uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_select=debug,horizon_select_core=trace")
//!     .init();
//! ```
//!
//! The constants in [`targets`] can be used in filter directives to select a
//! single subsystem.

/// Span names used throughout Horizon Select for tracing.
pub mod span_names {
    /// A full refresh pass of a choices widget.
    pub const REFRESH: &str = "horizon_select::refresh";
    /// A limits-only pass that reuses the previous candidate set.
    pub const RELIMIT: &str = "horizon_select::relimit";
}

/// Target names for log filtering.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "horizon_select_core";
    /// Cooperative scheduler target.
    pub const SCHEDULER: &str = "horizon_select_core::scheduler";
    /// Debouncer target.
    pub const DEBOUNCE: &str = "horizon_select_core::debounce";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_select_core::signal";
    /// Refresh orchestration target.
    pub const REFRESH: &str = "horizon_select::refresh";
    /// Visibility limiter target.
    pub const LIMITER: &str = "horizon_select::limiter";
    /// Repeat expression parser target.
    pub const REPEAT: &str = "horizon_select::repeat";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_select::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[macro_export]
macro_rules! select_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "horizon_select_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! select_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "horizon_select_core", $($arg)*)
    };
}
