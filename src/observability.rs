//! Logging infrastructure for the compaction clerk.
//!
//! The crate uses `tracing` for structured logging. All events use target
//! "inkpress" and include an `event` field for filtering.
//!
//! The crate never initializes a global subscriber; applications configure
//! tracing via `tracing_subscriber` or similar.
//!
//! Conventions:
//! - `event`: snake_case event name (required)
//! - `component`: module/subsystem (e.g., "clerk", "rewriter")
//! - Use `%` for Display, `?` for Debug formatting

/// Target for all crate log events.
pub(crate) const INKPRESS_TARGET: &str = "inkpress";

/// Macro for info-level log events.
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::INKPRESS_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::INKPRESS_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::INKPRESS_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::INKPRESS_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
