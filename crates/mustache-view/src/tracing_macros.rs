//! Conditional tracing macros
//!
//! These macros wrap tracing calls so the crate compiles without the `tracing`
//! feature. The adapter only logs at debug and trace level; the single
//! error-level event comes from [`Rendered`](crate::Rendered).

/// Log at error level, only when tracing feature is enabled
#[cfg(feature = "tracing")]
macro_rules! trace_error {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

/// Log at error level, no-op when tracing feature is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! trace_error {
    ($($arg:tt)*) => {};
}

/// Log at debug level, only when tracing feature is enabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

/// Log at debug level, no-op when tracing feature is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Log at trace level, only when tracing feature is enabled
#[cfg(feature = "tracing")]
macro_rules! trace_trace {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

/// Log at trace level, no-op when tracing feature is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! trace_trace {
    ($($arg:tt)*) => {};
}

pub(crate) use trace_debug;
pub(crate) use trace_error;
pub(crate) use trace_trace;
