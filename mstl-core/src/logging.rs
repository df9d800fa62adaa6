//! The process-wide diagnostic callback (spec.md section 6, "Logger").
//!
//! mstl also emits through the standard `log` facade (`log::trace!` etc.) at
//! its call sites, same as any other Rust library; this module adds the
//! single severity-tagged callback spec.md's external interface list asks
//! for, for callers who want diagnostics funneled into their own sink
//! instead of (or in addition to) a `log::Log` implementation. Installed
//! once, the same `OnceLock` "set once before ingestion begins" pattern as
//! [`crate::time::install_leap_seconds`].
use std::sync::OnceLock;

pub use log::Level as Severity;

type Sink = dyn Fn(Severity, &str) + Send + Sync;

static LOG_SINK: OnceLock<Box<Sink>> = OnceLock::new();

/// Installs the process-wide diagnostic callback. A no-op after the first
/// call wins; `OnceLock` does not support replacement, matching the "set
/// once" contract spec.md section 5 describes for process-wide state.
pub fn install_log_sink(sink: impl Fn(Severity, &str) + Send + Sync + 'static) {
    let _ = LOG_SINK.set(Box::new(sink));
}

/// Routes one diagnostic message through both the `log` facade and the
/// installed sink, if any. Used internally by the merge and pack call
/// sites via the [`crate::mstl_log`] macro rather than called directly.
pub fn emit(level: Severity, msg: std::fmt::Arguments<'_>) {
    log::log!(level, "{}", msg);
    if let Some(sink) = LOG_SINK.get() {
        sink(level, &msg.to_string());
    }
}

/// Logs through [`emit`] at the given `log::Level`, e.g.
/// `mstl_core::mstl_log!(mstl_core::logging::Severity::Debug, "{} segments", n)`.
#[macro_export]
macro_rules! mstl_log {
    ($level:expr, $($arg:tt)+) => {
        $crate::logging::emit($level, format_args!($($arg)+))
    };
}
