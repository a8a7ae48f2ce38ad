//! Structured tag-based logging
//!
//! Console logger with standard log levels (Error/Warning/Info/Debug/Verbose)
//! and per-subsystem tags. The minimum level is a process-wide setting so a
//! host binary can turn diagnostics on without touching library code.
//!
//! ```rust
//! use market_aggregator::logger::{self, LogTag};
//!
//! logger::info(LogTag::Aggregator, "refresh cycle complete");
//! logger::debug(LogTag::Cache, "coalesced query for 9xQeWv..");
//! ```

mod format;
mod levels;
mod tags;

pub use levels::LogLevel;
pub use tags::LogTag;

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU8, Ordering};

static MIN_LEVEL: Lazy<AtomicU8> = Lazy::new(|| AtomicU8::new(LogLevel::Info as u8));

/// Set the minimum level that will be printed; call once at startup.
pub fn set_min_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn should_log(level: LogLevel) -> bool {
    // Errors always log
    level == LogLevel::Error || (level as u8) <= MIN_LEVEL.load(Ordering::Relaxed)
}

/// Log at ERROR level (always shown, critical issues)
pub fn error(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level (important issues)
pub fn warning(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level (standard operations)
pub fn info(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (detailed diagnostics)
pub fn debug(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level (trace detail)
pub fn verbose(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Verbose, message);
}

fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(level) {
        return;
    }
    format::format_and_log(tag, level, message);
}
