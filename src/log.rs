use chrono::{SecondsFormat, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Read `MAILSIFT_DEBUG` once; any value other than empty or "0" turns on
/// debug output.
pub fn init() {
    let enabled = std::env::var("MAILSIFT_DEBUG")
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false);
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn debug_enabled() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Current UTC time as ISO 8601 with millisecond precision (used by macros)
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        eprintln!("[{}] [INFO] {}", $crate::log::now(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::log::debug_enabled() {
            eprintln!("[{}] [DEBUG] {}", $crate::log::now(), format!($($arg)*))
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!("[{}] [ERROR] {}", $crate::log::now(), format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        eprintln!("[{}] [WARN] {}", $crate::log::now(), format!($($arg)*))
    };
}
