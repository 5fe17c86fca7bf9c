//! Module-gated logging macros.
//!
//! A module opts in by declaring a flag and then using the macros exported at the
//! crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_debug, log_warn};
//!
//! log_debug!("issued search at offset {}", offset);
//! ```
//! With the flag off the calls compile down to nothing, which keeps noisy
//! per-keystroke logging out of release builds without touching `RUST_LOG`.

use log::LevelFilter;

/// Delegates to `log::$level!` when the calling module's `ENABLE_LOGS` is set.
#[macro_export]
macro_rules! log_gated {
    ($level:ident, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::$level!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::log_gated!(debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::log_gated!(info, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::log_gated!(warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::log_gated!(error, $($arg)*) };
}

/// Default level for the env_logger backend. `NOTEPAGE_DEBUG=1` (or `true`)
/// raises it to debug; `RUST_LOG` still overrides per target.
pub fn default_level() -> LevelFilter {
    let debug_mode = std::env::var("NOTEPAGE_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if debug_mode {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}
