//! Default values shared by the configuration loader and the binaries.

use crate::logging::LogFormat;

/// Interface the server binds to unless overridden.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Inactivity timeout applied when none is configured.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 60;

/// Lock acquisition deadline applied when none is configured.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned bind host used where allocation is required (e.g. serde).
#[must_use]
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default inactivity timeout in seconds.
#[must_use]
pub const fn default_inactivity_timeout_secs() -> u64 {
    DEFAULT_INACTIVITY_TIMEOUT_SECS
}

/// Default lock acquisition deadline in seconds.
#[must_use]
pub const fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
