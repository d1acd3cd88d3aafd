//! Environment variable names used by this crate for convenient
//! configuration of the logger from a server binary.
//!
//! These are purely helpers; the logger itself never reads the environment.

/// Emit entries as JSON on the console (`1`/`true`/`on`).
pub const LOG_SINK_JSON_ENV: &str = "LOG_SINK_JSON";

/// Hide startup messages.
pub const LOG_SINK_QUIET_ENV: &str = "LOG_SINK_QUIET";

/// Disable error logging entirely, e.g. under test.
pub const LOG_SINK_DISABLE_ENV: &str = "LOG_SINK_DISABLE";

/// Path list of build roots whose `src/` prefix is trimmed from traces.
pub const LOG_SINK_BUILD_PATHS_ENV: &str = "LOG_SINK_BUILD_PATHS";

/// Path list of toolchain roots, trimmed like build roots.
pub const LOG_SINK_TOOLCHAIN_PATHS_ENV: &str = "LOG_SINK_TOOLCHAIN_PATHS";

/// Project-relative prefix trimmed after the root rules.
pub const LOG_SINK_PROJECT_PREFIX_ENV: &str = "LOG_SINK_PROJECT_PREFIX";

/// Webhook receiving error log entries.
pub const LOG_SINK_WEBHOOK_URL_ENV: &str = "LOG_SINK_WEBHOOK_URL";

/// Webhook receiving audit entries.
pub const LOG_SINK_AUDIT_WEBHOOK_URL_ENV: &str = "LOG_SINK_AUDIT_WEBHOOK_URL";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an optional, non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a boolean switch; unset or unrecognized values are `false`.
pub fn env_flag(key: &str) -> bool {
    parse_flag(&env_or(key, ""))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}
