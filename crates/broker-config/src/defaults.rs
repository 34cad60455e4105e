use std::path::PathBuf;

use crate::logging::LogFormat;

/// Host the front-end router binds to when none is configured.
pub const DEFAULT_FRONTEND_HOST: &str = "0.0.0.0";

/// Front-end port used when none is configured.
pub const DEFAULT_FRONTEND_PORT: u16 = 5555;

/// Worker pool size used when none is configured.
pub const DEFAULT_WORKERS: usize = 5;

/// Heartbeat tick in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 2500;

/// Heartbeats a worker may miss before it is reaped.
pub const DEFAULT_HEARTBEAT_LIVENESS: u32 = 3;

/// Age after which an unreachable instance record is stale (one day).
pub const DEFAULT_STALE_AFTER_SECS: u64 = 24 * 60 * 60;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Log filter applied when verbose output is requested.
pub const VERBOSE_LOG_FILTER: &str = "debug";

const APP_DIR: &str = "brokerd";

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Resolves the directory that holds broker runtime data.
///
/// The first available of the user's home directory (`~/.brokerd`), config
/// directory, and cache directory is used, falling back to `/tmp/brokerd`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(format!(".{APP_DIR}")))
        .or_else(|| dirs::config_dir().map(|dir| dir.join(APP_DIR)))
        .or_else(|| dirs::cache_dir().map(|dir| dir.join(APP_DIR)))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR))
}
