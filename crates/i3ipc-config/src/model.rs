//! Configuration data model

use std::path::PathBuf;

/// Default number of connection retry attempts
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Default initial delay between retry attempts (100ms)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Default cap on the delay between retry attempts (1 second)
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 1000;

/// Default upper bound on a single message payload: 64 MiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub connection: ConnectionConfig,
}

/// Settings for the IPC channel to the window manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Path of the i3 IPC socket. `None` means the caller must supply one.
    pub socket_path: Option<PathBuf>,
    /// Retries after the first failed connection attempt
    pub connect_retries: u32,
    /// Delay before the first retry; doubled on each further retry
    pub retry_delay_ms: u64,
    /// Upper bound for the retry delay
    pub max_retry_delay_ms: u64,
    /// Largest payload accepted from the window manager, in bytes
    pub max_payload_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_retry_delay_ms: DEFAULT_MAX_RETRY_DELAY_MS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}
