//! Constants and configuration values for Chassismon
//!
//! Centralizes magic numbers, paths, and configuration defaults.
//! Add new values here rather than inlining them at the call site.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Default configuration file
    pub const CONFIG_FILE: &str = "/etc/chassismon/config.json";

    /// Default alarm-query socket served by chassismond
    pub const DAEMON_SOCKET: &str = "/run/chassismon.sock";

    /// Default socket of the platform hardware-state service
    pub const PLATFORM_SOCKET: &str = "/run/chassis-platform.sock";

    /// Default sysfs LED class directory
    pub const LED_BASE: &str = "/sys/class/leds";

    /// PID file for chassismond
    pub const PID_FILE: &str = "/run/chassismond.pid";
}

/// Reconciliation loop timing
pub mod timing {
    use super::Duration;

    /// Default wait between a failure and the next full rebuild
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 5_000;

    /// Lower bound accepted from configuration
    pub const MIN_RETRY_BACKOFF_MS: u64 = 100;

    /// Upper bound accepted from configuration
    pub const MAX_RETRY_BACKOFF_MS: u64 = 600_000;

    /// Read/write timeout for request/response exchanges with the platform service
    pub const PLATFORM_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

    /// Read/write timeout for the CLI talking to chassismond
    pub const DAEMON_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Pattern atoms used to build and classify condition strings
pub mod patterns {
    /// Wildcard for free-text positions (entity type, airflow, sensor, level)
    pub const ANY_TEXT: &str = ".*";

    /// Wildcard for numeric positions (slot, fan index)
    pub const ANY_NUMBER: &str = "[0-9]+";

    /// Conditions matching any of these are informational, not alarms
    pub const NON_ALARM: &[&str] = &[".* present", ".* nominal"];
}

/// IPC limits
pub mod ipc {
    /// Maximum concurrent query clients on the daemon socket
    pub const MAX_CONNECTIONS: usize = 32;

    /// Socket permissions for the daemon socket (world-readable query API)
    pub const SOCKET_MODE: u32 = 0o666;

    /// Maximum line length accepted from the platform service
    pub const MAX_PLATFORM_MESSAGE_SIZE: usize = 1024 * 1024;
}
