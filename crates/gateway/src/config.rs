//! Gateway runtime configuration.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved configuration, threaded through the server, sweeper, and
/// shutdown coordinator at construction time.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address, e.g. `0.0.0.0`.
    pub bind: String,
    pub port: u16,
    /// Hard cap on accepted request bodies, in bytes.
    pub max_body_bytes: usize,
    /// Idle duration after which a session is eligible for eviction.
    pub session_ttl: Duration,
    /// How often the expiry sweeper scans the registry.
    pub sweep_interval: Duration,
    /// Upper bound on shutdown draining before the process is forced out.
    pub drain_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
