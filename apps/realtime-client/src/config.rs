use std::time::Duration;

/// Default realtime endpoint of a locally running helpdesk server.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:5000/realtime";

/// Realtime session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the realtime gateway.
    pub gateway_url: String,
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Number of reconnect attempts before the session gives up and fails.
    pub max_attempts: u32,
    /// How long a handshake may take before it counts as a failed attempt.
    pub handshake_timeout: Duration,
    /// Keep-alive period while connected.
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            base_delay: Duration::from_millis(3000),
            max_attempts: 5,
            handshake_timeout: Duration::from_millis(10_000),
            heartbeat_interval: Duration::from_millis(25_000),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gateway_url: std::env::var("HELPDESK_GATEWAY_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.gateway_url),
            base_delay: millis_var("HELPDESK_RECONNECT_BASE_MS").unwrap_or(defaults.base_delay),
            max_attempts: std::env::var("HELPDESK_RECONNECT_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            handshake_timeout: millis_var("HELPDESK_HANDSHAKE_TIMEOUT_MS")
                .unwrap_or(defaults.handshake_timeout),
            heartbeat_interval: millis_var("HELPDESK_HEARTBEAT_INTERVAL_MS")
                .unwrap_or(defaults.heartbeat_interval),
        }
    }
}

/// Settings for the `desk-watch` binary on top of [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub session: SessionConfig,
    /// Bearer token presented during the handshake.
    pub token: Option<String>,
    /// Ticket whose room is joined after connecting.
    pub ticket_id: Option<i64>,
}

impl WatchConfig {
    pub fn from_env() -> Self {
        Self {
            session: SessionConfig::from_env(),
            token: std::env::var("HELPDESK_TOKEN").ok().filter(|s| !s.is_empty()),
            ticket_id: std::env::var("HELPDESK_TICKET_ID")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

fn millis_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
