use std::env;
use std::time::Duration;

const DEFAULT_CALL_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Tunables for a realtime session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a remote call waits for its acknowledgement.
    pub call_timeout: Duration,
    /// Outbound queue capacity before drop-oldest eviction kicks in.
    pub outbound_capacity: usize,
}

impl SessionConfig {
    /// Loads overrides from `LEAFWIRE_CALL_TIMEOUT_MS` and
    /// `LEAFWIRE_OUTBOUND_CAPACITY`, falling back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = parse_env("LEAFWIRE_CALL_TIMEOUT_MS") {
            config.call_timeout = Duration::from_millis(ms);
        }
        if let Some(capacity) = parse_env("LEAFWIRE_OUTBOUND_CAPACITY") {
            if capacity > 0 {
                config.outbound_capacity = capacity as usize;
            }
        }
        config
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

fn parse_env(name: &str) -> Option<u64> {
    env::var(name).ok()?.trim().parse().ok()
}
