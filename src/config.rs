use std::time::Duration;

/// Engine tunables.
///
/// Every knob has a sane default; the environment can override the ones
/// that matter for deployment without touching code.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Address the server binds when constructed from a config.
    pub listen_addr: String,
    /// Maximum number of read buffers kept for reuse.
    pub pool_capacity: usize,
    /// Size of each pooled read buffer in bytes.
    pub buffer_size: usize,
    /// How long a single accept attempt may block before the loop
    /// re-checks the stop signal.
    pub accept_deadline: Duration,
    /// Grace period granted to an in-flight read once shutdown begins.
    pub read_grace: Duration,
}

impl EngineConfig {
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("WEIR_LISTEN")
                .unwrap_or(defaults.listen_addr),
            pool_capacity: env_usize("WEIR_POOL_CAPACITY", defaults.pool_capacity),
            buffer_size: env_usize("WEIR_BUFFER_SIZE", defaults.buffer_size),
            accept_deadline: defaults.accept_deadline,
            read_grace: defaults.read_grace,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            pool_capacity: 100,
            buffer_size: 8192,
            accept_deadline: Duration::from_secs(3),
            read_grace: Duration::from_secs(3),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
