use std::env;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // HTTP server
    pub bind_addr: String,

    // Status codes: optional JSON file overriding the built-in table
    pub status_code_file: Option<String>,

    // Stale-panic sweep
    pub panic_stale_after_secs: u64,
    pub panic_sweep_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            status_code_file: env::var("STATUS_CODE_FILE").ok(),
            panic_stale_after_secs: env_u64("PANIC_STALE_AFTER_SECS", 120),
            panic_sweep_interval_secs: env_u64("PANIC_SWEEP_INTERVAL_SECS", 30),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number")),
        Err(_) => default,
    }
}
