use std::env;
use std::str::FromStr;

/// Where submissions, problems and solved records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Which execution service evaluations are sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionBackendKind {
    Judge0,
    Echo,
}

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub port: u16,
    pub language_config_path: String,
    pub store_backend: StoreBackend,
    pub problem_seed_path: Option<String>,

    pub execution_backend: ExecutionBackendKind,
    pub execution_api_url: String,
    pub execution_api_key: Option<String>,
    pub execution_api_host: Option<String>,
    pub execution_http_timeout_ms: u64,

    pub watchdog_timeout_ms: u64,
    pub poll_base_delay_ms: u64,
    pub poll_max_delay_ms: u64,
    pub max_poll_errors: u8,
    pub max_dispatch_attempts: u8,
    pub submission_retries: u8,

    pub rate_limit_per_window: u32,
    pub rate_limit_window_secs: u64,
    pub max_in_flight: usize,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            _ => StoreBackend::Redis,
        };
        let execution_backend = match env::var("EXECUTION_BACKEND").as_deref() {
            Ok("echo") => ExecutionBackendKind::Echo,
            _ => ExecutionBackendKind::Judge0,
        };

        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            port: parsed("PORT", 3000),
            language_config_path: env::var("LANGUAGE_CONFIG_PATH")
                .unwrap_or_else(|_| "config/languages.json".to_string()),
            store_backend,
            problem_seed_path: optional("PROBLEM_SEED_PATH"),

            execution_backend,
            execution_api_url: env::var("EXECUTION_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:2358".to_string()),
            execution_api_key: optional("EXECUTION_API_KEY"),
            execution_api_host: optional("EXECUTION_API_HOST"),
            execution_http_timeout_ms: parsed("EXECUTION_HTTP_TIMEOUT_MS", 10_000),

            watchdog_timeout_ms: parsed("WATCHDOG_TIMEOUT_MS", 30_000),
            poll_base_delay_ms: parsed("POLL_BASE_DELAY_MS", 250),
            poll_max_delay_ms: parsed("POLL_MAX_DELAY_MS", 2_000),
            max_poll_errors: parsed("MAX_POLL_ERRORS", 3),
            max_dispatch_attempts: parsed("MAX_DISPATCH_ATTEMPTS", 3),
            submission_retries: parsed("SUBMISSION_RETRIES", 0),

            rate_limit_per_window: parsed("RATE_LIMIT_PER_WINDOW", 10),
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW_SECS", 60),
            max_in_flight: parsed("MAX_IN_FLIGHT", 64),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.watchdog_timeout_ms, 30_000);
        assert_eq!(config.max_poll_errors, 3);
        assert_eq!(config.rate_limit_per_window, 10);
        assert_eq!(config.max_in_flight, 64);
        assert!(config.poll_base_delay_ms <= config.poll_max_delay_ms);
    }

    #[test]
    fn test_parsed_falls_back_on_garbage() {
        env::set_var("ARBITER_TEST_GARBAGE_NUMBER", "not-a-number");
        assert_eq!(parsed("ARBITER_TEST_GARBAGE_NUMBER", 7u32), 7);
        env::remove_var("ARBITER_TEST_GARBAGE_NUMBER");
    }

    #[test]
    fn test_optional_ignores_blank_values() {
        env::set_var("ARBITER_TEST_BLANK_VALUE", "   ");
        assert_eq!(optional("ARBITER_TEST_BLANK_VALUE"), None);
        env::remove_var("ARBITER_TEST_BLANK_VALUE");
    }
}
