//! Layered configuration: `config/default.toml`, overridden by bare
//! environment variables (`DATABASE_URL`, `BIND_ADDR`,
//! `STRICT_MEMORY_CHECK`, ...), overridden last by `TRANSCRIBE__`-prefixed
//! ones, with `.env` loaded first via `dotenvy` in development. Grounded
//! on the teacher's universal `config` + `dotenvy` ambient stack.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    pub database_url: String,

    #[serde(default)]
    pub strict_memory_check: bool,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_queue_soft_reserve")]
    pub queue_soft_reserve: usize,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    #[serde(default = "default_idle_wake_secs")]
    pub idle_wake_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_queue_capacity() -> usize {
    25
}

fn default_queue_soft_reserve() -> usize {
    5
}

fn default_worker_count() -> usize {
    3
}

fn default_task_timeout_secs() -> u64 {
    7200
}

fn default_idle_wake_secs() -> u64 {
    30
}

impl AppConfig {
    /// Loads configuration from `config/default.toml` (if present), then
    /// applies environment overrides. `.env` is loaded first so local
    /// development variables take effect. Bare env vars
    /// (`DATABASE_URL`, `BIND_ADDR`, `STRICT_MEMORY_CHECK`, ...) are read
    /// first; `TRANSCRIBE__`-prefixed ones are applied last and win on
    /// conflict.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::default()
                    .try_parsing(true)
                    .separator("__"),
            )
            .add_source(
                config::Environment::with_prefix("TRANSCRIBE")
                    .try_parsing(true)
                    .separator("__"),
            );

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        assert_eq!(default_bind_addr(), "0.0.0.0:8080");
        assert_eq!(default_queue_capacity(), 25);
        assert_eq!(default_queue_soft_reserve(), 5);
        assert_eq!(default_worker_count(), 3);
        assert_eq!(default_task_timeout_secs(), 7200);
        assert_eq!(default_idle_wake_secs(), 30);
    }

    /// `AppConfig::load` reads process environment variables, which are
    /// global mutable state; `#[serial]` keeps this test from racing
    /// other env-mutating tests in the same binary.
    #[test]
    #[serial_test::serial]
    fn env_override_takes_precedence_over_default() {
        std::env::set_var("TRANSCRIBE__DATABASE_URL", "postgres://example/test");
        std::env::set_var("TRANSCRIBE__WORKER_COUNT", "7");

        let config = AppConfig::load().expect("config should load from env alone");

        assert_eq!(config.database_url, "postgres://example/test");
        assert_eq!(config.worker_count, 7);

        std::env::remove_var("TRANSCRIBE__DATABASE_URL");
        std::env::remove_var("TRANSCRIBE__WORKER_COUNT");
    }

    #[test]
    #[serial_test::serial]
    fn bare_env_vars_are_recognized() {
        std::env::set_var("DATABASE_URL", "postgres://example/bare");
        std::env::set_var("BIND_ADDR", "127.0.0.1:9090");
        std::env::set_var("STRICT_MEMORY_CHECK", "true");

        let config = AppConfig::load().expect("config should load from bare env vars");

        assert_eq!(config.database_url, "postgres://example/bare");
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert!(config.strict_memory_check);

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("BIND_ADDR");
        std::env::remove_var("STRICT_MEMORY_CHECK");
    }

    #[test]
    #[serial_test::serial]
    fn prefixed_env_vars_win_over_bare_ones() {
        std::env::set_var("DATABASE_URL", "postgres://example/bare");
        std::env::set_var("TRANSCRIBE__DATABASE_URL", "postgres://example/prefixed");

        let config = AppConfig::load().expect("config should load");

        assert_eq!(config.database_url, "postgres://example/prefixed");

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("TRANSCRIBE__DATABASE_URL");
    }
}
