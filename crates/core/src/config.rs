use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parsed<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub delivery: DeliveryConfig,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RECORDHOOK_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RECORDHOOK_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            delivery: DeliveryConfig::from_env_profiled(p),
            dispatch: DispatchConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:    {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  postgres:  host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!(
            "  delivery:  timeout={}s, attempts={}, concurrency={}, queue={}",
            self.delivery.timeout_secs,
            self.delivery.max_attempts,
            self.delivery.max_concurrency,
            self.delivery.queue_capacity
        );
        tracing::info!(
            "  dispatch:  event_queue={}, diagnostics_per_rule={}",
            self.dispatch.event_queue_capacity,
            self.dispatch.diagnostics_per_rule
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parsed(p, "PORT", 3080),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parsed(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "recordhook"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parsed(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Webhook delivery ──────────────────────────────────────────

/// Outbound webhook delivery settings shared by the worker pool and the tester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Per-attempt HTTP timeout.
    pub timeout_secs: u64,
    /// Total attempts per job, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Upper bound applied to a remote `Retry-After`.
    pub max_retry_after_secs: u64,
    /// Concurrent outbound requests across all jobs.
    pub max_concurrency: usize,
    /// Jobs allowed to be running (in flight or waiting to retry) at once.
    pub max_in_flight_jobs: usize,
    pub queue_capacity: usize,
    pub response_excerpt_bytes: usize,
}

impl DeliveryConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: profiled_env_parsed(p, "DELIVERY_TIMEOUT_SECS", defaults.timeout_secs),
            max_attempts: profiled_env_parsed(p, "DELIVERY_MAX_ATTEMPTS", defaults.max_attempts),
            backoff_base_ms: profiled_env_parsed(
                p,
                "DELIVERY_BACKOFF_BASE_MS",
                defaults.backoff_base_ms,
            ),
            backoff_cap_ms: profiled_env_parsed(p, "DELIVERY_BACKOFF_CAP_MS", defaults.backoff_cap_ms),
            max_retry_after_secs: profiled_env_parsed(
                p,
                "DELIVERY_MAX_RETRY_AFTER_SECS",
                defaults.max_retry_after_secs,
            ),
            max_concurrency: profiled_env_parsed(
                p,
                "DELIVERY_MAX_CONCURRENCY",
                defaults.max_concurrency,
            ),
            max_in_flight_jobs: profiled_env_parsed(
                p,
                "DELIVERY_MAX_IN_FLIGHT_JOBS",
                defaults.max_in_flight_jobs,
            ),
            queue_capacity: profiled_env_parsed(p, "DELIVERY_QUEUE_CAPACITY", defaults.queue_capacity),
            response_excerpt_bytes: profiled_env_parsed(
                p,
                "DELIVERY_RESPONSE_EXCERPT_BYTES",
                defaults.response_excerpt_bytes,
            ),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 30_000,
            max_retry_after_secs: 120,
            max_concurrency: 16,
            max_in_flight_jobs: 256,
            queue_capacity: 10_000,
            response_excerpt_bytes: 1024,
        }
    }
}

// ── Trigger dispatch ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of the record-event channel between storage and dispatcher.
    pub event_queue_capacity: usize,
    /// Diagnostics kept per rule before the oldest are evicted.
    pub diagnostics_per_rule: usize,
}

impl DispatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            event_queue_capacity: profiled_env_parsed(
                p,
                "EVENT_QUEUE_CAPACITY",
                defaults.event_queue_capacity,
            ),
            diagnostics_per_rule: profiled_env_parsed(
                p,
                "DIAGNOSTICS_PER_RULE",
                defaults.diagnostics_per_rule,
            ),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 1024,
            diagnostics_per_rule: 200,
        }
    }
}
