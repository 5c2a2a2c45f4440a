use std::net::SocketAddr;
use std::time::Duration;

use promptbatch_dataset::TokenCosts;

use crate::provider::RetryPolicy;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_API_VERSION: &str = "2025-01-01-preview";
const DEFAULT_CHAT_API_VERSION: &str = "2024-05-01-preview";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CHAT_RETRIES: u32 = 3;
const DEFAULT_CHAT_RETRY_DELAY_SECS: u64 = 60;
const DEFAULT_TEST_WORKERS: usize = 10;
const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind: SocketAddr,
    /// `api-version` for file and batch endpoints.
    pub api_version: String,
    /// `api-version` for direct chat completions.
    pub chat_api_version: String,
    pub http_timeout: Duration,
    pub chat_retry: RetryPolicy,
    pub test_workers: usize,
    pub preview_rows: usize,
    pub token_costs: TokenCosts,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            api_version: DEFAULT_API_VERSION.to_string(),
            chat_api_version: DEFAULT_CHAT_API_VERSION.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            chat_retry: RetryPolicy {
                attempts: DEFAULT_CHAT_RETRIES,
                delay: Duration::from_secs(DEFAULT_CHAT_RETRY_DELAY_SECS),
            },
            test_workers: DEFAULT_TEST_WORKERS,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            token_costs: TokenCosts::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |name: &str| var(name).and_then(|v| v.parse::<u64>().ok());
        let parsed_f64 = |name: &str| {
            var(name)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
        };

        let defaults = Self::default();
        let database_url =
            var("DATABASE_URL").ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;

        let bind_raw = var("PROMPTBATCH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid PROMPTBATCH_BIND {bind_raw:?}: {e}"))?;

        Ok(Self {
            database_url,
            bind,
            api_version: var("PROMPTBATCH_API_VERSION").unwrap_or(defaults.api_version),
            chat_api_version: var("PROMPTBATCH_CHAT_API_VERSION")
                .unwrap_or(defaults.chat_api_version),
            http_timeout: Duration::from_secs(
                parsed("PROMPTBATCH_HTTP_TIMEOUT_SECS")
                    .map(|v| v.clamp(5, 3600))
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            chat_retry: RetryPolicy {
                attempts: parsed("PROMPTBATCH_CHAT_RETRIES")
                    .map(|v| v.clamp(1, 10) as u32)
                    .unwrap_or(DEFAULT_CHAT_RETRIES),
                delay: Duration::from_secs(
                    parsed("PROMPTBATCH_CHAT_RETRY_DELAY_SECS")
                        .map(|v| v.min(600))
                        .unwrap_or(DEFAULT_CHAT_RETRY_DELAY_SECS),
                ),
            },
            test_workers: parsed("PROMPTBATCH_TEST_WORKERS")
                .map(|v| v.clamp(1, 64) as usize)
                .unwrap_or(DEFAULT_TEST_WORKERS),
            preview_rows: parsed("PROMPTBATCH_PREVIEW_ROWS")
                .map(|v| v.clamp(1, 1000) as usize)
                .unwrap_or(DEFAULT_PREVIEW_ROWS),
            token_costs: TokenCosts {
                input: parsed_f64("PROMPTBATCH_INPUT_TOKEN_COST")
                    .unwrap_or(defaults.token_costs.input),
                completion: parsed_f64("PROMPTBATCH_COMPLETION_TOKEN_COST")
                    .unwrap_or(defaults.token_costs.completion),
            },
        })
    }
}
