//! Resolver configuration

use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_DEPTH: usize = 64;
const DEFAULT_PAGE_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// Tuning knobs for reference resolution and pagination
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound on a single resource or page read
    pub fetch_timeout: Duration,
    /// How many fetched resources deep the walker follows references
    pub max_depth: usize,
    /// Extra attempts for a page fetch that failed transiently
    pub page_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_depth: DEFAULT_MAX_DEPTH,
            page_retries: DEFAULT_PAGE_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl ResolverConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(env_or(
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            max_depth: env_or("MAX_REFERENCE_DEPTH", DEFAULT_MAX_DEPTH),
            page_retries: env_or("PAGE_RETRIES", DEFAULT_PAGE_RETRIES),
            retry_backoff: Duration::from_millis(env_or(
                "PAGE_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )),
        }
    }
}

/// Read and parse an environment variable, falling back to `default`
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}
