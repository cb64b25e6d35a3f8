//! Server configuration

use fhir_graph_resolver::ResolverConfig;
use fhir_graph_resolver::config::env_or;

/// Server configuration loaded from environment variables
pub struct Config {
    pub bind_address: String,
    pub cors_origins: Vec<String>,
    /// Upper bound on pages loaded when a fetch asks to follow `next` links
    pub max_follow_pages: usize,
    pub resolver: ResolverConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            max_follow_pages: env_or("MAX_FOLLOW_PAGES", 10),
            resolver: ResolverConfig::from_env(),
        }
    }
}
