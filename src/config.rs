//! Configuration Module
//!
//! Handles loading and managing service configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use directories::ProjectDirs;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding one file per cached result set
    pub cache_dir: PathBuf,
    /// Lifetime in seconds of a cached result set
    pub cache_ttl: u64,
    /// Page size requested from the upstream
    pub items_per_page: u32,
    /// Highest page number a stream will request
    pub max_page_limit: u32,
    /// HTTP server port
    pub server_port: u16,
    /// Expired-entry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Upstream catalog endpoint
    pub upstream_url: String,
    /// Optional API key sent as the `key` query parameter
    pub upstream_api_key: Option<String>,
    /// Upstream request timeout in seconds
    pub request_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache directory (default: platform cache dir)
    /// - `CACHE_TTL` - Cached set lifetime in seconds (default: 600)
    /// - `ITEMS_PER_PAGE` - Upstream page size (default: 20)
    /// - `MAX_PAGE_LIMIT` - Page ceiling per stream (default: 50)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 300)
    /// - `UPSTREAM_URL` - Catalog endpoint (default: http://127.0.0.1:8080/games)
    /// - `UPSTREAM_API_KEY` - Upstream API key (default: none)
    /// - `REQUEST_TIMEOUT` - Upstream timeout in seconds (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var_os("CACHE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_ttl: parse_var("CACHE_TTL").unwrap_or(defaults.cache_ttl),
            items_per_page: parse_var("ITEMS_PER_PAGE").unwrap_or(defaults.items_per_page),
            max_page_limit: parse_var("MAX_PAGE_LIMIT").unwrap_or(defaults.max_page_limit),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            upstream_url: env::var("UPSTREAM_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.upstream_url),
            upstream_api_key: env::var("UPSTREAM_API_KEY").ok().filter(|v| !v.is_empty()),
            request_timeout: parse_var("REQUEST_TIMEOUT").unwrap_or(defaults.request_timeout),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Platform cache directory, falling back to a local hidden directory.
fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "catalog_feed")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".catalog_feed_cache"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            cache_ttl: 600,
            items_per_page: 20,
            max_page_limit: 50,
            server_port: 3000,
            cleanup_interval: 300,
            upstream_url: "http://127.0.0.1:8080/games".to_string(),
            upstream_api_key: None,
            request_timeout: 10,
        }
    }
}
