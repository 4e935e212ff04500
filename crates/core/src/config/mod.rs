//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SAFENEST_*)
//! 2. TOML config file (if SAFENEST_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::Partition;

mod validation;

pub use validation::ConfigError;

/// Versioned names of the three cache partitions.
///
/// Bumping a version suffix is the only signal activation uses to decide
/// which partitions are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    /// Pre-cached static assets (manifest) and runtime script/style/image hits.
    #[serde(default = "default_static_cache")]
    pub static_cache: String,

    /// API responses under the API prefix.
    #[serde(default = "default_api_cache")]
    pub api_cache: String,

    /// HTML documents and everything else.
    #[serde(default = "default_general_cache")]
    pub general_cache: String,
}

fn default_static_cache() -> String {
    "safenest-static-v1.0.0".into()
}

fn default_api_cache() -> String {
    "safenest-api-v1.0.0".into()
}

fn default_general_cache() -> String {
    "safenest-v1.0.0".into()
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            static_cache: default_static_cache(),
            api_cache: default_api_cache(),
            general_cache: default_general_cache(),
        }
    }
}

impl CacheNames {
    /// Name of the current version of a partition.
    pub fn name(&self, partition: Partition) -> &str {
        match partition {
            Partition::Static => &self.static_cache,
            Partition::Api => &self.api_cache,
            Partition::General => &self.general_cache,
        }
    }

    /// All current partition names.
    pub fn all(&self) -> [&str; 3] {
        [&self.static_cache, &self.api_cache, &self.general_cache]
    }

    /// Whether `name` is one of the current partition names.
    pub fn is_current(&self, name: &str) -> bool {
        self.all().contains(&name)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SAFENEST_*)
/// 2. TOML config file (if SAFENEST_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via SAFENEST_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the dashboard is served from; manifest paths resolve against it.
    ///
    /// Set via SAFENEST_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SAFENEST_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via SAFENEST_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via SAFENEST_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Path prefix of the API namespace.
    ///
    /// Set via SAFENEST_API_PREFIX environment variable.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Partition names; set via SAFENEST_CACHES__STATIC_CACHE and friends.
    #[serde(default)]
    pub caches: CacheNames,

    /// Paths pre-cached into the static partition at install.
    ///
    /// Set via SAFENEST_STATIC_MANIFEST environment variable (`[a, b]`).
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,

    /// Human-readable message of the synthesized offline API response.
    ///
    /// Set via SAFENEST_OFFLINE_MESSAGE environment variable.
    #[serde(default = "default_offline_message")]
    pub offline_message: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./safenest-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8000".into()
}

fn default_user_agent() -> String {
    "safenest-sw/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_api_prefix() -> String {
    "/api/".into()
}

fn default_static_manifest() -> Vec<String> {
    [
        "/",
        "/static/css/style.css",
        "/static/css/responsive.css",
        "/static/js/main.js",
        "/static/js/mobile.js",
        "/static/images/logo.png",
        "/templates/base.html",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_offline_message() -> String {
    "You are currently offline. Please check your connection and try again.".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            api_prefix: default_api_prefix(),
            caches: CacheNames::default(),
            static_manifest: default_static_manifest(),
            offline_message: default_offline_message(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SAFENEST_`
    /// 2. TOML file from `SAFENEST_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SAFENEST_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SAFENEST_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./safenest-cache.sqlite"));
        assert_eq!(config.origin, "http://localhost:8000");
        assert_eq!(config.user_agent, "safenest-sw/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.api_prefix, "/api/");
        assert_eq!(config.caches.static_cache, "safenest-static-v1.0.0");
        assert_eq!(config.caches.api_cache, "safenest-api-v1.0.0");
        assert_eq!(config.caches.general_cache, "safenest-v1.0.0");
        assert!(config.static_manifest.contains(&"/".to_string()));
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_cache_names_lookup() {
        let names = CacheNames::default();
        assert_eq!(names.name(Partition::Static), "safenest-static-v1.0.0");
        assert_eq!(names.name(Partition::Api), "safenest-api-v1.0.0");
        assert_eq!(names.name(Partition::General), "safenest-v1.0.0");
        assert!(names.is_current("safenest-api-v1.0.0"));
        assert!(!names.is_current("safenest-api-v0.9.0"));
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let toml = r#"
            origin = "https://home.example.com"
            static_manifest = ["/", "/app.css"]

            [caches]
            static_cache = "safenest-static-v2.0.0"
        "#;
        let figment = Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(toml));
        let config = AppConfig::from_figment(figment).unwrap();

        assert_eq!(config.origin, "https://home.example.com");
        assert_eq!(config.static_manifest, vec!["/".to_string(), "/app.css".to_string()]);
        assert_eq!(config.caches.static_cache, "safenest-static-v2.0.0");
        assert_eq!(config.caches.api_cache, "safenest-api-v1.0.0");
    }

    #[test]
    fn test_invalid_layer_is_rejected() {
        let figment =
            Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::string(r#"api_prefix = "api""#));
        let result = AppConfig::from_figment(figment);
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "api_prefix"));
    }
}
