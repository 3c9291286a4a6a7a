//! Configuration management for the Bookrec Engine
//!
//! Provides strongly-typed configuration with validation, environment variable parsing,
//! and sensible defaults. Supports both development and production environments.
//!
//! # Example
//! ```no_run
//! use bookrec::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Listening on {}:{}", config.api.host, config.api.port);
//! ```

use crate::error::{Error, Result};
use crate::recommendation::{Aggregation, EngineConfig};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,
    /// API server configuration
    pub api: ApiConfig,
    /// Recommendation engine defaults
    pub recommendation: RecommendationConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Enable statement caching
    pub statement_cache_size: usize,
    /// Run pending migrations at startup
    pub run_migrations: bool,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Requests processed at once; further requests wait
    pub max_concurrent_requests: usize,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

/// Recommendation engine defaults. Individual API requests may override them.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationConfig {
    pub content_weight: f64,
    pub collaborative_weight: f64,
    /// Minimum Jaccard similarity for a neighbor
    pub min_similarity: f64,
    pub max_similar_users: usize,
    /// Lowest rating a neighbor must give for the book to count
    pub rating_threshold: u8,
    /// Default number of recommendations returned
    pub result_limit: usize,
    pub aggregation: Aggregation,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            content_weight: engine.content_weight,
            collaborative_weight: engine.collaborative_weight,
            min_similarity: engine.min_similarity,
            max_similar_users: engine.max_similar_users,
            rating_threshold: engine.rating_threshold,
            result_limit: engine.result_limit,
            aggregation: engine.aggregation,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer loading env from a directory of files (FFOLDER) for platforms that mount secrets as files.
        if let Ok(folder) = std::env::var("FFOLDER") {
            load_env_folder(Path::new(&folder));
        } else {
            // Try to load .env file (ignore if not found)
            dotenvy::dotenv().ok();
        }

        let config = Self {
            database: DatabaseConfig::from_env()?,
            api: ApiConfig::from_env()?,
            recommendation: RecommendationConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections < self.database.min_connections {
            return Err(Error::InvalidConfig {
                key: "DB_MAX_CONNECTIONS",
                message: "max_connections must be >= min_connections".into(),
            });
        }

        if self.api.max_concurrent_requests == 0 {
            return Err(Error::InvalidConfig {
                key: "API_MAX_CONCURRENT_REQUESTS",
                message: "must be at least 1".into(),
            });
        }

        if self.recommendation.result_limit == 0 {
            return Err(Error::InvalidConfig {
                key: "REC_RESULT_LIMIT",
                message: "result limit must be at least 1".into(),
            });
        }

        self.recommendation
            .engine_config()
            .validate()
            .map_err(|e| Error::InvalidConfig {
                key: "REC_*",
                message: e.to_string().into(),
            })
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        let rec = &self.recommendation;
        info!("Configuration loaded:");
        info!("  Database:");
        info!("    URL: {}", mask_url(&self.database.url));
        info!(
            "    Pool Size: {}-{}",
            self.database.min_connections, self.database.max_connections
        );
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Recommendations:");
        info!(
            "    Weights: content={} collaborative={}",
            rec.content_weight, rec.collaborative_weight
        );
        info!(
            "    Neighbors: min_similarity={} max={}",
            rec.min_similarity, rec.max_similar_users
        );
        info!(
            "    Rating threshold: {}★, aggregation: {}, limit: {}",
            rec.rating_threshold, rec.aggregation, rec.result_limit
        );
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = get_env("DATABASE_URL").unwrap_or_else(|_| {
            let user = std::env::var("USER").unwrap_or_else(|_| "postgres".to_string());
            format!("postgres://{}@localhost/bookrec_dev", user)
        });

        Ok(Self {
            url,
            max_connections: get_env_or("DB_MAX_CONNECTIONS", "20").parse().unwrap_or(20),
            min_connections: get_env_or("DB_MIN_CONNECTIONS", "2").parse().unwrap_or(2),
            connect_timeout: Duration::from_secs(
                get_env_or("DB_CONNECT_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            idle_timeout: Duration::from_secs(
                get_env_or("DB_IDLE_TIMEOUT_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                get_env_or("DB_MAX_LIFETIME_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            ),
            statement_cache_size: get_env_or("DB_STATEMENT_CACHE_SIZE", "100")
                .parse()
                .unwrap_or(100),
            run_migrations: get_env_or("DB_RUN_MIGRATIONS", "true")
                .parse()
                .unwrap_or(true),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_or("API_PORT", "8080").parse().unwrap_or(8080),
            host: get_env_or("API_HOST", "0.0.0.0"),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            max_concurrent_requests: get_env_or("API_MAX_CONCURRENT_REQUESTS", "512")
                .parse()
                .unwrap_or(512),
            cors_enabled: get_env_or("API_CORS_ENABLED", "true")
                .parse()
                .unwrap_or(true),
            cors_origins: get_env_or("API_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }
}

impl RecommendationConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            content_weight: get_env_parsed_or("REC_CONTENT_WEIGHT", defaults.content_weight)?,
            collaborative_weight: get_env_parsed_or(
                "REC_COLLABORATIVE_WEIGHT",
                defaults.collaborative_weight,
            )?,
            min_similarity: get_env_parsed_or("REC_MIN_SIMILARITY", defaults.min_similarity)?,
            max_similar_users: get_env_parsed_or(
                "REC_MAX_SIMILAR_USERS",
                defaults.max_similar_users,
            )?,
            rating_threshold: get_env_parsed_or("REC_RATING_THRESHOLD", defaults.rating_threshold)?,
            result_limit: get_env_parsed_or("REC_RESULT_LIMIT", defaults.result_limit)?,
            aggregation: get_env_parsed_or("REC_AGGREGATION", defaults.aggregation)?,
        })
    }

    /// Per-call engine parameters built from these defaults
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            content_weight: self.content_weight,
            collaborative_weight: self.collaborative_weight,
            min_similarity: self.min_similarity,
            max_similar_users: self.max_similar_users,
            rating_threshold: self.rating_threshold,
            result_limit: self.result_limit,
            aggregation: self.aggregation,
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Export every regular file in `folder` as an env var named after the file.
/// Variables already present in the environment win.
fn load_env_folder(folder: &Path) {
    if !folder.is_dir() {
        log::warn!("FFOLDER {} is not a directory", folder.display());
        return;
    }

    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("Failed to read FFOLDER {}: {}", folder.display(), err);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if let Ok(contents) = std::fs::read_to_string(&path) {
            if std::env::var(&name).is_err() {
                std::env::set_var(&name, contents.trim());
            }
        }
    }
    log::info!("Loaded configuration from FFOLDER={}", folder.display());
}

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional environment variable; unset falls back to `default`,
/// an unparsable value is a configuration error.
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
        Err(_) => Ok(default),
    }
}

/// Mask the password of a connection URL
fn mask_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at_pos) = url[scheme_end..].find('@').map(|i| i + scheme_end) else {
        return url.to_string();
    };
    match url[scheme_end..at_pos].find(':') {
        Some(colon) => format!("{}****{}", &url[..scheme_end + colon + 1], &url[at_pos..]),
        None => url.to_string(),
    }
}
