//! Configuration for the Uplink Proxy server
//!
//! The original deployments hard-coded the upstream base URL and the
//! company/project identifiers per environment; here they are explicit
//! configuration so one binary serves every deployment variant.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// CORS and auth-forwarding behavior
    #[serde(default)]
    pub cors: CorsConfig,

    /// Upstream file-upload REST API
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Bucket backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Where relay identifiers (uploadId, partNumber) come from
    #[serde(default)]
    pub id_extraction: IdExtraction,

    /// Maximum request body size in bytes (caps part uploads)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    /// Log level filter string.
    /// Set via config file or ULP_LOG_LEVEL env var. Overridden by RUST_LOG.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// CORS response headers and auth-forwarding mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Value for Access-Control-Allow-Origin ("*" or a specific origin)
    #[serde(default = "default_cors_origin")]
    pub origin: String,

    /// How client identity reaches the upstream API
    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Name of the user-identifier header forwarded upstream
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

/// Auth forwarding mode for upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Forward only the user-identifier header
    Header,
    /// Forward the user-identifier header and the session cookie
    Cookie,
}

/// Where the relay operation finds uploadId and partNumber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdExtraction {
    /// ?uploadId=...&partNumber=... query parameters
    Query,
    /// /companies/{c}/projects/{p}/file_uploads/{u}/parts/{n} path segments
    Path,
}

/// Upstream file-upload REST API location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the REST API, e.g. "http://localhost:7000/rest/v2.0"
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Company identifier used in upstream URL templates (query mode)
    #[serde(default = "default_scope_id")]
    pub company_id: String,

    /// Project identifier used in upstream URL templates (query mode)
    #[serde(default = "default_scope_id")]
    pub project_id: String,
}

/// Bucket backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory bucket for local development and tests
    Memory,

    /// S3 backend for production use
    S3 {
        /// S3 endpoint URL (for MinIO, LocalStack, or custom S3-compatible services)
        /// If not specified, uses AWS default endpoint
        #[serde(default)]
        endpoint: Option<String>,

        /// AWS region
        #[serde(default = "default_region")]
        region: String,

        /// Use path-style URLs (required for MinIO, LocalStack)
        #[serde(default = "default_force_path_style")]
        force_path_style: bool,

        /// Bucket all objects and multipart uploads live in
        bucket: String,

        /// AWS access key ID
        #[serde(default)]
        access_key_id: Option<String>,

        /// AWS secret access key
        #[serde(default)]
        secret_access_key: Option<String>,
    },
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8787".parse().unwrap()
}

fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_user_header() -> String {
    "x-upload-user-id".to_string()
}

fn default_api_base() -> String {
    "http://localhost:7000/rest/v2.0".to_string()
}

fn default_scope_id() -> String {
    "8".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_force_path_style() -> bool {
    true
}

fn default_max_body_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_log_level() -> String {
    "uplink_proxy=debug,tower_http=debug".to_string()
}

impl Default for AuthMode {
    fn default() -> Self {
        AuthMode::Header
    }
}

impl Default for IdExtraction {
    fn default() -> Self {
        IdExtraction::Query
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: default_cors_origin(),
            auth_mode: AuthMode::default(),
            user_header: default_user_header(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            company_id: default_scope_id(),
            project_id: default_scope_id(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors: CorsConfig::default(),
            upstream: UpstreamConfig::default(),
            backend: BackendConfig::default(),
            id_extraction: IdExtraction::default(),
            max_body_size: default_max_body_size(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("ULP_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }

        if let Ok(origin) = std::env::var("ULP_CORS_ORIGIN") {
            config.cors.origin = origin;
        }
        if let Ok(mode) = std::env::var("ULP_AUTH_MODE") {
            match mode.as_str() {
                "cookie" => config.cors.auth_mode = AuthMode::Cookie,
                "header" => config.cors.auth_mode = AuthMode::Header,
                _ => {}
            }
        }
        if let Ok(header) = std::env::var("ULP_USER_HEADER") {
            config.cors.user_header = header;
        }

        if let Ok(base) = std::env::var("ULP_API_BASE") {
            config.upstream.api_base = base;
        }
        if let Ok(company) = std::env::var("ULP_COMPANY_ID") {
            config.upstream.company_id = company;
        }
        if let Ok(project) = std::env::var("ULP_PROJECT_ID") {
            config.upstream.project_id = project;
        }

        if let Ok(mode) = std::env::var("ULP_ID_EXTRACTION") {
            match mode.as_str() {
                "path" => config.id_extraction = IdExtraction::Path,
                "query" => config.id_extraction = IdExtraction::Query,
                _ => {}
            }
        }

        // Check for S3 backend configuration
        if let Ok(bucket) = std::env::var("ULP_S3_BUCKET") {
            config.backend = BackendConfig::S3 {
                endpoint: std::env::var("ULP_S3_ENDPOINT").ok(),
                region: std::env::var("ULP_S3_REGION").unwrap_or_else(|_| default_region()),
                force_path_style: std::env::var("ULP_S3_PATH_STYLE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                bucket,
                access_key_id: std::env::var("ULP_BE_AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("ULP_BE_AWS_SECRET_ACCESS_KEY").ok(),
            };
        }

        if let Ok(size) = std::env::var("ULP_MAX_BODY_SIZE") {
            if let Ok(parsed) = size.parse() {
                config.max_body_size = parsed;
            }
        }

        // Log level (runtime operational)
        if let Ok(level) = std::env::var("ULP_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load() -> Self {
        // Try config file first
        if let Ok(path) = std::env::var("ULP_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config;
            }
        }

        // Try default config file locations
        for path in &["uplink_proxy.toml", "/etc/uplink_proxy/config.toml"] {
            if std::path::Path::new(path).exists() {
                if let Ok(config) = Self::from_file(path) {
                    return config;
                }
            }
        }

        // Fall back to environment variables
        Self::from_env()
    }

    /// Reject option combinations the CORS spec forbids: credentialed
    /// responses cannot use a wildcard origin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cors.auth_mode == AuthMode::Cookie && self.cors.origin == "*" {
            return Err(ConfigError::Invalid(
                "cookie auth mode requires a specific cors.origin, not \"*\"".to_string(),
            ));
        }
        if self.cors.user_header.is_empty() {
            return Err(ConfigError::Invalid(
                "cors.user_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
