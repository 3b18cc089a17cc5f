//! Configuration module for the voice relay server
//!
//! This module handles server configuration from .env files, environment
//! variables and an optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `pricing`: Token rates for realtime models
//!
//! # Example
//! ```rust,no_run
//! use voice_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
pub mod pricing;
mod validation;
mod yaml;

pub use pricing::{
    TokenPricing, get_realtime_pricing, list_realtime_models, realtime_pricing_or_default,
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_CORS_ALLOWED_ORIGINS: &str = "*";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // OpenAI Realtime settings
    pub openai_api_key: String,
    pub openai_model: String,
    /// Base WebSocket URL; the model is appended as a query parameter
    pub openai_realtime_url: String,

    /// Seconds between client liveness probes
    pub heartbeat_interval_secs: u64,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// None means same-origin only
    pub cors_allowed_origins: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("openai_api_key", &"<redacted>")
            .field("openai_model", &self.openai_model)
            .field("openai_realtime_url", &self.openai_realtime_url)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.openai_api_key.zeroize();
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// Unset values fall back to defaults. `.env` is loaded in `main` before this runs.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails
    /// (for example when `OPENAI_API_KEY` is missing).
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let env_config = env::EnvConfig::from_env()?;
        merge::merge_config(env_config, None)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let env_config = env::EnvConfig::from_env()?;
        merge::merge_config(env_config, Some(yaml_config))
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Token rates for the configured model
    pub fn realtime_pricing(&self) -> TokenPricing {
        realtime_pricing_or_default("openai", &self.openai_model)
    }
}
