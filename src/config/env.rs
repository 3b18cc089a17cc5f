use std::env;
use std::str::FromStr;

/// Raw values read from the process environment.
///
/// `None` means the variable is unset. Parsing is done here; defaults and
/// validation happen when merging.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub openai_realtime_url: Option<String>,
    pub heartbeat_interval_secs: Option<u64>,
    /// Kept verbatim (an empty value is meaningful: same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl EnvConfig {
    /// Read all supported variables.
    ///
    /// # Errors
    /// Returns an error if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: non_empty("HOST"),
            port: parse_var("PORT")?,
            tls_cert_path: non_empty("TLS_CERT_PATH"),
            tls_key_path: non_empty("TLS_KEY_PATH"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: non_empty("OPENAI_REALTIME_MODEL"),
            openai_realtime_url: non_empty("OPENAI_REALTIME_URL"),
            heartbeat_interval_secs: parse_var("HEARTBEAT_INTERVAL_SECS")?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
        })
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name} '{raw}': {e}").into()),
        None => Ok(None),
    }
}
