use std::path::PathBuf;

use url::Url;

use super::TlsConfig;

/// The upstream API key must be present and non-blank.
pub fn validate_api_key(api_key: &Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(key.clone()),
        _ => Err("OPENAI_API_KEY is required (set the environment variable or openai.api_key in YAML)".into()),
    }
}

/// The realtime URL must parse and use a WebSocket scheme.
pub fn validate_realtime_url(raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid OpenAI realtime URL '{raw}': {e}"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!(
            "Invalid OpenAI realtime URL '{raw}': scheme must be ws or wss, got '{other}'"
        )
        .into()),
    }
}

pub fn validate_heartbeat_interval(secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    if secs == 0 {
        return Err("Heartbeat interval must be greater than 0 seconds".into());
    }
    Ok(())
}

/// TLS needs both a certificate and a key; one without the other is an error.
pub fn validate_tls_paths(
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<TlsConfig>, Box<dyn std::error::Error>> {
    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err("TLS certificate path is set but the key path is missing".into()),
        (None, Some(_)) => Err("TLS key path is set but the certificate path is missing".into()),
    }
}
