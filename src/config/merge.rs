use super::env::EnvConfig;
use super::validation;
use super::yaml::YamlConfig;
use super::{
    DEFAULT_CORS_ALLOWED_ORIGINS, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_HOST, DEFAULT_PORT,
    ServerConfig,
};
use crate::core::relay::{DEFAULT_REALTIME_MODEL, OPENAI_REALTIME_URL};

/// Merge environment values with optional YAML overrides, apply defaults and validate.
///
/// Priority: YAML > environment > defaults.
pub fn merge_config(
    env: EnvConfig,
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    let host = server
        .host
        .or(env.host)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.or(env.port).unwrap_or(DEFAULT_PORT);

    let tls = match server.tls {
        Some(tls_yaml) if tls_yaml.enabled == Some(false) => None,
        Some(tls_yaml) => validation::validate_tls_paths(
            tls_yaml.cert_path.or(env.tls_cert_path),
            tls_yaml.key_path.or(env.tls_key_path),
        )?,
        None => validation::validate_tls_paths(env.tls_cert_path, env.tls_key_path)?,
    };

    let openai_api_key = validation::validate_api_key(&openai.api_key.or(env.openai_api_key))?;

    let openai_model = openai
        .model
        .or(env.openai_model)
        .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string());

    let openai_realtime_url = openai
        .url
        .or(env.openai_realtime_url)
        .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string());
    validation::validate_realtime_url(&openai_realtime_url)?;

    let heartbeat_interval_secs = session
        .heartbeat_interval_secs
        .or(env.heartbeat_interval_secs)
        .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS);
    validation::validate_heartbeat_interval(heartbeat_interval_secs)?;

    // An explicitly empty value disables cross-origin access.
    let cors_allowed_origins = match security.cors_allowed_origins.or(env.cors_allowed_origins) {
        Some(origins) if origins.trim().is_empty() => None,
        Some(origins) => Some(origins.trim().to_string()),
        None => Some(DEFAULT_CORS_ALLOWED_ORIGINS.to_string()),
    };

    Ok(ServerConfig {
        host,
        port,
        tls,
        openai_api_key,
        openai_model,
        openai_realtime_url,
        heartbeat_interval_secs,
        cors_allowed_origins,
    })
}
