//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML configuration file without validating it.
pub fn read_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load configuration: optional TOML file, then environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay the deployment environment variables onto `config`.
///
/// `TARGET_URL`, `USE_GOOGLE_JWT`, `WORKFLOW_ID`, `CORS_TARGET` and `PORT`
/// are honoured; empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(target) = var("TARGET_URL") {
        config.upstream.target_url = target;
    }
    if let Some(flag) = var("USE_GOOGLE_JWT") {
        config.upstream.use_google_jwt = flag == "true";
    }
    if let Some(id) = var("WORKFLOW_ID") {
        config.workflow.workflow_id = Some(id);
    }
    if let Some(origin) = var("CORS_TARGET") {
        config.cors.target = Some(origin);
    }
    if let Some(port) = var("PORT").and_then(|p| p.parse::<u16>().ok()) {
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }
}

/// Replace the port of a `host:port` bind address.
pub fn with_port(bind_address: &str, port: u16) -> String {
    let host = bind_address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or("0.0.0.0");
    format!("{}:{}", host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("TARGET_URL", "https://target.example.com"),
                ("USE_GOOGLE_JWT", "true"),
                ("WORKFLOW_ID", "projects/p/locations/l/workflows/w"),
                ("CORS_TARGET", "https://app.example.com"),
                ("PORT", "9000"),
            ]),
        );

        assert_eq!(config.upstream.target_url, "https://target.example.com");
        assert!(config.upstream.use_google_jwt);
        assert_eq!(
            config.workflow.workflow_id.as_deref(),
            Some("projects/p/locations/l/workflows/w")
        );
        assert_eq!(config.cors.target.as_deref(), Some("https://app.example.com"));
        assert_eq!(config.listener.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn test_only_literal_true_enables_jwt() {
        let mut config = GatewayConfig::default();
        config.upstream.use_google_jwt = true;
        apply_env_overrides(&mut config, env(&[("USE_GOOGLE_JWT", "yes")]));
        assert!(!config.upstream.use_google_jwt);
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = GatewayConfig::default();
        config.upstream.target_url = "https://from-file.example.com".into();
        apply_env_overrides(&mut config, env(&[("TARGET_URL", "  ")]));
        assert_eq!(config.upstream.target_url, "https://from-file.example.com");
    }

    #[test]
    fn test_read_config_file() {
        let path = std::env::temp_dir()
            .join(format!("gateway-config-{}.toml", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            concat!(
                "[upstream]\ntarget_url = \"http://127.0.0.1:3000\"\n",
                "[listener]\nbind_address = \"127.0.0.1:8088\"\n",
            ),
        )
        .unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.upstream.target_url, "http://127.0.0.1:3000");
        assert_eq!(config.listener.bind_address, "127.0.0.1:8088");

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_with_port() {
        assert_eq!(with_port("127.0.0.1:8080", 3000), "127.0.0.1:3000");
        assert_eq!(with_port("garbage", 3000), "0.0.0.0:3000");
    }
}
