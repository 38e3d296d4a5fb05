//! `authrelay init` — generate a starter configuration record file.
//!
//! Builds a [`ProxyConfig`] from the flags, validates it the same way the
//! worker validates pushed records, and writes it as YAML, JSON, or TOML.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::config::model::ProxyConfig;
use crate::config::validation;
use crate::error::RelayError;

pub fn execute(args: &InitArgs) -> Result<(), RelayError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("authrelay.{}", args.format.extension())));

    if output.exists() {
        return Err(RelayError::FileExists { path: output });
    }

    let config = build_config(args);
    validation::validate(&config).map_err(|errors| RelayError::ConfigValidation { errors })?;

    let content = serialize_config(&config, &args.format)?;
    std::fs::write(&output, content)?;
    println!("Created {}", output.display());
    Ok(())
}

fn build_config(args: &InitArgs) -> ProxyConfig {
    let mut config = ProxyConfig::new(args.base_url.clone());
    if let Some(ref prefix) = args.proxy_base_url {
        config = config.with_proxy_base_url(prefix.clone());
    }
    if let Some(ref username) = args.username {
        config = config.with_credentials(username.clone(), args.password.as_deref());
    }
    config
}

/// Serialize a record to a formatted string in the given format.
pub fn serialize_config(config: &ProxyConfig, format: &ConfigFormat) -> Result<String, RelayError> {
    match format {
        #[cfg(feature = "yaml")]
        ConfigFormat::Yaml => serde_yml::to_string(config)
            .map_err(|e| RelayError::Io(std::io::Error::other(e.to_string()))),

        #[cfg(not(feature = "yaml"))]
        ConfigFormat::Yaml => Err(RelayError::UnsupportedFormat("yaml".into())),

        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| RelayError::Io(std::io::Error::other(e.to_string()))),

        #[cfg(feature = "toml")]
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| RelayError::Io(std::io::Error::other(e.to_string()))),

        #[cfg(not(feature = "toml"))]
        ConfigFormat::Toml => Err(RelayError::UnsupportedFormat("toml".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(base_url: &str) -> InitArgs {
        InitArgs {
            base_url: base_url.to_string(),
            proxy_base_url: None,
            username: None,
            password: None,
            format: ConfigFormat::Json,
            output: None,
        }
    }

    #[test]
    fn json_uses_camel_case_and_omits_unset_fields() {
        let mut a = args("https://api.internal");
        a.proxy_base_url = Some("/api".into());
        let json = serialize_config(&build_config(&a), &ConfigFormat::Json).unwrap();
        assert!(json.contains("\"baseUrl\": \"https://api.internal\""));
        assert!(json.contains("\"proxyBaseUrl\": \"/api\""));
        assert!(!json.contains("username"));
    }

    #[test]
    fn credentials_are_carried_over() {
        let mut a = args("https://api.internal");
        a.username = Some("svc".into());
        a.password = Some("pw".into());
        let config = build_config(&a);
        assert_eq!(config.username.as_deref(), Some("svc"));
        assert_eq!(config.password.as_deref(), Some("pw"));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("authrelay-init-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("authrelay.json");
        std::fs::write(&path, "{}").unwrap();

        let mut a = args("https://api.internal");
        a.output = Some(path.clone());
        assert!(matches!(execute(&a), Err(RelayError::FileExists { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_record_is_not_written() {
        let dir = std::env::temp_dir().join(format!("authrelay-init-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("authrelay.json");

        let mut a = args("not a url");
        a.output = Some(path.clone());
        assert!(matches!(execute(&a), Err(RelayError::ConfigValidation { .. })));
        assert!(!path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
