//! `authrelay validate` — check a configuration record file for errors.
//!
//! Loads the record the same way the bundled client serves it, then
//! prints which addressing mode it selects under `--mode auto` and
//! whether it injects credentials. Output is text or JSON.

use std::path::Path;

use serde::Serialize;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::model::ProxyConfig;
use crate::config::sources::parse_config_str;
use crate::config::validation;
use crate::error::{RelayError, ValidationError};

/// What a valid record will do once cached.
#[derive(Debug, Serialize)]
struct RecordSummary<'a> {
    valid: bool,
    backend: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    password: bool,
    fingerprint: String,
}

impl<'a> RecordSummary<'a> {
    fn of(config: &'a ProxyConfig) -> Self {
        Self {
            valid: true,
            backend: &config.base_url,
            prefix: config.proxy_base_url.as_deref(),
            mode: if config.proxy_base_url.is_some() {
                "url-rewrite"
            } else {
                "passthrough"
            },
            username: config.username.as_deref(),
            password: config.password.is_some(),
            fingerprint: config.fingerprint(),
        }
    }

    fn render_text(&self, path: &Path) -> String {
        let auth = match (self.username, self.password) {
            (Some(user), true) => format!("basic ({user}, with password)"),
            (Some(user), false) => format!("basic ({user})"),
            (None, _) => "none".to_string(),
        };
        let route = self.prefix.map_or_else(
            || format!("{}*  (credentials only)", self.backend),
            |prefix| format!("{prefix}* -> {}*", self.backend),
        );
        format!(
            "\u{2713} {} is valid\n  routes:      {route}\n  mode:        {}\n  auth:        {auth}\n  fingerprint: {}",
            path.display(),
            self.mode,
            self.fingerprint
        )
    }
}

pub fn execute(args: &ValidateArgs) -> Result<(), RelayError> {
    let config = load(&args.config)?;

    match validation::validate(&config) {
        Ok(()) => {
            let summary = RecordSummary::of(&config);
            match args.format {
                ValidateFormat::Text => println!("{}", summary.render_text(&args.config)),
                ValidateFormat::Json => println!(
                    "{}",
                    serde_json::to_string(&summary)
                        .map_err(|e| RelayError::Io(std::io::Error::other(e.to_string())))?
                ),
            }
            Ok(())
        }
        Err(errors) => {
            report_errors(&args.config, &errors, &args.format);
            Err(RelayError::ConfigValidation { errors })
        }
    }
}

fn load(path: &Path) -> Result<ProxyConfig, RelayError> {
    if !path.exists() {
        return Err(RelayError::ConfigFileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    parse_config_str(ext, &content, &path.display().to_string())
}

fn report_errors(path: &Path, errors: &[ValidationError], format: &ValidateFormat) {
    match format {
        ValidateFormat::Text => {
            eprintln!("\u{2717} {} has {} errors\n", path.display(), errors.len());
            for error in errors {
                eprintln!("{error}");
            }
        }
        ValidateFormat::Json => {
            let fields: Vec<_> = errors
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "field": e.field,
                        "message": e.message,
                        "suggestion": e.suggestion,
                    })
                })
                .collect();
            println!("{}", serde_json::json!({ "valid": false, "errors": fields }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_summary_shows_mode_and_hides_password() {
        let config = ProxyConfig::new("https://a")
            .with_proxy_base_url("/api")
            .with_credentials("svc", Some("hunter2"));
        let text = RecordSummary::of(&config).render_text(Path::new("relay.yaml"));
        assert!(text.contains("url-rewrite"));
        assert!(text.contains("/api* -> https://a*"));
        assert!(text.contains("basic (svc, with password)"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn json_summary_never_carries_the_password() {
        let config = ProxyConfig::new("https://a").with_credentials("svc", Some("hunter2"));
        let json = serde_json::to_value(RecordSummary::of(&config)).unwrap();
        assert_eq!(json["mode"], "passthrough");
        assert_eq!(json["password"], true);
        assert!(json.get("prefix").is_none());
        assert!(!json.to_string().contains("hunter2"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(Path::new("does-not-exist.yaml")).unwrap_err();
        assert!(matches!(err, RelayError::ConfigFileNotFound { .. }));
    }
}
