use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use anyhow::Context;

pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.replicate.com/v1";
pub const DEFAULT_REMOTE_MODEL: &str = "cuuupid/idm-vton";

/// Values people leave in `.env` templates instead of a real token
const PLACEHOLDER_TOKENS: [&str; 5] = ["your_token_here", "your-api-token", "changeme", "xxx", "<token>"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub storage_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub api_token: Option<String>,
    pub remote_endpoint: String,
    pub remote_model: String,
    pub remote_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_outputs: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            storage_dir: PathBuf::from("outputs/results"),
            upload_dir: PathBuf::from("outputs/uploads"),
            assets_dir: PathBuf::from("assets/garments"),
            api_token: None,
            remote_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            remote_model: DEFAULT_REMOTE_MODEL.to_string(),
            remote_timeout: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(30),
            max_outputs: 4,
        }
    }
}

impl AppConfig {
    /// Load from the environment, reading `.env` first when present
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(e).context("Failed to read .env file");
            }
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            port: parse_or(&var, "VTO_PORT", defaults.port)?,
            storage_dir: var("VTO_STORAGE_DIR").map(PathBuf::from).unwrap_or(defaults.storage_dir),
            upload_dir: var("VTO_UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            assets_dir: var("VTO_ASSETS_DIR").map(PathBuf::from).unwrap_or(defaults.assets_dir),
            api_token: var("VTO_API_TOKEN"),
            remote_endpoint: var("VTO_REMOTE_ENDPOINT").unwrap_or(defaults.remote_endpoint),
            remote_model: var("VTO_REMOTE_MODEL").unwrap_or(defaults.remote_model),
            remote_timeout: Duration::from_secs(parse_or(&var, "VTO_REMOTE_TIMEOUT_SECS", 120)?),
            fetch_timeout: Duration::from_secs(parse_or(&var, "VTO_FETCH_TIMEOUT_SECS", 30)?),
            max_outputs: parse_or(&var, "VTO_MAX_OUTPUTS", defaults.max_outputs)?.max(1),
        })
    }

    /// Whether a remote backend credential is configured at all
    pub fn has_remote_credential(&self) -> bool {
        self.api_token.is_some()
    }
}

fn parse_or<T: FromStr>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T> {
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

/// A credential is usable when it is non-empty, has no whitespace and isn't a template value
pub fn credential_is_usable(token: &str) -> bool {
    !token.is_empty()
        && !token.chars().any(char::is_whitespace)
        && !PLACEHOLDER_TOKENS.iter().any(|p| token.eq_ignore_ascii_case(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.max_outputs, 4);
        assert!(!config.has_remote_credential());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("VTO_PORT", "9000"),
            ("VTO_API_TOKEN", " r8_abc "),
            ("VTO_REMOTE_TIMEOUT_SECS", "10"),
            ("VTO_STORAGE_DIR", "/tmp/results"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.api_token.as_deref(), Some("r8_abc"));
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/results"));
    }

    #[test]
    fn test_blank_token_is_absent() {
        let config = config(&[("VTO_API_TOKEN", "   ")]).unwrap();
        assert!(!config.has_remote_credential());
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let err = config(&[("VTO_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("VTO_PORT"));
    }

    #[test]
    fn test_credential_usability() {
        assert!(credential_is_usable("r8_0123456789"));
        assert!(!credential_is_usable(""));
        assert!(!credential_is_usable("r8 abc"));
        assert!(!credential_is_usable("YOUR_TOKEN_HERE"));
    }
}
