use dotenvy::dotenv;
use std::{env, fs};
use thiserror::Error;

use crate::policy::{PolicyError, PolicyTable};

pub const DEFAULT_SESSION_COOKIE: &str = "next-auth.session-token";

#[derive(Debug, Clone)]
pub struct Config {
    // Gate
    pub gate_host:      String,
    pub gate_port:      u16,

    // Session
    pub session_secret: String,
    pub session_cookie: String,

    // Upstream application
    pub upstream_url:   String,

    // Policy
    pub policy:         PolicyTable,

    // App
    pub app_env:        String,
    pub app_base_url:   String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Cannot read policy file {0}: {1}")]
    PolicyFile(String, std::io::Error),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let parse_num = |key: &str, default| -> Result<usize, ConfigError> {
            match non_empty(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
                None => Ok(default),
            }
        };

        // No built-in fallback: a gate without a secret must not start.
        let session_secret = non_empty("GATE_SESSION_SECRET")
            .or_else(|| non_empty("NEXTAUTH_SECRET"))
            .ok_or_else(|| ConfigError::MissingVar("GATE_SESSION_SECRET".into()))?;

        let gate_port = parse_num("GATE_PORT", 8080)?;
        let gate_port = u16::try_from(gate_port)
            .map_err(|_| ConfigError::InvalidValue("GATE_PORT".into(), gate_port.to_string()))?;

        let upstream_url = non_empty("UPSTREAM_URL").unwrap_or_else(|| "http://localhost:3000".into());
        let upstream_url = normalize_upstream(&upstream_url)
            .ok_or_else(|| ConfigError::InvalidValue("UPSTREAM_URL".into(), upstream_url.clone()))?;

        let app_base_url = non_empty("APP_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into());
        let app_base_url = url::Url::parse(app_base_url.trim())
            .ok()
            .map(|u| u.origin())
            .filter(|o| o.is_tuple())
            .map(|o| o.ascii_serialization())
            .ok_or_else(|| ConfigError::InvalidValue("APP_BASE_URL".into(), app_base_url.clone()))?;

        let policy = match non_empty("GATE_POLICY_FILE") {
            Some(path) => {
                let raw = fs::read_to_string(&path).map_err(|e| ConfigError::PolicyFile(path, e))?;
                PolicyTable::from_json(&raw)?
            }
            None => PolicyTable::default(),
        };

        Ok(Self {
            gate_host:      non_empty("GATE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            gate_port,

            session_secret,
            session_cookie: non_empty("SESSION_COOKIE").unwrap_or_else(|| DEFAULT_SESSION_COOKIE.into()),

            upstream_url,

            policy,

            app_env:      non_empty("APP_ENV").unwrap_or_else(|| "development".into()),
            app_base_url,
        })
    }
}

/// Accept only absolute http(s) URLs; the trailing slash is dropped so
/// request paths can be appended verbatim.
fn normalize_upstream(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return None;
    }
    Some(url.as_str().trim_end_matches('/').to_string())
}
