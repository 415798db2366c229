use std::path::PathBuf;
use std::str::FromStr;

use triage_core::policy::{AuthorizationMode, LocalsPolicy};

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("{key} has an invalid value `{value}`: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Settings every request pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Where unauthorized requests are redirected.
    pub signin_path: String,
    pub authorization_mode: AuthorizationMode,
    pub locals_policy: LocalsPolicy,
    /// Abort loading on the first invalid route instead of skipping it.
    pub strict_load: bool,
    pub body_limit_bytes: usize,
    /// Session fields defaulted into every render payload.
    pub session_defaults: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            signin_path: "/user".into(),
            authorization_mode: AuthorizationMode::default(),
            locals_policy: LocalsPolicy::default(),
            strict_load: true,
            body_limit_bytes: 2 * 1024 * 1024,
            session_defaults: vec!["email".into()],
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Root reported to route discovery (default: `routes`).
    pub routes_dir: PathBuf,
    /// Optional JSON file with per-route configuration.
    pub route_config: Option<PathBuf>,
    pub pipeline: PipelineSettings,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `HOST`                 | `0.0.0.0`  |
    /// | `PORT`                 | `3000`     |
    /// | `REQUEST_TIMEOUT_SECS` | `30`       |
    /// | `ROUTES_DIR`           | `routes`   |
    /// | `ROUTE_CONFIG`         | unset      |
    /// | `SIGNIN_PATH`          | `/user`    |
    /// | `AUTHORIZATION_MODE`   | `required` |
    /// | `LOCALS_POLICY`        | `merge`    |
    /// | `STRICT_ROUTE_LOADING` | `true`     |
    /// | `MAX_BODY_BYTES`       | `2097152`  |
    /// | `SESSION_DEFAULTS`     | `email`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PipelineSettings::default();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_env("PORT", 3000u16)?;
        let request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", 30u64)?;
        let routes_dir = std::env::var("ROUTES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("routes"));
        let route_config = std::env::var("ROUTE_CONFIG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let signin_path = std::env::var("SIGNIN_PATH").unwrap_or(defaults.signin_path);
        if !signin_path.starts_with('/') {
            return Err(ConfigError {
                key: "SIGNIN_PATH",
                value: signin_path,
                reason: "must start with `/`".into(),
            });
        }

        let session_defaults = match std::env::var("SESSION_DEFAULTS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.session_defaults,
        };

        let pipeline = PipelineSettings {
            signin_path,
            authorization_mode: parse_env("AUTHORIZATION_MODE", defaults.authorization_mode)?,
            locals_policy: parse_env("LOCALS_POLICY", defaults.locals_policy)?,
            strict_load: parse_env("STRICT_ROUTE_LOADING", defaults.strict_load)?,
            body_limit_bytes: parse_env("MAX_BODY_BYTES", defaults.body_limit_bytes)?,
            session_defaults,
        };

        Ok(Self {
            host,
            port,
            request_timeout_secs,
            routes_dir,
            route_config,
            pipeline,
        })
    }
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            reason: e.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
