//! Configuration loading for the partner portal client.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. Environment variables (`NEXT_PUBLIC_API_BASE`, `NEXT_PUBLIC_KEYCLOAK_ISSUER`)
//! 2. `~/.portal/config.toml` (or the path in `PORTAL_CONFIG`)
//! 3. Built-in defaults
//!
//! String values in the file may reference the environment with `${VAR}`.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:3000/api/proxy"
//! timeout_secs = 30
//! max_retries = 3
//! retry_base_delay_ms = 1000
//! guid_lookup_path = "/api/users/lookup"
//!
//! [auth]
//! keycloak_issuer = "${KEYCLOAK_ISSUER}"
//!
//! [session]
//! name = "Ada"
//! email = "ada@example.com"
//! role = "partner"
//! ```

use serde::Deserialize;
use std::{env, path::Path, path::PathBuf, time::Duration};
use thiserror::Error;

pub const API_BASE_ENV: &str = "NEXT_PUBLIC_API_BASE";
pub const KEYCLOAK_ISSUER_ENV: &str = "NEXT_PUBLIC_KEYCLOAK_ISSUER";
pub const CONFIG_PATH_ENV: &str = "PORTAL_CONFIG";

pub const DEFAULT_API_BASE: &str = "http://localhost:3000/api/proxy";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_GUID_LOOKUP_PATH: &str = "/api/users/lookup";

#[derive(Debug, Default, Deserialize)]
pub struct PortalConfig {
    pub api: Option<ApiConfig>,
    pub auth: Option<AuthConfig>,
    /// Fixed session identity for non-interactive use (CLI, jobs).
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Backend proxy and retry settings.
#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub guid_lookup_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    pub keycloak_issuer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Fully resolved settings after applying env overrides and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub base_url: String,
    pub keycloak_issuer: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub guid_lookup_path: String,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("${")
            && let Some(end) = after.find('}')
        {
            let var = &after[..end];
            if !var.is_empty() {
                out.push_str(&env::var(var).unwrap_or_default());
            }
            rest = &after[end + 1..];
            continue;
        }

        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            out.push(ch);
        }
        rest = chars.as_str();
    }

    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn expand_opt(value: Option<&String>) -> Option<String> {
    non_empty(value.map(|v| expand_env_vars(v)))
}

impl PortalConfig {
    /// Load from the default location. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(&self) -> ResolvedSettings {
        self.resolve_with(|key| env::var(key).ok())
    }

    /// Resolve using `lookup` for environment overrides.
    #[must_use]
    pub fn resolve_with<F>(&self, lookup: F) -> ResolvedSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = self.api.as_ref();
        let auth = self.auth.as_ref();

        let base_url = non_empty(lookup(API_BASE_ENV))
            .or_else(|| expand_opt(api.and_then(|a| a.base_url.as_ref())))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let keycloak_issuer = non_empty(lookup(KEYCLOAK_ISSUER_ENV))
            .or_else(|| expand_opt(auth.and_then(|a| a.keycloak_issuer.as_ref())));

        let guid_lookup_path = expand_opt(api.and_then(|a| a.guid_lookup_path.as_ref()))
            .unwrap_or_else(|| DEFAULT_GUID_LOOKUP_PATH.to_string());

        ResolvedSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            keycloak_issuer,
            timeout: Duration::from_secs(
                api.and_then(|a| a.timeout_secs)
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            max_retries: api
                .and_then(|a| a.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_base_delay: Duration::from_millis(
                api.and_then(|a| a.retry_base_delay_ms)
                    .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            ),
            guid_lookup_path,
        }
    }
}

impl SessionConfig {
    /// Session values with `${VAR}` references expanded and blanks dropped.
    #[must_use]
    pub fn expanded(&self) -> Self {
        Self {
            name: expand_opt(self.name.as_ref()),
            email: expand_opt(self.email.as_ref()),
            role: expand_opt(self.role.as_ref()),
            roles: self
                .roles
                .iter()
                .filter_map(|r| expand_opt(Some(r)))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// `PORTAL_CONFIG` if set, otherwise `~/.portal/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = non_empty(env::var(CONFIG_PATH_ENV).ok()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".portal").join("config.toml"))
}
