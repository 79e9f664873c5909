//! Shared configuration for Stockroom tools.
//!
//! TOML profiles, API token resolution (env + plaintext), and translation
//! to `stockroom_core::CatalogConfig`. The core never reads config files;
//! everything it needs arrives through that struct.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::{CatalogConfig, PreferencesLocation, TlsVerification};

/// Prefix for environment overrides, e.g.
/// `STOCKROOM_PROFILES__STAGING__API_URL`.
pub const ENV_PREFIX: &str = "STOCKROOM_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("environment variable {var} named by profile '{profile}' is not set")]
    MissingTokenEnv { profile: String, var: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `-p` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick the profile to use: the explicit name, then `default_profile`,
    /// then `"default"`.
    pub fn profile(&self, explicit: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = explicit
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    /// `table` or `json`.
    #[serde(default = "default_output")]
    pub output: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Backend base URL (e.g., "https://admin.shop.test").
    pub api_url: String,

    /// Push endpoint. Derived from `api_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,

    /// Bearer token (plaintext; prefer `api_token_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token_env: Option<String>,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Accept invalid certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Overrides `defaults.timeout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Where preference records are written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences_dir: Option<PathBuf>,

    /// Periodic full refetch while watching. Off when absent or 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_interval_secs: Option<u64>,
}

impl Profile {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "stockroom", "stockroom")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("stockroom");
    p
}

/// Default preferences directory for a profile, if the platform has a
/// data dir.
pub fn default_preferences_dir(profile_name: &str) -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("preferences").join(profile_name))
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is not an
/// error; the defaults apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: `api_token_env` first, then plaintext.
/// `Ok(None)` when the profile configures neither.
pub fn resolve_api_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<SecretString>, ConfigError> {
    if let Some(ref var) = profile.api_token_env {
        return match std::env::var(var) {
            Ok(val) if !val.is_empty() => Ok(Some(SecretString::from(val))),
            _ => Err(ConfigError::MissingTokenEnv {
                profile: profile_name.into(),
                var: var.clone(),
            }),
        };
    }

    Ok(profile.api_token.clone().map(SecretString::from))
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `CatalogConfig` from a profile.
pub fn profile_to_catalog_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CatalogConfig, ConfigError> {
    let api_url = parse_url("api_url", &profile.api_url)?;
    let ws_url = profile
        .ws_url
        .as_deref()
        .map(|raw| parse_url("ws_url", raw))
        .transpose()?;

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let preferences = profile
        .preferences_dir
        .clone()
        .or_else(|| default_preferences_dir(profile_name))
        .map_or(PreferencesLocation::Memory, PreferencesLocation::Directory);

    let mut config = CatalogConfig::new(api_url);
    config.ws_url = ws_url;
    config.api_token = resolve_api_token(profile, profile_name)?;
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.preferences = preferences;
    config.reconcile_interval = profile
        .reconcile_interval_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    Ok(config)
}

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL {raw:?}: {e}"),
    })
}
