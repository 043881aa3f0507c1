//! Profile configuration for xComfort bridge clients.
//!
//! TOML profiles merged with `XCOMFORT_` environment variables, auth key
//! resolution (env var + plaintext), and translation to
//! `xcomfort_core::BridgeConfig`.

use std::collections::BTreeMap;
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

use xcomfort_core::{BridgeConfig, SetpointRange, SetpointRanges};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' is not configured")]
    UnknownProfile { profile: String },

    #[error("no auth key configured for profile '{profile}'")]
    NoCredentials { profile: String },

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

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    /// Named bridge profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// A named bridge profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Bridge host or `host:port`, or a full `ws://` URL.
    pub address: String,

    /// Auth key (plaintext -- prefer `auth_key_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,

    /// Environment variable name containing the auth key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key_env: Option<String>,

    /// Override the pause between failed connection attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_secs: Option<u64>,

    /// Per-preset setpoint range overrides.
    #[serde(default)]
    pub setpoints: SetpointOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SetpointOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool: Option<RangeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco: Option<RangeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfort: Option<RangeSpec>,
}

/// Inclusive `min..=max`, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RangeSpec {
    pub min: f64,
    pub max: f64,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "xcomfort", "xcomfort").map_or_else(
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
    p.push("xcomfort");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment.
///
/// A missing file is not an error. Environment variables use `__` as the
/// key separator, e.g. `XCOMFORT_PROFILES__HOME__ADDRESS`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.display(), "Loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("XCOMFORT_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Falling back to default config");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Resolve the auth key: the profile's env var first, then plaintext.
pub fn resolve_auth_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.auth_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
        tracing::debug!(env = %env_name, "Auth key variable not set");
    }

    if let Some(ref key) = profile.auth_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Build a `BridgeConfig` from a profile.
pub fn profile_to_bridge_config(profile: &Profile, profile_name: &str) -> Result<BridgeConfig, ConfigError> {
    let auth_key = resolve_auth_key(profile, profile_name)?;
    let mut config = BridgeConfig::new(&profile.address, auth_key).map_err(|e| ConfigError::Validation {
        field: "address".into(),
        reason: e.to_string(),
    })?;

    if let Some(secs) = profile.reconnect_delay_secs {
        config.reconnect_delay = Duration::from_secs(secs);
    }
    config.setpoint_ranges = setpoint_ranges(&profile.setpoints)?;
    Ok(config)
}

fn setpoint_ranges(overrides: &SetpointOverrides) -> Result<SetpointRanges, ConfigError> {
    let defaults = SetpointRanges::default();
    Ok(SetpointRanges {
        cool: range("setpoints.cool", overrides.cool, defaults.cool)?,
        eco: range("setpoints.eco", overrides.eco, defaults.eco)?,
        comfort: range("setpoints.comfort", overrides.comfort, defaults.comfort)?,
    })
}

fn range(field: &str, spec: Option<RangeSpec>, default: SetpointRange) -> Result<SetpointRange, ConfigError> {
    let Some(spec) = spec else {
        return Ok(default);
    };
    SetpointRange::new(spec.min, spec.max).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: e.to_string(),
    })
}
