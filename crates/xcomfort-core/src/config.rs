// ── Runtime bridge configuration ──
//
// These types describe *how* to reach a bridge. They carry credential
// data and connection tuning, but never touch disk; xcomfort-config (or
// the embedding application) constructs a `BridgeConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;
use xcomfort_api::ClientIdentity;

use crate::error::CoreError;
use crate::model::RctMode;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Allowed setpoint range for one heating preset, in °C.
///
/// Always finite with `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointRange {
    min: f64,
    max: f64,
}

impl SetpointRange {
    pub fn new(min: f64, max: f64) -> Result<Self, CoreError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(CoreError::ValidationFailed {
                message: format!("setpoint range must be finite with min <= max, got {min}..{max}"),
            });
        }
        Ok(Self { min, max })
    }

    const fn fixed(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Setpoint ranges for every heating preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointRanges {
    pub cool: SetpointRange,
    pub eco: SetpointRange,
    pub comfort: SetpointRange,
}

impl SetpointRanges {
    pub fn for_mode(&self, mode: RctMode) -> SetpointRange {
        match mode {
            RctMode::Cool => self.cool,
            RctMode::Eco => self.eco,
            RctMode::Comfort => self.comfort,
        }
    }
}

impl Default for SetpointRanges {
    fn default() -> Self {
        Self {
            cool: SetpointRange::fixed(5.0, 20.0),
            eco: SetpointRange::fixed(10.0, 30.0),
            comfort: SetpointRange::fixed(18.0, 40.0),
        }
    }
}

/// Configuration for connecting to a single bridge.
///
/// Built by the caller, passed to `Bridge` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// WebSocket endpoint (e.g., `ws://192.168.1.20/`).
    pub url: Url,
    /// The bridge's auth key, as printed on the device.
    pub auth_key: SecretString,
    /// How this client introduces itself during the handshake.
    pub client: ClientIdentity,
    /// Pause between a failed connection and the next attempt.
    pub reconnect_delay: Duration,
    pub setpoint_ranges: SetpointRanges,
}

impl BridgeConfig {
    /// Config for the bridge at `address` (host or `host:port`) with defaults
    /// for everything else.
    pub fn new(address: &str, auth_key: SecretString) -> Result<Self, CoreError> {
        Ok(Self {
            url: bridge_url(address)?,
            auth_key,
            client: ClientIdentity::default(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            setpoint_ranges: SetpointRanges::default(),
        })
    }
}

/// `ws://<address>/`, unless `address` already names a scheme.
pub fn bridge_url(address: &str) -> Result<Url, CoreError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(CoreError::Config {
            message: "bridge address is empty".into(),
        });
    }

    let raw = if address.contains("://") {
        address.to_owned()
    } else {
        format!("ws://{address}/")
    };
    Url::parse(&raw).map_err(|e| CoreError::Config {
        message: format!("invalid bridge address '{address}': {e}"),
    })
}
