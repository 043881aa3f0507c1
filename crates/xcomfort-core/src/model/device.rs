// ── Device ──
//
// Closed set of device kinds. Commands that only one kind supports live
// on that kind's type; `Device` itself only offers what every kind has.

use serde_json::Value;

use super::climate::ClimateSensor;
use super::common::{DeviceId, Entity};
use super::heater::{GenericDevice, Heater};
use super::light::Light;
use super::shade::Shade;
use crate::error::DispatchError;

/// `devType` codes that select a dedicated model.
pub mod dev_type {
    pub const SWITCHING_ACTUATOR: i64 = 100;
    pub const DIMMING_ACTUATOR: i64 = 101;
    pub const HEATING_ACTUATOR: i64 = 440;
    pub const RC_TOUCH: i64 = 450;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum DeviceKind {
    Light,
    Shade,
    ClimateSensor,
    Heater,
    Generic,
}

#[derive(Debug)]
pub enum Device {
    Light(Light),
    Shade(Shade),
    ClimateSensor(ClimateSensor),
    Heater(Heater),
    Generic(GenericDevice),
}

impl Device {
    pub fn id(&self) -> DeviceId {
        match self {
            Self::Light(d) => d.id(),
            Self::Shade(d) => d.id(),
            Self::ClimateSensor(d) => d.id(),
            Self::Heater(d) => d.id(),
            Self::Generic(d) => d.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Light(d) => d.name(),
            Self::Shade(d) => d.name(),
            Self::ClimateSensor(d) => d.name(),
            Self::Heater(d) => d.name(),
            Self::Generic(d) => d.name(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Light(_) => DeviceKind::Light,
            Self::Shade(_) => DeviceKind::Shade,
            Self::ClimateSensor(_) => DeviceKind::ClimateSensor,
            Self::Heater(_) => DeviceKind::Heater,
            Self::Generic(_) => DeviceKind::Generic,
        }
    }

    pub fn as_light(&self) -> Option<&Light> {
        match self {
            Self::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_shade(&self) -> Option<&Shade> {
        match self {
            Self::Shade(shade) => Some(shade),
            _ => None,
        }
    }

    pub fn as_climate_sensor(&self) -> Option<&ClimateSensor> {
        match self {
            Self::ClimateSensor(sensor) => Some(sensor),
            _ => None,
        }
    }
}

impl Entity for Device {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        match self {
            Self::Light(d) => d.apply(payload),
            Self::Shade(d) => d.apply(payload),
            Self::ClimateSensor(d) => d.apply(payload),
            Self::Heater(d) => d.apply(payload),
            Self::Generic(d) => d.apply(payload),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Light(d) => d.describe(),
            Self::Shade(d) => d.describe(),
            Self::ClimateSensor(d) => d.describe(),
            Self::Heater(d) => d.describe(),
            Self::Generic(d) => d.describe(),
        }
    }
}
