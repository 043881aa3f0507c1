// ── Climate sensor ──
//
// Room thermostat touch panel. Readings arrive as an `info` list of
// `{text, value}` pairs keyed by channel code.

use serde_json::Value;

use super::common::{DeviceId, Entity, RawState, as_object, merged, number};
use crate::error::DispatchError;
use crate::store::StatePublisher;
use crate::stream::StateSubscription;

const TEMPERATURE_CHANNEL: &str = "1222";
const HUMIDITY_CHANNEL: &str = "1223";

#[derive(Debug, Clone, PartialEq)]
pub struct ClimateState {
    /// °C
    pub temperature: Option<f64>,
    /// Relative humidity, %.
    pub humidity: Option<f64>,
    pub raw: RawState,
}

#[derive(Debug)]
pub struct ClimateSensor {
    id: DeviceId,
    name: String,
    state: StatePublisher<ClimateState>,
}

impl ClimateSensor {
    pub(crate) fn new(id: DeviceId, name: String) -> Self {
        Self {
            id,
            name,
            state: StatePublisher::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<ClimateState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<ClimateState> {
        self.state.subscribe()
    }
}

/// The value of the `info` entry whose `text` is `channel`.
fn reading(fields: &RawState, channel: &str) -> Option<f64> {
    fields
        .get("info")?
        .as_array()?
        .iter()
        .find(|entry| entry.get("text").and_then(Value::as_str) == Some(channel))
        .and_then(|entry| entry.get("value"))
        .and_then(number)
}

impl Entity for ClimateSensor {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        let fields = as_object(payload, "climate sensor")?;

        let state = self.state.update(|prev| ClimateState {
            temperature: reading(fields, TEMPERATURE_CHANNEL).or(prev.and_then(|p| p.temperature)),
            humidity: reading(fields, HUMIDITY_CHANNEL).or(prev.and_then(|p| p.humidity)),
            raw: merged(prev.map(|p| &p.raw), fields),
        });

        tracing::trace!(
            device_id = self.id,
            temperature = ?state.temperature,
            humidity = ?state.humidity,
            "Climate sensor updated"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("RcTouch({}, \"{}\")", self.id, self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_temperature_and_humidity_channels() {
        let sensor = ClimateSensor::new(17, "Hall".into());
        sensor
            .apply(&json!({
                "deviceId": 17,
                "info": [
                    { "text": "1222", "value": "20.9" },
                    { "text": "1223", "value": "42.5" }
                ]
            }))
            .unwrap();

        let state = sensor.state().unwrap();
        assert_eq!(state.temperature, Some(20.9));
        assert_eq!(state.humidity, Some(42.5));
    }

    #[test]
    fn missing_readings_carry_over() {
        let sensor = ClimateSensor::new(17, "Hall".into());
        sensor
            .apply(&json!({ "info": [{ "text": "1222", "value": 21 }, { "text": "1223", "value": 40 }] }))
            .unwrap();
        sensor
            .apply(&json!({ "info": [{ "text": "1222", "value": "22.5" }] }))
            .unwrap();

        let state = sensor.state().unwrap();
        assert_eq!(state.temperature, Some(22.5));
        assert_eq!(state.humidity, Some(40.0));
    }

    #[test]
    fn unknown_channels_and_garbage_values_are_ignored() {
        let sensor = ClimateSensor::new(3, "Attic".into());
        sensor
            .apply(&json!({ "info": [{ "text": "1109", "value": "1" }, { "text": "1222", "value": "n/a" }] }))
            .unwrap();

        let state = sensor.state().unwrap();
        assert_eq!(state.temperature, None);
        assert_eq!(state.humidity, None);
    }
}
