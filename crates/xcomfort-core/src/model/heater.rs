// ── Heater & generic devices ──
//
// Devices with no specialized fields: the snapshot is the accumulated
// raw payload.

use serde_json::Value;

use super::common::{DeviceId, Entity, RawState, as_object, merged};
use crate::error::DispatchError;
use crate::store::StatePublisher;
use crate::stream::StateSubscription;

#[derive(Debug, Clone, PartialEq)]
pub struct RawDeviceState {
    pub raw: RawState,
}

/// A heating actuator.
#[derive(Debug)]
pub struct Heater {
    id: DeviceId,
    name: String,
    state: StatePublisher<RawDeviceState>,
}

impl Heater {
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

    pub fn state(&self) -> Option<RawDeviceState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<RawDeviceState> {
        self.state.subscribe()
    }
}

impl Entity for Heater {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        accumulate(&self.state, payload, "heater")
    }

    fn describe(&self) -> String {
        format!("Heater({}, \"{}\")", self.id, self.name)
    }
}

/// Any device type without a dedicated model.
#[derive(Debug)]
pub struct GenericDevice {
    id: DeviceId,
    name: String,
    dev_type: Option<i64>,
    state: StatePublisher<RawDeviceState>,
}

impl GenericDevice {
    pub(crate) fn new(id: DeviceId, name: String, dev_type: Option<i64>) -> Self {
        Self {
            id,
            name,
            dev_type,
            state: StatePublisher::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dev_type(&self) -> Option<i64> {
        self.dev_type
    }

    pub fn state(&self) -> Option<RawDeviceState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<RawDeviceState> {
        self.state.subscribe()
    }
}

impl Entity for GenericDevice {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        accumulate(&self.state, payload, "device")
    }

    fn describe(&self) -> String {
        match self.dev_type {
            Some(t) => format!("Device({}, \"{}\", devType: {t})", self.id, self.name),
            None => format!("Device({}, \"{}\")", self.id, self.name),
        }
    }
}

fn accumulate(
    state: &StatePublisher<RawDeviceState>,
    payload: &Value,
    kind: &'static str,
) -> Result<(), DispatchError> {
    let fields = as_object(payload, kind)?;
    state.update(|prev| RawDeviceState {
        raw: merged(prev.map(|p| &p.raw), fields),
    });
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heater_accumulates_partial_payloads() {
        let heater = Heater::new(5, "Floor".into());
        heater.apply(&json!({ "power": 1.5, "info": [] })).unwrap();
        heater.apply(&json!({ "power": 0 })).unwrap();

        let raw = heater.state().unwrap().raw;
        assert_eq!(raw.get("power"), Some(&json!(0)));
        assert_eq!(raw.get("info"), Some(&json!([])));
    }

    #[test]
    fn generic_device_describes_its_type() {
        let device = GenericDevice::new(8, "Button".into(), Some(220));
        assert_eq!(device.describe(), "Device(8, \"Button\", devType: 220)");
        assert!(device.apply(&json!("on")).is_err());
    }
}
