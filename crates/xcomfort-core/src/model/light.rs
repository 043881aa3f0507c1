// ── Light ──

use std::sync::Arc;

use serde_json::{Value, json};
use xcomfort_api::MessageType;

use super::common::{DeviceId, Entity, RawState, as_object, flag, integer, merged};
use crate::command::CommandSink;
use crate::error::{CoreError, DispatchError};
use crate::store::StatePublisher;
use crate::stream::StateSubscription;

/// Brightness a light is assumed to have before the bridge reports one.
pub const DEFAULT_DIMM_VALUE: u8 = 99;
pub const MAX_DIMM_VALUE: u8 = 99;

#[derive(Debug, Clone, PartialEq)]
pub struct LightState {
    pub switch: bool,
    pub dimm_value: u8,
    pub raw: RawState,
}

/// A switching or dimming actuator.
pub struct Light {
    id: DeviceId,
    name: String,
    dimmable: bool,
    state: StatePublisher<LightState>,
    sink: Arc<dyn CommandSink>,
}

impl Light {
    pub(crate) fn new(id: DeviceId, name: String, dimmable: bool, sink: Arc<dyn CommandSink>) -> Self {
        Self {
            id,
            name,
            dimmable,
            state: StatePublisher::new(),
            sink,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dimmable(&self) -> bool {
        self.dimmable
    }

    pub fn state(&self) -> Option<LightState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<LightState> {
        self.state.subscribe()
    }

    pub async fn switch(&self, on: bool) -> Result<(), CoreError> {
        self.sink
            .send_message(
                MessageType::ActionSwitchDevice,
                json!({ "deviceId": self.id, "switch": on }),
            )
            .await
    }

    /// Set brightness, clamped to 0–99.
    pub async fn dimm(&self, value: i32) -> Result<(), CoreError> {
        if !self.dimmable {
            return Err(CoreError::unsupported("dimm", "a dimmable light"));
        }
        let value = value.clamp(0, i32::from(MAX_DIMM_VALUE));
        self.sink
            .send_message(
                MessageType::ActionSlideDevice,
                json!({ "deviceId": self.id, "dimmvalue": value }),
            )
            .await
    }
}

impl Entity for Light {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        let fields = as_object(payload, "light")?;
        let dimmable = self.dimmable;

        let state = self.state.update(|prev| {
            let switch = fields
                .get("switch")
                .and_then(flag)
                .or(prev.map(|p| p.switch))
                .unwrap_or(false);

            let reported = if dimmable && switch {
                fields.get("dimmvalue").and_then(integer).map(clamp_dimm)
            } else {
                None
            };
            let dimm_value = reported
                .or(prev.map(|p| p.dimm_value))
                .unwrap_or(DEFAULT_DIMM_VALUE);

            LightState {
                switch,
                dimm_value,
                raw: merged(prev.map(|p| &p.raw), fields),
            }
        });

        tracing::trace!(device_id = self.id, switch = state.switch, dimm_value = state.dimm_value, "Light updated");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Light({}, \"{}\", dimmable: {})", self.id, self.name, self.dimmable)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_dimm(value: i64) -> u8 {
    value.clamp(0, i64::from(MAX_DIMM_VALUE)) as u8
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Light")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dimmable", &self.dimmable)
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingSink;

    fn light(dimmable: bool) -> (Light, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Light::new(1, "Kitchen".into(), dimmable, sink.clone()), sink)
    }

    #[test]
    fn non_dimmable_light_keeps_default_brightness() {
        let (light, _) = light(false);
        light.apply(&json!({ "switch": true, "dimmvalue": 20 })).unwrap();

        let state = light.state().unwrap();
        assert!(state.switch);
        assert_eq!(state.dimm_value, 99);
    }

    #[test]
    fn brightness_carries_over_while_off() {
        let (light, _) = light(true);
        light.apply(&json!({ "switch": true, "dimmvalue": 50 })).unwrap();
        light.apply(&json!({ "switch": false })).unwrap();

        let state = light.state().unwrap();
        assert!(!state.switch);
        assert_eq!(state.dimm_value, 50);
    }

    #[test]
    fn brightness_ignored_when_switched_off() {
        let (light, _) = light(true);
        light.apply(&json!({ "switch": true, "dimmvalue": 40 })).unwrap();
        light.apply(&json!({ "switch": false, "dimmvalue": 0 })).unwrap();
        assert_eq!(light.state().unwrap().dimm_value, 40);
    }

    #[test]
    fn switch_carries_over_when_absent() {
        let (light, _) = light(true);
        light.apply(&json!({ "switch": true, "dimmvalue": 30 })).unwrap();
        light.apply(&json!({ "dimmvalue": 60 })).unwrap();

        let state = light.state().unwrap();
        assert!(state.switch);
        assert_eq!(state.dimm_value, 60);
        assert_eq!(state.raw.get("dimmvalue"), Some(&json!(60)));
    }

    #[test]
    fn first_payload_without_switch_means_off() {
        let (light, _) = light(true);
        light.apply(&json!({ "name": "Kitchen" })).unwrap();
        assert!(!light.state().unwrap().switch);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let (light, _) = light(true);
        assert_eq!(
            light.apply(&json!([1, 2])),
            Err(DispatchError::NotAnObject { kind: "light" })
        );
        assert!(light.state().is_none());
    }

    #[tokio::test]
    async fn commands_target_this_device() {
        let (light, sink) = light(true);
        light.switch(true).await.unwrap();
        light.dimm(250).await.unwrap();
        light.dimm(-5).await.unwrap();

        assert_eq!(
            sink.sent(),
            vec![
                (MessageType::ActionSwitchDevice, json!({ "deviceId": 1, "switch": true })),
                (MessageType::ActionSlideDevice, json!({ "deviceId": 1, "dimmvalue": 99 })),
                (MessageType::ActionSlideDevice, json!({ "deviceId": 1, "dimmvalue": 0 })),
            ]
        );
    }

    #[tokio::test]
    async fn dimming_a_plain_switch_is_unsupported() {
        let (light, sink) = light(false);
        assert!(matches!(light.dimm(10).await, Err(CoreError::Unsupported { .. })));
        assert!(sink.sent().is_empty());
    }
}
