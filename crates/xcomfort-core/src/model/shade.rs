// ── Shade ──
//
// Motorized blind behind a shading actuator. The bridge sends partial
// updates (position, safety, runtime capability) in any combination, so
// the raw state is always accumulated before anything is derived.

use std::sync::Arc;

use serde_json::{Value, json};
use xcomfort_api::MessageType;

use super::common::{DeviceId, Entity, RawState, as_object, flag, integer, merged};
use super::component::SHADING_ACTUATOR_COMP_TYPE;
use crate::command::CommandSink;
use crate::error::{CoreError, DispatchError};
use crate::store::StatePublisher;
use crate::stream::StateSubscription;

/// `state` codes of `ACTION_SHADE_DEVICE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[repr(u8)]
pub enum ShadeOperation {
    Open = 0,
    Close = 1,
    Stop = 2,
    GoTo = 11,
}

impl ShadeOperation {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadeState {
    /// 0 is fully open, 100 fully closed.
    pub position: Option<i64>,
    pub safety: bool,
    pub is_closed: Option<bool>,
    pub supports_go_to: bool,
    pub raw: RawState,
}

impl ShadeState {
    fn derive(raw: RawState, comp_type: Option<i64>) -> Self {
        let position = raw.get("shPos").and_then(integer);
        let safety = raw.get("shSafety").and_then(flag).unwrap_or(false);
        let is_closed = match position {
            Some(p @ (0 | 100)) => Some(p == 100),
            _ => None,
        };
        let supports_go_to = comp_type == Some(SHADING_ACTUATOR_COMP_TYPE)
            && raw.get("shRuntime").and_then(integer) == Some(1);

        Self {
            position,
            safety,
            is_closed,
            supports_go_to,
            raw,
        }
    }
}

pub struct Shade {
    id: DeviceId,
    name: String,
    comp_type: Option<i64>,
    state: StatePublisher<ShadeState>,
    sink: Arc<dyn CommandSink>,
}

impl Shade {
    pub(crate) fn new(
        id: DeviceId,
        name: String,
        comp_type: Option<i64>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            id,
            name,
            comp_type,
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

    pub fn state(&self) -> Option<ShadeState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<ShadeState> {
        self.state.subscribe()
    }

    pub fn supports_go_to(&self) -> bool {
        self.state().is_some_and(|s| s.supports_go_to)
    }

    pub async fn move_up(&self) -> Result<(), CoreError> {
        self.send(ShadeOperation::Open, None).await
    }

    pub async fn move_down(&self) -> Result<(), CoreError> {
        self.send(ShadeOperation::Close, None).await
    }

    pub async fn move_stop(&self) -> Result<(), CoreError> {
        self.send(ShadeOperation::Stop, None).await
    }

    /// Drive to a position, clamped to 0–100.
    pub async fn move_to_position(&self, position: i32) -> Result<(), CoreError> {
        if !self.supports_go_to() {
            return Err(CoreError::unsupported(
                "move_to_position",
                "a shading actuator with runtime calibration",
            ));
        }
        self.send(ShadeOperation::GoTo, Some(position.clamp(0, 100))).await
    }

    async fn send(&self, operation: ShadeOperation, value: Option<i32>) -> Result<(), CoreError> {
        if self.state().is_some_and(|s| s.safety) {
            tracing::debug!(device_id = self.id, %operation, "Safety interlock set; shade command suppressed");
            return Ok(());
        }

        let mut payload = json!({ "deviceId": self.id, "state": operation.code() });
        if let Some(value) = value {
            payload["value"] = json!(value);
        }
        self.sink
            .send_message(MessageType::ActionShadeDevice, payload)
            .await
    }
}

impl Entity for Shade {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        let fields = as_object(payload, "shade")?;
        let comp_type = self.comp_type;

        let state = self
            .state
            .update(|prev| ShadeState::derive(merged(prev.map(|p| &p.raw), fields), comp_type));

        tracing::trace!(
            device_id = self.id,
            position = ?state.position,
            safety = state.safety,
            "Shade updated"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Shade({}, \"{}\")", self.id, self.name)
    }
}

impl std::fmt::Debug for Shade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shade")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("comp_type", &self.comp_type)
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingSink;

    fn shade(comp_type: Option<i64>) -> (Shade, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Shade::new(9, "Patio".into(), comp_type, sink.clone()), sink)
    }

    #[tokio::test]
    async fn safety_interlock_suppresses_movement() {
        let (shade, sink) = shade(Some(SHADING_ACTUATOR_COMP_TYPE));
        shade.apply(&json!({ "shPos": 100 })).unwrap();
        shade.apply(&json!({ "shSafety": 1 })).unwrap();
        shade.apply(&json!({ "shPos": 50 })).unwrap();

        let state = shade.state().unwrap();
        assert_eq!(state.is_closed, None);
        assert!(state.safety);
        assert_eq!(state.position, Some(50));

        shade.move_up().await.unwrap();
        shade.move_down().await.unwrap();
        shade.move_stop().await.unwrap();
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn safety_interlock_suppresses_go_to() {
        let (shade, sink) = shade(Some(SHADING_ACTUATOR_COMP_TYPE));
        shade.apply(&json!({ "shPos": 20, "shRuntime": 1, "shSafety": 1 })).unwrap();
        assert!(shade.supports_go_to());

        shade.move_to_position(60).await.unwrap();
        assert!(sink.sent().is_empty());

        shade.apply(&json!({ "shSafety": 0 })).unwrap();
        shade.move_to_position(60).await.unwrap();
        assert_eq!(
            sink.sent(),
            vec![(MessageType::ActionShadeDevice, json!({ "deviceId": 9, "state": 11, "value": 60 }))]
        );
    }

    #[test]
    fn closed_only_at_the_extremes() {
        let (shade, _) = shade(None);

        shade.apply(&json!({ "shSafety": 0 })).unwrap();
        assert_eq!(shade.state().unwrap().is_closed, None);

        shade.apply(&json!({ "shPos": 100 })).unwrap();
        assert_eq!(shade.state().unwrap().is_closed, Some(true));

        shade.apply(&json!({ "shPos": 0 })).unwrap();
        assert_eq!(shade.state().unwrap().is_closed, Some(false));

        shade.apply(&json!({ "shPos": 99 })).unwrap();
        assert_eq!(shade.state().unwrap().is_closed, None);
    }

    #[tokio::test]
    async fn movement_commands_carry_operation_codes() {
        let (shade, sink) = shade(Some(SHADING_ACTUATOR_COMP_TYPE));
        shade.apply(&json!({ "shPos": 20, "shSafety": 0, "shRuntime": 1 })).unwrap();

        shade.move_up().await.unwrap();
        shade.move_down().await.unwrap();
        shade.move_stop().await.unwrap();
        shade.move_to_position(140).await.unwrap();

        let states: Vec<Value> = sink.sent().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            states,
            vec![
                json!({ "deviceId": 9, "state": 0 }),
                json!({ "deviceId": 9, "state": 1 }),
                json!({ "deviceId": 9, "state": 2 }),
                json!({ "deviceId": 9, "state": 11, "value": 100 }),
            ]
        );
        assert!(sink.sent().iter().all(|(t, _)| *t == MessageType::ActionShadeDevice));
    }

    #[tokio::test]
    async fn go_to_needs_shading_component_and_runtime_flag() {
        let (plain, sink) = shade(Some(77));
        plain.apply(&json!({ "shRuntime": 1 })).unwrap();
        assert!(!plain.supports_go_to());
        assert!(matches!(
            plain.move_to_position(10).await,
            Err(CoreError::Unsupported { .. })
        ));
        assert!(sink.sent().is_empty());

        let (uncalibrated, _) = shade(Some(SHADING_ACTUATOR_COMP_TYPE));
        uncalibrated.apply(&json!({ "shRuntime": 0 })).unwrap();
        assert!(!uncalibrated.supports_go_to());
    }
}
