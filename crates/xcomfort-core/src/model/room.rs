// ── Room ──
//
// Rooms aggregate climate readings and own the heating controller. The
// bulk snapshot reports the active preset as `currentMode` plus a `modes`
// list of per-preset setpoints; incremental updates report it as `mode`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};
use xcomfort_api::MessageType;

use super::common::{Entity, RawState, RoomId, as_object, integer, merged, number};
use crate::command::CommandSink;
use crate::config::SetpointRanges;
use crate::error::{CoreError, DispatchError};
use crate::store::StatePublisher;
use crate::stream::StateSubscription;

/// Heating preset of a room controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum RctMode {
    Cool = 1,
    Eco = 2,
    Comfort = 3,
}

/// What a room controller is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum RctState {
    Idle = 0,
    Auto = 1,
    Active = 2,
}

impl RctMode {
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_value(value: &Value) -> Option<Self> {
        integer(value)
            .and_then(|i| u8::try_from(i).ok())
            .and_then(Self::from_repr)
    }
}

impl RctState {
    pub fn code(self) -> u8 {
        self as u8
    }

    fn from_value(value: &Value) -> Option<Self> {
        integer(value)
            .and_then(|i| u8::try_from(i).ok())
            .and_then(Self::from_repr)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    pub setpoint: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub power: f64,
    pub mode: Option<RctMode>,
    pub rct_state: Option<RctState>,
    pub raw: RawState,
}

pub struct Room {
    id: RoomId,
    name: String,
    ranges: SetpointRanges,
    mode_setpoints: Mutex<HashMap<RctMode, f64>>,
    state: StatePublisher<RoomState>,
    sink: Arc<dyn CommandSink>,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        name: String,
        ranges: SetpointRanges,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            id,
            name,
            ranges,
            mode_setpoints: Mutex::new(HashMap::new()),
            state: StatePublisher::new(),
            sink,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<RoomState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<RoomState> {
        self.state.subscribe()
    }

    /// Last known setpoint for a preset.
    pub fn mode_setpoint(&self, mode: RctMode) -> Option<f64> {
        self.setpoints().get(&mode).copied()
    }

    fn setpoints(&self) -> std::sync::MutexGuard<'_, HashMap<RctMode, f64>> {
        self.mode_setpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the target temperature for the active preset, clamped to that
    /// preset's allowed range.
    pub async fn set_target_temperature(&self, setpoint: f64) -> Result<(), CoreError> {
        if !setpoint.is_finite() {
            return Err(CoreError::ValidationFailed {
                message: format!("setpoint must be a finite temperature, got {setpoint}"),
            });
        }
        let state = self.state();
        let mode = state.as_ref().and_then(|s| s.mode).ok_or_else(|| {
            CoreError::unsupported("set_target_temperature", "a room with a known heating mode")
        })?;
        let rct_state = state.and_then(|s| s.rct_state);

        let setpoint = self.ranges.for_mode(mode).clamp(setpoint);
        self.setpoints().insert(mode, setpoint);
        self.send_heating_state(mode, rct_state, setpoint).await
    }

    /// Switch preset, re-sending the setpoint last known for it.
    pub async fn set_mode(&self, mode: RctMode) -> Result<(), CoreError> {
        let setpoint = self.mode_setpoint(mode).ok_or_else(|| {
            CoreError::unsupported("set_mode", "a known setpoint for the target mode")
        })?;
        let rct_state = self.state().and_then(|s| s.rct_state);
        self.send_heating_state(mode, rct_state, setpoint).await
    }

    async fn send_heating_state(
        &self,
        mode: RctMode,
        rct_state: Option<RctState>,
        setpoint: f64,
    ) -> Result<(), CoreError> {
        let rct_state = rct_state.unwrap_or(RctState::Idle);
        self.sink
            .send_message(
                MessageType::SetHeatingState,
                json!({
                    "roomId": self.id,
                    "mode": mode.code(),
                    "state": rct_state.code(),
                    "setpoint": setpoint,
                    "confirmed": false,
                }),
            )
            .await
    }
}

impl Entity for Room {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        let fields = as_object(payload, "room")?;

        if let Some(modes) = fields.get("modes").and_then(Value::as_array) {
            let mut setpoints = self.setpoints();
            for entry in modes {
                let mode = entry.get("mode").and_then(RctMode::from_value);
                let value = entry.get("value").and_then(number);
                if let (Some(mode), Some(value)) = (mode, value) {
                    setpoints.insert(mode, value);
                }
            }
        }

        let state = self.state.update(|prev| {
            let raw = merged(prev.map(|p| &p.raw), fields);
            // The payload's own field wins; stale keys in `raw` must not.
            let mode = fields
                .get("mode")
                .or_else(|| fields.get("currentMode"))
                .and_then(RctMode::from_value)
                .or(prev.and_then(|p| p.mode));
            let rct_state = fields
                .get("state")
                .and_then(RctState::from_value)
                .or(prev.and_then(|p| p.rct_state));

            RoomState {
                setpoint: raw.get("setpoint").and_then(number),
                temperature: raw.get("temp").and_then(number),
                humidity: raw.get("humidity").and_then(number),
                power: raw.get("power").and_then(number).unwrap_or(0.0),
                mode,
                rct_state,
                raw,
            }
        });

        tracing::trace!(
            room_id = self.id,
            setpoint = ?state.setpoint,
            mode = ?state.mode,
            "Room updated"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Room({}, \"{}\")", self.id, self.name)
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingSink;
    use crate::config::SetpointRange;
    use pretty_assertions::assert_eq;

    fn room() -> (Room, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (
            Room::new(2, "Living".into(), SetpointRanges::default(), sink.clone()),
            sink,
        )
    }

    fn bulk_payload() -> Value {
        json!({
            "roomId": 2,
            "name": "Living",
            "setpoint": 21.0,
            "temp": 20.4,
            "humidity": 38,
            "currentMode": 3,
            "state": 1,
            "modes": [
                { "mode": 1, "value": 16.0 },
                { "mode": 2, "value": 19.0 },
                { "mode": 3, "value": 21.0 }
            ]
        })
    }

    #[test]
    fn bulk_snapshot_populates_state_and_mode_setpoints() {
        let (room, _) = room();
        room.apply(&bulk_payload()).unwrap();

        let state = room.state().unwrap();
        assert_eq!(state.setpoint, Some(21.0));
        assert_eq!(state.temperature, Some(20.4));
        assert_eq!(state.humidity, Some(38.0));
        assert_eq!(state.power, 0.0);
        assert_eq!(state.mode, Some(RctMode::Comfort));
        assert_eq!(state.rct_state, Some(RctState::Auto));
        assert_eq!(room.mode_setpoint(RctMode::Eco), Some(19.0));
    }

    #[test]
    fn incremental_mode_overrides_bulk_mode() {
        let (room, _) = room();
        room.apply(&bulk_payload()).unwrap();
        room.apply(&json!({ "roomId": 2, "mode": 2, "setpoint": 19.0, "power": 12.5 })).unwrap();

        let state = room.state().unwrap();
        assert_eq!(state.mode, Some(RctMode::Eco));
        assert_eq!(state.setpoint, Some(19.0));
        assert_eq!(state.power, 12.5);
        assert_eq!(state.temperature, Some(20.4));

        // a later bulk snapshot's currentMode applies again
        room.apply(&json!({ "currentMode": 1 })).unwrap();
        assert_eq!(room.state().unwrap().mode, Some(RctMode::Cool));
    }

    #[tokio::test]
    async fn target_temperature_is_clamped_to_mode_range() {
        let (room, sink) = room();
        room.apply(&bulk_payload()).unwrap();

        room.set_target_temperature(55.0).await.unwrap();

        assert_eq!(
            sink.sent(),
            vec![(
                MessageType::SetHeatingState,
                json!({ "roomId": 2, "mode": 3, "state": 1, "setpoint": 40.0, "confirmed": false })
            )]
        );
        assert_eq!(room.mode_setpoint(RctMode::Comfort), Some(40.0));
    }

    #[tokio::test]
    async fn set_mode_resends_that_modes_setpoint() {
        let (room, sink) = room();
        room.apply(&bulk_payload()).unwrap();

        room.set_mode(RctMode::Cool).await.unwrap();

        let (kind, payload) = sink.sent().pop().unwrap();
        assert_eq!(kind, MessageType::SetHeatingState);
        assert_eq!(payload["mode"], json!(1));
        assert_eq!(payload["setpoint"], json!(16.0));
    }

    #[tokio::test]
    async fn heating_commands_need_known_mode() {
        let (room, sink) = room();
        room.apply(&json!({ "temp": 19.0 })).unwrap();

        assert!(room.set_target_temperature(20.0).await.is_err());
        assert!(room.set_mode(RctMode::Eco).await.is_err());
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn non_finite_setpoints_are_rejected() {
        let (room, sink) = room();
        room.apply(&bulk_payload()).unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = room.set_target_temperature(bad).await.unwrap_err();
            assert!(matches!(err, CoreError::ValidationFailed { .. }));
        }
        assert!(sink.sent().is_empty());
        assert_eq!(room.mode_setpoint(RctMode::Comfort), Some(21.0));
    }

    #[tokio::test]
    async fn custom_ranges_bound_the_setpoint() {
        let sink = Arc::new(RecordingSink::default());
        let ranges = SetpointRanges {
            comfort: SetpointRange::new(19.0, 23.0).unwrap(),
            ..SetpointRanges::default()
        };
        let room = Room::new(2, "Living".into(), ranges, sink.clone());
        room.apply(&bulk_payload()).unwrap();

        room.set_target_temperature(10.0).await.unwrap();
        assert_eq!(sink.sent()[0].1["setpoint"], json!(19.0));
    }
}
