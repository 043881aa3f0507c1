// ── Entity registry ──
//
// Every device, room and component discovered on the bridge, keyed by
// the bridge's ids. Entities are created lazily on first sight and never
// removed; all mutation happens inside `dispatch`, called from the pump.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde_json::Value;
use xcomfort_api::{InboundMessage, MessageType};

use crate::command::CommandSink;
use crate::config::SetpointRanges;
use crate::error::DispatchError;
use crate::model::common::{as_object, flag, integer, name_of, required_id};
use crate::model::device::dev_type;
use crate::model::{
    ClimateSensor, CompId, Component, Device, DeviceId, Entity, GenericDevice, Heater, Light,
    Room, RoomId, SHADING_ACTUATOR_COMP_TYPE, Shade,
};

/// What one inbound message did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// The bulk snapshot's final part has been applied.
    SnapshotComplete,
    Ignored,
}

pub struct Registry {
    devices: DashMap<DeviceId, Arc<Device>>,
    rooms: DashMap<RoomId, Arc<Room>>,
    comps: DashMap<CompId, Arc<Component>>,
    home_data: ArcSwapOption<Value>,
    sink: Arc<dyn CommandSink>,
    setpoint_ranges: SetpointRanges,
}

impl Registry {
    pub fn new(sink: Arc<dyn CommandSink>, setpoint_ranges: SetpointRanges) -> Self {
        Self {
            devices: DashMap::new(),
            rooms: DashMap::new(),
            comps: DashMap::new(),
            home_data: ArcSwapOption::empty(),
            sink,
            setpoint_ranges,
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Route one inbound message to its handler.
    pub fn dispatch(&self, message: &InboundMessage) -> DispatchOutcome {
        let Some(message_type) = message.message_type() else {
            tracing::debug!(type_int = ?message.type_int, "Ignoring unknown message type");
            return DispatchOutcome::Ignored;
        };
        let payload = &message.payload;

        match message_type {
            MessageType::SetAllData => self.handle_all_data(payload),
            MessageType::SetDeviceState => {
                report(self.apply_device_state(payload), "device state");
                DispatchOutcome::Applied
            }
            MessageType::SetStateInfo => {
                self.handle_state_info(payload);
                DispatchOutcome::Applied
            }
            MessageType::SetHomeData => {
                self.home_data.store(Some(Arc::new(payload.clone())));
                tracing::debug!("Home data updated");
                DispatchOutcome::Applied
            }
            MessageType::DeviceDeleted | MessageType::RoomDeleted | MessageType::CompDeleted => {
                tracing::info!(%message_type, ?payload, "Deletion notice ignored");
                DispatchOutcome::Ignored
            }
            other => {
                tracing::trace!(message_type = %other, "No handler for message type");
                DispatchOutcome::Ignored
            }
        }
    }

    fn handle_all_data(&self, payload: &Value) -> DispatchOutcome {
        // Components first: device classification looks at them.
        for item in list(payload, "comps") {
            report(self.upsert_comp(item).map(drop), "component");
        }
        for item in list(payload, "devices") {
            report(self.upsert_device(item).map(drop), "device");
        }
        for item in list(payload, "rooms") {
            report(self.upsert_room(item).map(drop), "room");
        }
        for item in list(payload, "roomHeating") {
            report(self.apply_room_heating(item), "room heating");
        }

        if payload.get("lastItem").is_some() {
            tracing::info!(
                devices = self.devices.len(),
                rooms = self.rooms.len(),
                comps = self.comps.len(),
                "Bulk snapshot complete"
            );
            DispatchOutcome::SnapshotComplete
        } else {
            DispatchOutcome::Applied
        }
    }

    fn handle_state_info(&self, payload: &Value) {
        for item in list(payload, "item") {
            report(self.apply_state_item(item), "state info");
        }
    }

    fn apply_state_item(&self, item: &Value) -> Result<(), DispatchError> {
        let fields = as_object(item, "state info")?;
        if fields.contains_key("deviceId") {
            let id = required_id(fields, "deviceId", "state info")?;
            apply_known(self.device(id), item, "device", id)
        } else if fields.contains_key("roomId") {
            let id = required_id(fields, "roomId", "state info")?;
            apply_known(self.room(id), item, "room", id)
        } else if fields.contains_key("compId") {
            let id = required_id(fields, "compId", "state info")?;
            apply_known(self.comp(id), item, "component", id)
        } else {
            Err(DispatchError::MissingField {
                kind: "state info",
                field: "deviceId, roomId or compId",
            })
        }
    }

    fn apply_device_state(&self, payload: &Value) -> Result<(), DispatchError> {
        let fields = as_object(payload, "device state")?;
        let id = required_id(fields, "deviceId", "device state")?;
        apply_known(self.device(id), payload, "device", id)
    }

    fn apply_room_heating(&self, item: &Value) -> Result<(), DispatchError> {
        let fields = as_object(item, "room heating")?;
        let id = required_id(fields, "roomId", "room heating")?;
        apply_known(self.room(id), item, "room", id)
    }

    // ── Create-or-update ─────────────────────────────────────────────

    pub fn upsert_device(&self, item: &Value) -> Result<Arc<Device>, DispatchError> {
        let fields = as_object(item, "device")?;
        let id = required_id(fields, "deviceId", "device")?;

        let existing = self.devices.get(&id).map(|d| Arc::clone(d.value()));
        let device = if let Some(device) = existing {
            device
        } else {
            let device = Arc::new(self.create_device(id, fields));
            tracing::debug!(device_id = id, kind = %device.kind(), "Discovered device");
            self.devices.insert(id, Arc::clone(&device));
            device
        };

        device.apply(item)?;
        Ok(device)
    }

    fn create_device(&self, id: DeviceId, fields: &serde_json::Map<String, Value>) -> Device {
        let name = name_of(fields);
        let sink = Arc::clone(&self.sink);

        match fields.get("devType").and_then(integer) {
            Some(dev_type::SWITCHING_ACTUATOR | dev_type::DIMMING_ACTUATOR) => {
                let dimmable = fields.get("dimmable").and_then(flag).unwrap_or(false);
                Device::Light(Light::new(id, name, dimmable, sink))
            }
            Some(dev_type::HEATING_ACTUATOR) => Device::Heater(Heater::new(id, name)),
            Some(dev_type::RC_TOUCH) => {
                let comp_type = fields
                    .get("compId")
                    .and_then(integer)
                    .and_then(|comp_id| self.comp(comp_id))
                    .and_then(|comp| comp.comp_type());
                if comp_type == Some(SHADING_ACTUATOR_COMP_TYPE) {
                    Device::Shade(Shade::new(id, name, comp_type, sink))
                } else {
                    Device::ClimateSensor(ClimateSensor::new(id, name))
                }
            }
            other => Device::Generic(GenericDevice::new(id, name, other)),
        }
    }

    pub fn upsert_room(&self, item: &Value) -> Result<Arc<Room>, DispatchError> {
        let fields = as_object(item, "room")?;
        let id = required_id(fields, "roomId", "room")?;

        let existing = self.rooms.get(&id).map(|r| Arc::clone(r.value()));
        let room = if let Some(room) = existing {
            room
        } else {
            let room = Arc::new(Room::new(
                id,
                name_of(fields),
                self.setpoint_ranges,
                Arc::clone(&self.sink),
            ));
            tracing::debug!(room_id = id, "Discovered room");
            self.rooms.insert(id, Arc::clone(&room));
            room
        };

        room.apply(item)?;
        Ok(room)
    }

    pub fn upsert_comp(&self, item: &Value) -> Result<Arc<Component>, DispatchError> {
        let fields = as_object(item, "component")?;
        let id = required_id(fields, "compId", "component")?;

        let existing = self.comps.get(&id).map(|c| Arc::clone(c.value()));
        let comp = if let Some(comp) = existing {
            comp
        } else {
            let comp = Arc::new(Component::new(id, name_of(fields)));
            tracing::debug!(comp_id = id, "Discovered component");
            self.comps.insert(id, Arc::clone(&comp));
            comp
        };

        comp.apply(item)?;
        Ok(comp)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.devices.get(&id).map(|d| Arc::clone(d.value()))
    }

    pub fn room(&self, id: RoomId) -> Option<Arc<Room>> {
        self.rooms.get(&id).map(|r| Arc::clone(r.value()))
    }

    pub fn comp(&self, id: CompId) -> Option<Arc<Component>> {
        self.comps.get(&id).map(|c| Arc::clone(c.value()))
    }

    /// All devices, ordered by id.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        sorted(&self.devices)
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        sorted(&self.rooms)
    }

    pub fn comps(&self) -> Vec<Arc<Component>> {
        sorted(&self.comps)
    }

    /// The latest `SET_HOME_DATA` payload.
    pub fn home_data(&self) -> Option<Arc<Value>> {
        self.home_data.load_full()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn comp_count(&self) -> usize {
        self.comps.len()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("devices", &self.devices.len())
            .field("rooms", &self.rooms.len())
            .field("comps", &self.comps.len())
            .finish_non_exhaustive()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn list<'a>(payload: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Apply to an entity that must already exist; unknown ids are dropped.
fn apply_known<E: Entity>(
    entity: Option<Arc<E>>,
    item: &Value,
    kind: &'static str,
    id: i64,
) -> Result<(), DispatchError> {
    match entity {
        Some(entity) => entity.apply(item),
        None => {
            tracing::trace!(kind, id, "Update for unknown entity dropped");
            Ok(())
        }
    }
}

fn report(result: Result<(), DispatchError>, context: &'static str) {
    if let Err(e) = result {
        tracing::warn!(error = %e, context, "Skipping malformed item");
    }
}

fn sorted<T>(map: &DashMap<i64, Arc<T>>) -> Vec<Arc<T>> {
    let mut entries: Vec<(i64, Arc<T>)> = map
        .iter()
        .map(|e| (*e.key(), Arc::clone(e.value())))
        .collect();
    entries.sort_by_key(|(id, _)| *id);
    entries.into_iter().map(|(_, v)| v).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::testing::RecordingSink;
    use crate::model::DeviceKind;
    use serde_json::json;

    fn registry() -> Registry {
        Registry::new(Arc::new(RecordingSink::default()), SetpointRanges::default())
    }

    fn message(message_type: MessageType, payload: Value) -> InboundMessage {
        InboundMessage {
            type_int: Some(message_type.code()),
            payload,
        }
    }

    fn snapshot() -> Value {
        json!({
            "devices": [
                { "deviceId": 3, "name": "Spots", "devType": 101, "dimmable": true, "switch": true, "dimmvalue": 40 },
                { "deviceId": 1, "name": "Hall", "devType": 100, "dimmable": false, "switch": false },
                { "deviceId": 7, "name": "Blind", "devType": 450, "compId": 70 },
                { "deviceId": 8, "name": "Panel", "devType": 450, "compId": 80 },
                { "deviceId": 9, "name": "Floor", "devType": 440 },
                { "deviceId": 12, "name": "Button", "devType": 220 }
            ],
            // listed after devices on purpose: must still be processed first
            "comps": [
                { "compId": 70, "name": "Shade actuator", "compType": 86 },
                { "compId": 80, "name": "RC touch", "compType": 73 }
            ],
            "rooms": [
                { "roomId": 2, "name": "Living", "setpoint": 21.0, "currentMode": 3, "state": 1 }
            ],
            "roomHeating": [
                { "roomId": 2, "temp": 20.5, "humidity": 41 },
                { "roomId": 99, "temp": 1.0 }
            ]
        })
    }

    #[test]
    fn bulk_snapshot_classifies_devices() {
        let registry = registry();
        let outcome = registry.dispatch(&message(MessageType::SetAllData, snapshot()));
        assert_eq!(outcome, DispatchOutcome::Applied);

        let kinds: Vec<(DeviceId, DeviceKind)> = registry
            .devices()
            .iter()
            .map(|d| (d.id(), d.kind()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (1, DeviceKind::Light),
                (3, DeviceKind::Light),
                (7, DeviceKind::Shade),
                (8, DeviceKind::ClimateSensor),
                (9, DeviceKind::Heater),
                (12, DeviceKind::Generic),
            ]
        );

        let spots = registry.device(3).unwrap();
        let light = spots.as_light().unwrap();
        assert!(light.is_dimmable());
        assert_eq!(light.state().unwrap().dimm_value, 40);

        let room = registry.room(2).unwrap().state().unwrap();
        assert_eq!(room.temperature, Some(20.5));
        assert_eq!(room.humidity, Some(41.0));
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.comp_count(), 2);
    }

    #[test]
    fn last_item_completes_the_snapshot() {
        let registry = registry();
        let outcome = registry.dispatch(&message(
            MessageType::SetAllData,
            json!({ "devices": [], "lastItem": true }),
        ));
        assert_eq!(outcome, DispatchOutcome::SnapshotComplete);
    }

    #[test]
    fn batched_update_routes_by_id_kind() {
        let registry = registry();
        registry.dispatch(&message(MessageType::SetAllData, snapshot()));

        registry.dispatch(&message(
            MessageType::SetStateInfo,
            json!({ "item": [{ "deviceId": 1, "switch": true, "dimmvalue": 50 }] }),
        ));
        let hall = registry.device(1).unwrap();
        let state = hall.as_light().unwrap().state().unwrap();
        assert!(state.switch);
        // not dimmable: brightness stays at the default
        assert_eq!(state.dimm_value, 99);

        registry.dispatch(&message(
            MessageType::SetStateInfo,
            json!({ "item": [{ "deviceId": 3, "switch": true, "dimmvalue": 50 }] }),
        ));
        let spots = registry.device(3).unwrap();
        let state = spots.as_light().unwrap().state().unwrap();
        assert!(state.switch);
        assert_eq!(state.dimm_value, 50);
    }

    #[test]
    fn bad_items_do_not_spoil_the_batch() {
        let registry = registry();
        registry.dispatch(&message(MessageType::SetAllData, snapshot()));

        registry.dispatch(&message(
            MessageType::SetStateInfo,
            json!({ "item": [
                "garbage",
                { "nothing": "useful" },
                { "deviceId": 555, "switch": true },
                { "roomId": 2, "setpoint": 22.5, "mode": 2 },
                { "compId": 70, "signal": -60 },
                { "deviceId": 7, "shPos": 100 }
            ] }),
        ));

        assert_eq!(registry.room(2).unwrap().state().unwrap().setpoint, Some(22.5));
        assert_eq!(
            registry.comp(70).unwrap().state().unwrap().raw.get("signal"),
            Some(&json!(-60))
        );
        let blind = registry.device(7).unwrap();
        assert_eq!(blind.as_shade().unwrap().state().unwrap().is_closed, Some(true));
        assert!(registry.device(555).is_none());
    }

    #[test]
    fn single_device_update_for_unknown_id_is_dropped() {
        let registry = registry();
        let outcome = registry.dispatch(&message(
            MessageType::SetDeviceState,
            json!({ "deviceId": 40, "switch": true }),
        ));
        assert_eq!(outcome, DispatchOutcome::Applied);
        assert_eq!(registry.device_count(), 0);
    }

    #[tokio::test]
    async fn entities_are_created_once_and_updated_in_place() {
        let registry = registry();
        let first = registry
            .upsert_device(&json!({ "deviceId": 5, "devType": 100, "switch": false }))
            .unwrap();
        let mut sub = first.as_light().unwrap().subscribe();

        registry.dispatch(&message(
            MessageType::SetDeviceState,
            json!({ "deviceId": 5, "switch": true }),
        ));

        let again = registry.device(5).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(again.as_light().unwrap().state().unwrap().switch);

        assert!(!sub.recv().await.unwrap().switch);
        assert!(sub.recv().await.unwrap().switch);
    }

    #[test]
    fn home_data_is_kept() {
        let registry = registry();
        registry.dispatch(&message(MessageType::SetHomeData, json!({ "name": "Home" })));
        assert_eq!(*registry.home_data().unwrap(), json!({ "name": "Home" }));
    }

    #[test]
    fn deletions_and_unknown_types_are_ignored() {
        let registry = registry();
        registry.dispatch(&message(MessageType::SetAllData, snapshot()));

        let deleted = registry.dispatch(&message(MessageType::DeviceDeleted, json!({ "deviceId": 1 })));
        assert_eq!(deleted, DispatchOutcome::Ignored);
        assert!(registry.device(1).is_some());

        let unknown = registry.dispatch(&InboundMessage {
            type_int: Some(4242),
            payload: json!({}),
        });
        assert_eq!(unknown, DispatchOutcome::Ignored);
    }
}
