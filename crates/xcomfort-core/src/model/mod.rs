// ── Domain model ──
//
// Every entity the bridge pushes: devices (in their closed set of kinds),
// rooms and components. Each holds its latest snapshot in a
// `StatePublisher` and mutates only through `Entity::apply`.

pub mod common;

pub mod climate;
pub mod component;
pub mod device;
pub mod heater;
pub mod light;
pub mod room;
pub mod shade;

// ── Re-exports ──────────────────────────────────────────────────────

pub use common::{CompId, DeviceId, Entity, RawState, RoomId};

pub use climate::{ClimateSensor, ClimateState};
pub use component::{CompState, Component, SHADING_ACTUATOR_COMP_TYPE};
pub use device::{Device, DeviceKind};
pub use heater::{GenericDevice, Heater, RawDeviceState};
pub use light::{Light, LightState};
pub use room::{RctMode, RctState, Room, RoomState};
pub use shade::{Shade, ShadeOperation, ShadeState};
