// xcomfort-core: Entity registry and reconnecting bridge facade on top of
// xcomfort-api.

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, BridgeState, Connect, WebSocketConnector};
pub use command::CommandSink;
pub use config::{BridgeConfig, DEFAULT_RECONNECT_DELAY, SetpointRange, SetpointRanges};
pub use error::{CoreError, DispatchError};
pub use store::{DispatchOutcome, Registry, StatePublisher};
pub use stream::StateSubscription;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ClimateSensor, ClimateState, CompId, CompState, Component, Device, DeviceId, DeviceKind,
    Entity, GenericDevice, Heater, Light, LightState, RawDeviceState, RawState, RctMode, RctState,
    Room, RoomId, RoomState, Shade, ShadeOperation, ShadeState,
};
