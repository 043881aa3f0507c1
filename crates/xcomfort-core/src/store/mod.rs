// ── Entity store ──
//
// Latest-value publishing per entity, and the registry that owns every
// entity and applies inbound messages to them.

mod publisher;
mod registry;

pub use publisher::StatePublisher;
pub use registry::{DispatchOutcome, Registry};
