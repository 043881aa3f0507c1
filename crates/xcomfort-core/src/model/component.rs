// ── Component ──
//
// Bridge-side hardware descriptor. Devices point at their component via
// `compId`; the component's type tells otherwise identical devices apart.

use serde_json::Value;

use super::common::{CompId, Entity, RawState, as_object, integer, merged};
use crate::error::DispatchError;
use crate::store::StatePublisher;
use crate::stream::StateSubscription;

/// `compType` of a shading actuator.
pub const SHADING_ACTUATOR_COMP_TYPE: i64 = 86;

#[derive(Debug, Clone, PartialEq)]
pub struct CompState {
    pub comp_type: Option<i64>,
    pub raw: RawState,
}

#[derive(Debug)]
pub struct Component {
    id: CompId,
    name: String,
    state: StatePublisher<CompState>,
}

impl Component {
    pub(crate) fn new(id: CompId, name: String) -> Self {
        Self {
            id,
            name,
            state: StatePublisher::new(),
        }
    }

    pub fn id(&self) -> CompId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comp_type(&self) -> Option<i64> {
        self.state.current().and_then(|s| s.comp_type)
    }

    pub fn state(&self) -> Option<CompState> {
        self.state.current()
    }

    pub fn subscribe(&self) -> StateSubscription<CompState> {
        self.state.subscribe()
    }
}

impl Entity for Component {
    fn apply(&self, payload: &Value) -> Result<(), DispatchError> {
        let fields = as_object(payload, "component")?;
        self.state.update(|prev| {
            let raw = merged(prev.map(|p| &p.raw), fields);
            CompState {
                comp_type: raw.get("compType").and_then(integer),
                raw,
            }
        });
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Comp({}, \"{}\")", self.id, self.name)
    }
}
