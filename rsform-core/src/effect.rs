//! Effect - A single side effect the host will perform through a Provider

use crate::resource::{Resource, ResourceId, State};

/// Side effect on one resource instance. Effects are values; nothing happens
/// until an [`Interpreter`](crate::interpreter::Interpreter) runs them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a resource that does not exist yet
    Create(Resource),
    /// Update an existing resource in place
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Delete then re-create because a force-new attribute changed
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        forced_by: Vec<String>,
    },
    /// Delete a resource that is no longer desired
    Delete(State),
}

impl Effect {
    pub fn resource_id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } | Effect::Replace { id, .. } => id,
            Effect::Delete(state) => &state.id,
        }
    }
}
