//! State file structures for persisting infrastructure state

use std::collections::HashMap;

use rsform_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of rsform that last modified this state
    pub rsform_version: String,
    /// All managed resources and their current state
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    /// Current state file format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create a new empty state file
    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            rsform_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and update rsform version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.rsform_version = env!("CARGO_PKG_VERSION").to_string();
    }

    /// Find a resource by type and name
    pub fn find_resource(&self, resource_type: &str, name: &str) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }

    /// Add or update a resource in the state
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    /// Remove a resource from the state
    pub fn remove_resource(&mut self, resource_type: &str, name: &str) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == resource_type && r.name == name)?;
        Some(self.resources.remove(pos))
    }

    /// Record the outcome of a lifecycle operation: existing states are
    /// upserted, missing ones removed.
    pub fn record(&mut self, state: &State, provider: &str) {
        match ResourceState::from_state(state, provider) {
            Some(resource) => self.upsert_resource(resource),
            None => {
                self.remove_resource(&state.id.resource_type, &state.id.name);
            }
        }
    }

    /// All stored resources as host states, keyed by resource id
    pub fn states(&self) -> HashMap<ResourceId, State> {
        self.resources
            .iter()
            .map(|r| {
                let state = r.to_state();
                (state.id.clone(), state)
            })
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "rs_deployment")
    pub resource_type: String,
    /// Resource name (from the configuration)
    pub name: String,
    /// Provider name (e.g., "rs")
    pub provider: String,
    /// Remote identifier (e.g., "rs_cm:/api/deployments/42")
    pub identifier: String,
    /// All attributes of the resource
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl ResourceState {
    /// Create a new resource state
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: identifier.into(),
            attributes: HashMap::new(),
        }
    }

    /// Set an attribute value
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Convert a host state; `None` when the resource does not exist
    pub fn from_state(state: &State, provider: &str) -> Option<Self> {
        let identifier = state.identifier.as_deref().filter(|_| state.exists)?;
        let mut resource = Self::new(
            state.id.resource_type.clone(),
            state.id.name.clone(),
            provider,
            identifier,
        );
        resource.attributes = state.attributes.clone();
        Some(resource)
    }

    pub fn to_state(&self) -> State {
        State::existing(
            ResourceId::new(self.resource_type.clone(), self.name.clone()),
            self.attributes.clone(),
        )
        .with_identifier(self.identifier.clone())
    }
}
