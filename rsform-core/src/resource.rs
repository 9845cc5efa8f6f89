//! Resource - Representing resources, their state and the data handed to providers

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::schema::{ResourceSchema, TypeError};

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "rs_deployment")
    pub resource_type: String,
    /// Resource name (identifier given in the configuration)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true for the zero value of the variant ("", 0, false, empty collections)
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// Desired state declared in configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Current state of a managed resource as last recorded by the host
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Remote identifier (e.g., "rs_cm:/api/deployments/42")
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// Per-instance data handed to resource lifecycle callbacks.
///
/// Holds the prior (persisted) attributes and the desired attributes. Callbacks
/// read the desired view with [`get`](Self::get) / [`get_ok`](Self::get_ok) and
/// write remote values back with [`set`](Self::set). The host persists
/// [`state`](Self::state) once the callback returns, successful or not.
///
/// An empty identifier means the resource does not exist (or no longer does).
#[derive(Debug, Clone)]
pub struct ResourceData {
    schema: ResourceSchema,
    id: String,
    prior: HashMap<String, Value>,
    desired: HashMap<String, Value>,
    partial: bool,
    committed: HashSet<String>,
}

impl ResourceData {
    /// Empty data for a resource that is about to be created
    pub fn new(schema: ResourceSchema) -> Self {
        Self {
            schema,
            id: String::new(),
            prior: HashMap::new(),
            desired: HashMap::new(),
            partial: false,
            committed: HashSet::new(),
        }
    }

    /// Data for creating a resource from its configuration
    pub fn for_create(schema: ResourceSchema, config: HashMap<String, Value>) -> Self {
        let mut data = Self::new(schema);
        data.desired = config;
        data
    }

    /// Data for an existing resource, desired view equal to the persisted one
    pub fn from_state(schema: ResourceSchema, state: &State) -> Self {
        let mut data = Self::new(schema);
        data.id = state.identifier.clone().unwrap_or_default();
        data.prior = state.attributes.clone();
        data.desired = state.attributes.clone();
        data
    }

    /// Data for updating an existing resource towards a new configuration
    pub fn for_update(
        schema: ResourceSchema,
        state: &State,
        config: HashMap<String, Value>,
    ) -> Self {
        let mut data = Self::from_state(schema, state);
        data.desired = config;
        data
    }

    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    pub fn resource_type(&self) -> &str {
        &self.schema.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the remote identifier. Setting it to "" marks the resource as gone.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Raw desired value, if any
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.desired.get(key)
    }

    /// Desired value only when it is set to a non-zero value
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.desired.get(key).filter(|v| !v.is_zero())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Set an attribute declared in the schema
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), TypeError> {
        let value = value.into();
        let attr = self
            .schema
            .attributes
            .get(key)
            .ok_or_else(|| TypeError::UnknownAttribute {
                name: key.to_string(),
            })?;
        attr.attr_type.check(&value)?;
        self.desired.insert(key.to_string(), value);
        Ok(())
    }

    /// Whether the desired value of `key` differs from the persisted one
    pub fn has_change(&self, key: &str) -> bool {
        !values_equal(self.prior.get(key), self.desired.get(key))
    }

    /// Enable or disable partial mode.
    ///
    /// While enabled, only attributes committed with [`set_partial`](Self::set_partial)
    /// are persisted from the desired view.
    pub fn partial(&mut self, on: bool) {
        self.partial = on;
        if !on {
            self.committed.clear();
        }
    }

    pub fn set_partial(&mut self, key: &str) {
        self.committed.insert(key.to_string());
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Attributes the host persists for this resource
    pub fn persisted_attributes(&self) -> HashMap<String, Value> {
        if !self.partial {
            return self.desired.clone();
        }
        let mut attributes = self.prior.clone();
        for key in &self.committed {
            match self.desired.get(key) {
                Some(v) => {
                    attributes.insert(key.clone(), v.clone());
                }
                None => {
                    attributes.remove(key);
                }
            }
        }
        attributes
    }

    /// Snapshot of what the host persists for this resource
    pub fn state(&self, id: ResourceId) -> State {
        if self.id.is_empty() {
            return State::not_found(id);
        }
        State::existing(id, self.persisted_attributes()).with_identifier(self.id.clone())
    }
}

/// Compare two optional values, treating an absent value like a zero one
pub fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b || (a.is_zero() && b.is_zero()),
        (Some(v), None) | (None, Some(v)) => v.is_zero(),
        (None, None) => true,
    }
}
