//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in configuration with the "current
//! state" recorded by the host, and generates the list of required Effects.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value, values_equal};
use crate::schema::ResourceSchema;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute differs -> needs replacement
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        forced_by: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
///
/// With a schema, every declared attribute is compared and an absent value
/// counts as its zero value, so removing `locked = true` from the
/// configuration is an update. Without one, only desired keys are compared.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let forced_by: Vec<String> = match schema {
        Some(schema) => changed
            .iter()
            .filter(|name| schema.attributes.get(*name).is_some_and(|a| a.force_new))
            .cloned()
            .collect(),
        None => Vec::new(),
    };

    if forced_by.is_empty() {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            forced_by,
        }
    }
}

/// Find changed attributes between desired and current state, sorted by name
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let keys: HashSet<&String> = match schema {
        Some(schema) => schema.attributes.keys().collect(),
        None => desired.keys().collect(),
    };

    let mut changed: Vec<String> = keys
        .into_iter()
        .filter(|key| !values_equal(desired.get(*key), current.get(*key)))
        .cloned()
        .collect();
    changed.sort();
    changed
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Stored resources that are no longer desired are planned for deletion,
/// after every create and update.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                forced_by,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                forced_by,
            }),
            Diff::NoChange(_) => {}
        }
    }

    let desired_ids: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired_ids.contains(&s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.name.cmp(&b.id.name));
    for state in orphans {
        plan.add(Effect::Delete(state.clone()));
    }

    plan
}

/// Plan the deletion of every existing resource
pub fn create_destroy_plan(current_states: &HashMap<ResourceId, State>) -> Plan {
    create_plan(&[], current_states, &HashMap::new())
}
