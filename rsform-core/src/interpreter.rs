//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.

use log::{debug, info};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceData, ResourceId, State};
use crate::schema::ResourceSchema;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Replace succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// A failed Effect
#[derive(Debug)]
pub struct EffectFailure {
    pub id: ResourceId,
    pub error: ProviderError,
    /// State the host must persist despite the failure (e.g., a partial update,
    /// or a replacement whose delete step already happened)
    pub state: Option<State>,
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, EffectFailure>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let result = self.execute_effect(effect).await;

            match &result {
                Ok(_) => success_count += 1,
                Err(_) => {
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Refresh a stored state from the remote side.
    ///
    /// A resource whose identifier was cleared by `read` comes back as
    /// [`State::not_found`]; every other provider error propagates.
    pub async fn refresh(&self, state: &State) -> ProviderResult<State> {
        let schema = self.schema_for(&state.id)?;
        let mut d = ResourceData::from_state(schema, state);

        self.provider
            .read(&mut d)
            .await
            .map_err(|e| e.for_resource(state.id.clone()))?;
        if d.id().is_empty() {
            debug!("{} no longer exists", state.id);
        }
        Ok(d.state(state.id.clone()))
    }

    /// Execute a single Effect
    async fn execute_effect(&self, effect: &Effect) -> Result<EffectOutcome, EffectFailure> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        let id = effect.resource_id().clone();
        let schema = self.schema_for(&id).map_err(|error| EffectFailure {
            id: id.clone(),
            error,
            state: None,
        })?;

        match effect {
            Effect::Create(resource) => {
                let state = self.create(schema, resource).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { from, to, .. } => {
                info!("Updating {}", id);
                let mut d = ResourceData::for_update(schema, from, to.attributes.clone());
                match self.provider.update(&mut d).await {
                    Ok(()) => Ok(EffectOutcome::Updated {
                        state: d.state(id),
                    }),
                    Err(error) => Err(EffectFailure {
                        state: Some(d.state(id.clone())),
                        error: error.for_resource(id.clone()),
                        id,
                    }),
                }
            }
            Effect::Replace { from, to, .. } => {
                self.delete(schema.clone(), from).await?;
                let state = self.create(schema, to).await.map_err(|mut failure| {
                    failure.state = Some(State::not_found(id.clone()));
                    failure
                })?;
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete(state) => {
                self.delete(schema, state).await?;
                Ok(EffectOutcome::Deleted { id })
            }
        }
    }

    async fn create(
        &self,
        schema: ResourceSchema,
        resource: &Resource,
    ) -> Result<State, EffectFailure> {
        info!("Creating {}", resource.id);
        let mut d = ResourceData::for_create(schema, resource.attributes.clone());
        match self.provider.create(&mut d).await {
            Ok(()) => Ok(d.state(resource.id.clone())),
            Err(error) => Err(EffectFailure {
                id: resource.id.clone(),
                error: error.for_resource(resource.id.clone()),
                state: None,
            }),
        }
    }

    async fn delete(&self, schema: ResourceSchema, state: &State) -> Result<(), EffectFailure> {
        info!("Deleting {}", state.id);
        let mut d = ResourceData::from_state(schema, state);
        self.provider
            .delete(&mut d)
            .await
            .map_err(|error| EffectFailure {
                id: state.id.clone(),
                error: error.for_resource(state.id.clone()),
                state: None,
            })
    }

    fn schema_for(&self, id: &ResourceId) -> ProviderResult<ResourceSchema> {
        self.provider.schema(&id.resource_type).ok_or_else(|| {
            ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
                .for_resource(id.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::provider::BoxFuture;
    use crate::resource::Value;
    use crate::schema::{AttributeSchema, AttributeType};

    /// Provider whose update commits `locked` and then fails
    struct TestProvider;

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn schemas(&self) -> Vec<ResourceSchema> {
            vec![
                ResourceSchema::new("test")
                    .attribute(AttributeSchema::new("name", AttributeType::String))
                    .attribute(AttributeSchema::new("locked", AttributeType::Bool)),
            ]
        }

        fn create<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                d.set_id("test:/things/1");
                Ok(())
            })
        }

        fn read<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                match d.get_string("name").as_str() {
                    "vanishing" => d.set_id(""),
                    "broken" => return Err(ProviderError::new("read rejected")),
                    _ => {}
                }
                Ok(())
            })
        }

        fn update<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                d.partial(true);
                d.set_partial("locked");
                Err(ProviderError::new("update rejected"))
            })
        }

        fn delete<'a>(&'a self, _d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn exists<'a>(&'a self, _d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<bool>> {
            Box::pin(async { Err(ProviderError::new("resource not found")) })
        }
    }

    fn stored(name: &str) -> State {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from(name));
        attrs.insert("locked".to_string(), Value::from(false));
        State::existing(ResourceId::new("test", "example"), attrs).with_identifier("test:/things/1")
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider);
        let plan = Plan::new();
        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn apply_create_effect() {
        let interpreter = Interpreter::new(TestProvider);
        let mut plan = Plan::new();
        plan.add(Effect::Create(
            Resource::new("test", "example").with_attribute("name", "x"),
        ));

        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        match &result.outcomes[0] {
            Ok(EffectOutcome::Created { state }) => {
                assert_eq!(state.identifier.as_deref(), Some("test:/things/1"));
            }
            other => panic!("Expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_update_reports_partial_state() {
        let interpreter = Interpreter::new(TestProvider);
        let mut plan = Plan::new();
        let to = Resource::new("test", "example")
            .with_attribute("name", "renamed")
            .with_attribute("locked", true);
        plan.add(Effect::Update {
            id: to.id.clone(),
            from: stored("example"),
            to,
            changed_attributes: vec!["name".to_string(), "locked".to_string()],
        });

        let result = interpreter.apply(&plan).await;

        assert_eq!(result.failure_count, 1);
        let failure = result.outcomes[0].as_ref().unwrap_err();
        assert_eq!(failure.error.to_string(), "[test.example] update rejected");
        let state = failure.state.as_ref().unwrap();
        assert_eq!(state.attributes.get("locked"), Some(&Value::from(true)));
        assert_eq!(state.attributes.get("name"), Some(&Value::from("example")));
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let interpreter = Interpreter::new(TestProvider);
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("unknown", "a")));
        plan.add(Effect::Create(Resource::new("test", "b")));

        let result = interpreter.apply(&plan).await;

        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(result.failure_count, 1);
    }

    #[tokio::test]
    async fn refresh_maps_missing_resources_to_not_found() {
        let interpreter = Interpreter::new(TestProvider);

        let state = interpreter.refresh(&stored("example")).await.unwrap();
        assert!(state.exists);

        let state = interpreter.refresh(&stored("vanishing")).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn refresh_propagates_read_errors() {
        let interpreter = Interpreter::new(TestProvider);

        let err = interpreter.refresh(&stored("broken")).await.unwrap_err();
        assert_eq!(err.to_string(), "[test.example] read rejected");
    }

    #[tokio::test]
    async fn dry_run_skips_effects() {
        let config = InterpreterConfig {
            dry_run: true,
            ..Default::default()
        };
        let interpreter = Interpreter::new(TestProvider).with_config(config);
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("test", "example")));

        let result = interpreter.apply(&plan).await;

        assert!(result.is_success());
        assert!(matches!(
            result.outcomes[0],
            Ok(EffectOutcome::Skipped { .. })
        ));
    }
}
