//! rs_deployment - Cloud Management deployments
//!
//! A deployment groups servers and arrays. Its `locked` flag is a remote
//! protection: the API refuses to delete a locked deployment, and the
//! provider relies on that rather than checking the flag itself.

use log::{info, warn};
use rsform_core::provider::{BoxFuture, ProviderError, ProviderResult, ResourceType};
use rsform_core::resource::{ResourceData, Value};
use rsform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{copy_fields, handle_not_found, locator};
use crate::rsc::{CM_NAMESPACE, Client, ClientResult, Fields, Locator};

const TYPE_NAME: &str = "rs_deployment";
const API_TYPE: &str = "deployment";

/// Allowed values of `server_tag_scope`; "" leaves the choice to the API
pub const SERVER_TAG_SCOPES: &[&str] = &["account", "deployment", ""];

fn validate_server_tag_scope(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if SERVER_TAG_SCOPES.contains(&s) => Ok(()),
        _ => Err(r#"server_tag_scope must be "account" or "deployment""#.to_string()),
    }
}

fn deployment_schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("A Cloud Management deployment")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_description("name of deployment"),
        )
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .with_description("description of deployment"),
        )
        .attribute(
            AttributeSchema::new("resource_group_href", AttributeType::String).with_description(
                "href of the Windows Azure Resource Group attached to the deployment",
            ),
        )
        .attribute(
            AttributeSchema::new("locked", AttributeType::Bool)
                .with_description("whether deployment is locked"),
        )
        .attribute(
            AttributeSchema::new(
                "server_tag_scope",
                AttributeType::Custom {
                    name: "ServerTagScope".to_string(),
                    base: Box::new(AttributeType::String),
                    validate: validate_server_tag_scope,
                },
            )
            .force_new()
            .with_input_default("deployment")
            .with_description("routing scope for tags for servers in the deployment"),
        )
}

/// The `rs_deployment` resource type
pub struct DeploymentType;

impl ResourceType for DeploymentType {
    type Meta = dyn Client;

    fn name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        deployment_schema()
    }

    fn create<'a>(
        &'a self,
        d: &'a mut ResourceData,
        client: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(create(d, client))
    }

    fn read<'a>(
        &'a self,
        d: &'a mut ResourceData,
        client: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(super::read(d, client))
    }

    fn update<'a>(
        &'a self,
        d: &'a mut ResourceData,
        client: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(update(d, client))
    }

    fn delete<'a>(
        &'a self,
        d: &'a mut ResourceData,
        client: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(super::delete(d, client))
    }

    fn exists<'a>(
        &'a self,
        d: &'a mut ResourceData,
        client: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<bool>> {
        Box::pin(super::exists(d, client))
    }
}

/// Create the deployment, then lock it if requested.
///
/// If locking fails the new deployment is deleted again (best effort) and
/// the lock error returned. The identifier is set last, so a failed create
/// never leaves the host believing the deployment exists.
async fn create(d: &mut ResourceData, client: &dyn Client) -> ProviderResult<()> {
    let must_lock = d.get_bool("locked");

    let res = client
        .create(CM_NAMESPACE, API_TYPE, deployment_fields(d))
        .await?;
    copy_fields(d, &res.fields);

    if must_lock {
        if let Err(err) = set_lock(client, &res.locator, true).await {
            if let Err(cleanup) = client.delete(&res.locator).await {
                warn!(
                    "Failed to delete {} after lock failure: {}",
                    res.locator, cleanup
                );
            }
            return Err(err.into());
        }
        d.set("locked", true)
            .map_err(|e| ProviderError::new(e.to_string()))?;
    }

    d.set_id(res.locator.to_string());
    info!("Created deployment {}", res.locator);
    Ok(())
}

/// Apply the lock flag first, then every other field.
///
/// Runs in partial mode: if the field update fails, the host still records
/// the lock change that already went through.
async fn update(d: &mut ResourceData, client: &dyn Client) -> ProviderResult<()> {
    d.partial(true);

    let loc = locator(d)?;

    if let Err(err) = set_lock(client, &loc, d.get_bool("locked")).await {
        return handle_not_found(d, err);
    }
    d.set_partial("locked");

    if let Err(err) = client.update(&loc, deployment_fields(d)).await {
        return handle_not_found(d, err);
    }

    d.partial(false);
    info!("Updated deployment {}", loc);
    Ok(())
}

/// Lock or unlock the deployment
async fn set_lock(client: &dyn Client, loc: &Locator, lock: bool) -> ClientResult<()> {
    if lock {
        client.run(loc, "@res.lock()").await
    } else {
        client.run(loc, "@res.unlock()").await
    }
}

/// Fields sent on create and update: the name always, the rest only when set
fn deployment_fields(d: &ResourceData) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::String(d.get_string("name")));
    for key in ["description", "resource_group_href", "server_tag_scope"] {
        if let Some(value) = d.get_ok(key) {
            fields.insert(key.to_string(), value.clone());
        }
    }
    fields
}
