//! Resource types of the provider and the lifecycle handlers they share
//!
//! Every resource is identified on the host side by its locator rendered as
//! `namespace:href`. The handlers here parse it back, make one API call and
//! copy the returned fields onto the [`ResourceData`].

mod deployment;

pub use deployment::{DeploymentType, SERVER_TAG_SCOPES};

use log::debug;
use rsform_core::provider::{ProviderError, ProviderResult, ResourceType};
use rsform_core::resource::ResourceData;
use rsform_core::schema::ResourceSchema;

use crate::rsc::{Client, ClientError, Fields, Locator};

/// Lifecycle implementation of one resource type against the API client
pub type RsResourceType = Box<dyn ResourceType<Meta = dyn Client>>;

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<RsResourceType> {
    vec![Box::new(DeploymentType)]
}

/// Schemas of all resource types, available without a configured client
pub fn schemas() -> Vec<ResourceSchema> {
    resource_types().iter().map(|t| t.schema()).collect()
}

/// Parse a host identifier of the form `namespace:href`
pub fn parse_locator(id: &str) -> ProviderResult<Locator> {
    let parts: Vec<&str> = id.split(':').collect();
    if parts.len() != 2 {
        return Err(ProviderError::new(format!("invalid resource ID {:?}", id)));
    }
    Ok(Locator::new(parts[0], parts[1]))
}

/// Locator of the resource `d` describes
pub(crate) fn locator(d: &ResourceData) -> ProviderResult<Locator> {
    parse_locator(d.id())
}

/// Clear the identifier and swallow the error if the resource is gone,
/// otherwise return the error unchanged
pub(crate) fn handle_not_found(d: &mut ResourceData, err: ClientError) -> ProviderResult<()> {
    if err.is_not_found() {
        debug!("{} {} is gone, clearing its identifier", d.resource_type(), d.id());
        d.set_id("");
        return Ok(());
    }
    Err(err.into())
}

/// Copy remote fields onto `d`, skipping those the schema does not declare
pub(crate) fn copy_fields(d: &mut ResourceData, fields: &Fields) {
    for (key, value) in fields {
        if let Err(e) = d.set(key, value.clone()) {
            debug!("Ignoring field {} of {}: {}", key, d.resource_type(), e);
        }
    }
}

pub(crate) async fn read(d: &mut ResourceData, client: &dyn Client) -> ProviderResult<()> {
    let loc = locator(d)?;
    match client.get(&loc).await {
        Ok(res) => {
            copy_fields(d, &res.fields);
            Ok(())
        }
        Err(err) => handle_not_found(d, err),
    }
}

/// Whether the remote resource exists. Every client error propagates,
/// `NotFound` included; only `read` translates it.
pub(crate) async fn exists(d: &mut ResourceData, client: &dyn Client) -> ProviderResult<bool> {
    let loc = locator(d)?;
    client.get(&loc).await?;
    Ok(true)
}

/// Delete the remote resource. Fails as the API does, e.g. when it is locked.
pub(crate) async fn delete(d: &mut ResourceData, client: &dyn Client) -> ProviderResult<()> {
    let loc = locator(d)?;
    client.delete(&loc).await?;
    Ok(())
}
