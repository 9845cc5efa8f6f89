//! rsform RightScale Provider
//!
//! Manages Cloud Management resources through the RightScale 1.5 API.
//!
//! ## Module Structure
//!
//! - `config` - Provider configuration (host, credentials, account)
//! - `rsc` - API client contract and its HTTP implementation
//! - `resources` - Resource types and their lifecycle callbacks

pub mod config;
pub mod resources;
pub mod rsc;

use std::sync::Arc;

pub use config::{ConfigError, ProviderConfig};
pub use resources::{parse_locator, resource_types, schemas};
pub use rsc::{Client, ClientError, HttpClient, Locator};

use rsform_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult};
use rsform_core::resource::ResourceData;
use rsform_core::schema::ResourceSchema;

use resources::RsResourceType;

/// RightScale Provider
pub struct RsProvider {
    client: Arc<dyn Client>,
    resource_types: Vec<RsResourceType>,
}

impl RsProvider {
    /// Create a provider talking to the API described by `config`
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::from_cause)?;
        let client = HttpClient::new(config)?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create a provider on top of an existing client
    pub fn with_client(client: Arc<dyn Client>) -> Self {
        Self {
            client,
            resource_types: resource_types(),
        }
    }

    fn resource_type(&self, d: &ResourceData) -> ProviderResult<&RsResourceType> {
        self.resource_types
            .iter()
            .find(|t| t.name() == d.resource_type())
            .ok_or_else(|| {
                ProviderError::new(format!("Unknown resource type: {}", d.resource_type()))
            })
    }
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for RsProvider {
    fn name(&self) -> &'static str {
        "rs"
    }

    fn schemas(&self) -> Vec<ResourceSchema> {
        self.resource_types.iter().map(|t| t.schema()).collect()
    }

    fn create<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let resource_type = self.resource_type(d)?;
            resource_type.create(d, self.client.as_ref()).await
        })
    }

    fn read<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let resource_type = self.resource_type(d)?;
            resource_type.read(d, self.client.as_ref()).await
        })
    }

    fn update<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let resource_type = self.resource_type(d)?;
            resource_type.update(d, self.client.as_ref()).await
        })
    }

    fn delete<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            let resource_type = self.resource_type(d)?;
            resource_type.delete(d, self.client.as_ref()).await
        })
    }

    fn exists<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<bool>> {
        Box::pin(async move {
            let resource_type = self.resource_type(d)?;
            resource_type.exists(d, self.client.as_ref()).await
        })
    }
}
