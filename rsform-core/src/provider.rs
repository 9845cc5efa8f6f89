//! Provider - Traits abstracting resource lifecycle operations
//!
//! A [`ResourceType`] implements the lifecycle callbacks of one resource kind
//! against some remote client. A [`Provider`] bundles resource types together
//! with the configured client and dispatches host calls to them.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{ResourceData, ResourceId};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    /// Wrap an error, keeping its message verbatim
    pub fn from_cause(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(cause.to_string()).with_cause(cause)
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Downcast the cause to a concrete error type
    pub fn cause_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.cause.as_ref().and_then(|c| c.downcast_ref::<E>())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle callbacks of one resource kind.
///
/// `Meta` is whatever the provider hands every callback, usually its
/// configured API client.
pub trait ResourceType: Send + Sync {
    type Meta: ?Sized + Send + Sync;

    /// Resource type name (e.g., "rs_deployment")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;

    /// Create the remote resource. Sets the identifier only once every step succeeded.
    fn create<'a>(
        &'a self,
        d: &'a mut ResourceData,
        meta: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Refresh `d` from the remote resource. Clears the identifier if it is gone.
    fn read<'a>(
        &'a self,
        d: &'a mut ResourceData,
        meta: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn update<'a>(
        &'a self,
        d: &'a mut ResourceData,
        meta: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn delete<'a>(
        &'a self,
        d: &'a mut ResourceData,
        meta: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    fn exists<'a>(
        &'a self,
        d: &'a mut ResourceData,
        meta: &'a Self::Meta,
    ) -> BoxFuture<'a, ProviderResult<bool>>;
}

/// Main Provider trait
///
/// The host calls these for one resource instance at a time; the resource
/// type is taken from the schema carried by the [`ResourceData`].
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "rs")
    fn name(&self) -> &'static str;

    /// Schemas of every resource type this Provider can handle
    fn schemas(&self) -> Vec<ResourceSchema>;

    /// Schema of a single resource type
    fn schema(&self, resource_type: &str) -> Option<ResourceSchema> {
        self.schemas()
            .into_iter()
            .find(|s| s.resource_type == resource_type)
    }

    fn create<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn read<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn update<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn delete<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<()>>;

    fn exists<'a>(&'a self, d: &'a mut ResourceData) -> BoxFuture<'a, ProviderResult<bool>>;
}
