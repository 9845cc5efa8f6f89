//! rsc - Client contract for the RightScale APIs
//!
//! Remote resources are addressed by a [`Locator`] (namespace + href) and
//! carry their attributes as [`Fields`]. Lifecycle callbacks only ever talk
//! to the [`Client`] trait; [`HttpClient`] is the real implementation.

mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use http::HttpClient;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use rsform_core::provider::ProviderError;
use rsform_core::resource::Value;
use thiserror::Error;

/// Cloud Management API namespace
pub const CM_NAMESPACE: &str = "rs_cm";

/// Attribute name to value mapping sent to and received from the API
pub type Fields = BTreeMap<String, Value>;

/// Address of a remote resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    /// API namespace (e.g., "rs_cm")
    pub namespace: String,
    /// Resource href (e.g., "/api/deployments/42")
    pub href: String,
}

impl Locator {
    pub fn new(namespace: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            href: href.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.href)
    }
}

/// A remote resource as returned by the API
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResource {
    pub locator: Locator,
    pub fields: Fields,
}

/// Errors returned by a [`Client`]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The resource does not exist
    #[error("resource not found")]
    NotFound,

    /// The API answered with a non-success status
    #[error("{method} {href} failed with status {status}: {message}")]
    Api {
        method: String,
        href: String,
        status: u16,
        message: String,
    },

    /// The namespace has no client support
    #[error("unsupported namespace {0:?}")]
    UnsupportedNamespace(String),

    /// The request cannot be expressed against the API
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// OAuth token exchange failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an unexpected body
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client errors reach the host verbatim
impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        ProviderError::from_cause(err)
    }
}

/// Operations the provider needs from a RightScale API client
#[async_trait]
pub trait Client: Send + Sync {
    /// Create a resource of `type_name` in `namespace`, returning it with its canonical locator
    async fn create(
        &self,
        namespace: &str,
        type_name: &str,
        fields: Fields,
    ) -> ClientResult<RemoteResource>;

    /// Retrieve a resource. Fails with [`ClientError::NotFound`] if it is gone.
    async fn get(&self, locator: &Locator) -> ClientResult<RemoteResource>;

    /// Update the fields of a resource
    async fn update(&self, locator: &Locator, fields: Fields) -> ClientResult<()>;

    /// Delete a resource
    async fn delete(&self, locator: &Locator) -> ClientResult<()>;

    /// Run an RCL expression against a resource bound to `@res`
    async fn run(&self, locator: &Locator, rcl: &str) -> ClientResult<()>;
}
