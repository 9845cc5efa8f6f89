//! rsform State Management
//!
//! Persists what the host knows about managed resources between runs:
//! their remote identifiers and last-read attributes.
//!
//! - **StateFile**: the persisted document containing all managed resources
//! - **StateBackend**: a trait for state storage backends
//! - **LocalBackend**: pretty-printed JSON on the local filesystem

pub mod backend;
pub mod backends;
pub mod state;

// Re-export main types for convenience
pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use state::{ResourceState, StateFile};
