//! rsform Core
//!
//! Host-side model of a declarative infrastructure tool: resource data handed
//! to provider callbacks, attribute schemas, and the diff / plan / apply
//! runtime that drives providers one resource instance at a time.

pub mod differ;
pub mod effect;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
