//! Configuration file loading
//!
//! ```json
//! {
//!   "provider": { "refresh_token": "...", "account_id": 60073 },
//!   "resources": [
//!     { "type": "rs_deployment", "name": "web", "attributes": { "name": "web" } }
//!   ]
//! }
//! ```
//!
//! The `provider` block is optional; without it the provider is configured
//! from `RS_*` environment variables.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use rsform_core::resource::{Resource, Value};
use rsform_core::schema::ResourceSchema;
use rsform_provider_rs::ProviderConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

pub fn load_config(path: &Path) -> Result<ConfigFile, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse_config(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

pub fn parse_config(content: &str) -> Result<ConfigFile, String> {
    serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
}

impl ConfigFile {
    /// Provider settings from the file, falling back to the environment
    pub fn provider_config(&self) -> Result<ProviderConfig, String> {
        match &self.provider {
            Some(config) => {
                config
                    .validate()
                    .map_err(|e| format!("Invalid provider configuration: {}", e))?;
                Ok(config.clone())
            }
            None => ProviderConfig::from_env()
                .map_err(|e| format!("Invalid provider configuration: {}", e)),
        }
    }

    /// Desired resources with input defaults applied, validated against
    /// `schemas`. All problems are reported together.
    pub fn resources(
        &self,
        schemas: &HashMap<String, ResourceSchema>,
    ) -> Result<Vec<Resource>, String> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        let mut resources = Vec::new();

        for config in &self.resources {
            let label = format!("{}.{}", config.resource_type, config.name);
            let Some(schema) = schemas.get(&config.resource_type) else {
                errors.push(format!("{}: unknown resource type", label));
                continue;
            };
            if !seen.insert(label.clone()) {
                errors.push(format!("{}: declared more than once", label));
                continue;
            }

            let mut attributes = config.attributes.clone();
            schema.apply_input_defaults(&mut attributes);
            if let Err(type_errors) = schema.validate(&attributes) {
                for error in type_errors {
                    errors.push(format!("{}: {}", label, error));
                }
                continue;
            }

            let mut resource = Resource::new(&config.resource_type, &config.name);
            resource.attributes = attributes;
            resources.push(resource);
        }

        if errors.is_empty() {
            Ok(resources)
        } else {
            Err(errors.join("\n"))
        }
    }
}
