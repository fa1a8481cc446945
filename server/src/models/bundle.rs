//! Bundle documents

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;

/// A decoded bundle document.
///
/// The deployer treats the contents as opaque; only the backends look
/// inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle(serde_json::Value);

impl Bundle {
    pub fn new(document: serde_json::Value) -> Self {
        Self(document)
    }

    /// Pick the bundle called `name` out of a YAML file holding one or more
    /// bundles keyed by name.
    pub fn from_yaml_file(contents: &str, name: &str) -> Result<Self, DeployerError> {
        let bundles: serde_json::Value = serde_yaml::from_str(contents)?;
        let bundles = bundles.as_object().ok_or_else(|| {
            DeployerError::InvalidRequest("invalid YAML contents: expected a mapping".to_string())
        })?;
        bundles
            .get(name)
            .cloned()
            .map(Self)
            .ok_or_else(|| DeployerError::InvalidRequest(format!("bundle {} not found", name)))
    }

    pub fn document(&self) -> &serde_json::Value {
        &self.0
    }

    /// Serialize back to YAML for external tooling
    pub fn to_yaml(&self) -> Result<String, DeployerError> {
        Ok(serde_yaml::to_string(&self.0)?)
    }
}
