//! Engine configuration
//!
//! Every field has a default, so a partial JSON file is valid and a missing
//! file means "use defaults".

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::host::FailureKind;

/// How an expected failure kind gets resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Apply the host's default resolution
    DefaultResolution,
    /// Delete the elements the failure points at
    DeleteAffected,
}

/// A failure kind the caller anticipates and knows how to fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedFailure {
    pub kind: FailureKind,
    pub action: ResolutionAction,
}

impl ExpectedFailure {
    pub fn new(kind: impl Into<String>, action: ResolutionAction) -> Self {
        Self {
            kind: FailureKind::new(kind),
            action,
        }
    }
}

/// Failure resolution policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePolicyConfig {
    /// Expected failure kinds, resolved first and in this order
    #[serde(default)]
    pub expected: Vec<ExpectedFailure>,
    /// Hard cap on re-validation cycles per commit
    #[serde(default = "default_max_retry_cycles")]
    pub max_retry_cycles: u32,
    /// Dismiss warning-level failures instead of letting the host show them
    #[serde(default = "default_true")]
    pub dismiss_warnings: bool,
}

fn default_max_retry_cycles() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

fn default_transaction_name() -> String {
    "Reconcile graph".to_string()
}

impl Default for FailurePolicyConfig {
    fn default() -> Self {
        Self {
            expected: Vec::new(),
            max_retry_cycles: default_max_retry_cycles(),
            dismiss_warnings: true,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Name given to the per-pass host transaction
    #[serde(default = "default_transaction_name")]
    pub transaction_name: String,
    /// Pin elements the graph creates or reuses
    #[serde(default = "default_true")]
    pub pin_elements: bool,
    /// Delete a failing node's previous element so it is not orphaned
    #[serde(default = "default_true")]
    pub delete_on_node_failure: bool,
    /// Failure resolution policy
    #[serde(default)]
    pub failure: FailurePolicyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_name: default_transaction_name(),
            pin_elements: true,
            delete_on_node_failure: true,
            failure: FailurePolicyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, or defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Engine configuration saved to {:?}", path);
        Ok(())
    }
}
