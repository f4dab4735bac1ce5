//! Compiler Configuration
//!
//! Recognized options controlling inference, repair, inlining and
//! validation strictness. Configuration is a plain value passed to the
//! compiler; nothing here is process-wide.
//!
//! # Example JSON
//!
//! ```json
//! {
//!   "naming_convention_tiebreak": true,
//!   "insertion_repair_enabled": true,
//!   "adapter_whitelist": ["file_to_string", "gunzip"]
//! }
//! ```

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Options recognized by the compiler pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Skip the port matcher entirely; every required input must be bound explicitly
    pub inference_disabled: bool,

    /// Break ties between type-compatible candidates by naming similarity
    pub naming_convention_tiebreak: bool,

    /// Insert whitelisted adapter steps to bridge unresolved inputs
    pub insertion_repair_enabled: bool,

    /// Flatten sub-workflows into the parent before emission
    pub inline_subworkflows: bool,

    /// Abort on ambiguous or unresolved bindings instead of warning
    pub strict_validation: bool,

    /// Adapters eligible for repair, in preference order (all catalog adapters if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_whitelist: Option<Vec<String>>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            inference_disabled: false,
            naming_convention_tiebreak: false,
            insertion_repair_enabled: false,
            inline_subworkflows: false,
            strict_validation: true,
            adapter_whitelist: None,
        }
    }
}

impl CompilerConfig {
    /// Loads a configuration from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        let config = Self::from_json(&content)?;
        info!("Loaded compiler configuration from {}", path.display());
        Ok(config)
    }

    /// Parses a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CompileError::Config(e.to_string()))
    }

    pub fn with_inference_disabled(mut self, disabled: bool) -> Self {
        self.inference_disabled = disabled;
        self
    }

    pub fn with_naming_tiebreak(mut self, enabled: bool) -> Self {
        self.naming_convention_tiebreak = enabled;
        self
    }

    pub fn with_insertion_repair(mut self, enabled: bool) -> Self {
        self.insertion_repair_enabled = enabled;
        self
    }

    pub fn with_inlining(mut self, enabled: bool) -> Self {
        self.inline_subworkflows = enabled;
        self
    }

    pub fn with_strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn with_adapter_whitelist(mut self, adapters: Vec<String>) -> Self {
        self.adapter_whitelist = Some(adapters);
        self
    }
}
