//! Workflow Parser
//!
//! Loads workflow descriptions and job input values from YAML files.

use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde_yaml::{Mapping, Value};

use super::model::WorkflowDescription;
use crate::error::{CompileError, Result};

/// Parses a workflow description from YAML text.
///
/// `context` names the source (usually the file path) in error messages.
pub fn parse_workflow(yaml: &str, context: &str) -> Result<WorkflowDescription> {
    let description: WorkflowDescription = serde_yaml::from_str(yaml)
        .map_err(|e| CompileError::parse(context, format!("{}. Check the file format.", e)))?;

    if description.is_empty() {
        warn!("Workflow '{}' has no steps", context);
    }
    Ok(description)
}

/// Loads a workflow description from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use wic::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let description = load_workflow("align.wic")?;
///     println!("Loaded {} steps", description.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: impl AsRef<Path>) -> Result<WorkflowDescription> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let yaml_content = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let description = parse_workflow(&yaml_content, &path.display().to_string())?;
    info!(
        "Parsed {} steps, {} inputs, {} outputs",
        description.steps.len(),
        description.inputs.len(),
        description.outputs.len()
    );
    Ok(description)
}

/// Loads the values file supplied for workflow inputs.
///
/// An empty file yields an empty mapping.
pub fn load_input_values(path: impl AsRef<Path>) -> Result<Mapping> {
    let path = path.as_ref();
    info!("Loading input values from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
    let value: Value = serde_yaml::from_str(&content)
        .map_err(|e| CompileError::parse(path.display().to_string(), e))?;

    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => Ok(map),
        _ => Err(CompileError::parse(
            path.display().to_string(),
            "input values must be a mapping of input names to values",
        )),
    }
}

/// Derives the workflow name from its file name (`align.wic` -> `align`).
pub fn workflow_name(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("workflow")
        .to_string()
}

/// Writes generated text to a file, creating parent directories.
pub fn save_text(path: impl AsRef<Path>, content: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CompileError::io(parent, e))?;
    }
    fs::write(path, content).map_err(|e| CompileError::io(path, e))?;
    info!("Wrote {}", path.display());
    Ok(())
}
