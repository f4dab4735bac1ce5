//! Job Inputs
//!
//! Builds the CWL job file (`<name>_inputs.yml`) from the values the user
//! supplied for workflow inputs. File and Directory inputs given as plain
//! paths become `{class, path}` objects.

use log::warn;
use serde_yaml::{Mapping, Value};

use crate::registry::types::PortType;
use crate::workflow::ast::Port;

/// The job mapping plus what was wrong with the supplied values.
#[derive(Debug, Clone, Default)]
pub struct JobInputs {
    pub values: Mapping,
    /// Required inputs with neither a value nor a default
    pub missing: Vec<String>,
    /// Supplied keys that are not workflow inputs
    pub unknown: Vec<String>,
}

impl JobInputs {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.values)
    }
}

/// Matches supplied values against the workflow's inputs, in input order.
pub fn job_inputs(inputs: &[Port], supplied: &Mapping) -> JobInputs {
    let mut job = JobInputs::default();

    for input in inputs {
        let value = supplied
            .get(input.name.as_str())
            .or(input.default.as_ref())
            .cloned();
        match value {
            Some(value) => {
                job.values
                    .insert(Value::String(input.name.clone()), to_job_value(&input.ty, value));
            }
            None if input.is_required() => {
                warn!("No value supplied for required input '{}'", input.name);
                job.missing.push(input.name.clone());
            }
            None => {}
        }
    }

    for key in supplied.keys() {
        let name = key.as_str().map(str::to_string).unwrap_or_else(|| format!("{:?}", key));
        if !inputs.iter().any(|i| i.name == name) {
            warn!("Ignoring value for unknown input '{}'", name);
            job.unknown.push(name);
        }
    }
    job
}

fn to_job_value(ty: &PortType, value: Value) -> Value {
    match (ty, value) {
        (PortType::File { .. }, Value::String(path)) => location("File", path),
        (PortType::Directory, Value::String(path)) => location("Directory", path),
        (PortType::Array(item), Value::Sequence(items)) => Value::Sequence(
            items
                .into_iter()
                .map(|v| to_job_value(item, v))
                .collect(),
        ),
        (_, value) => value,
    }
}

fn location(class: &str, path: String) -> Value {
    let mut map = Mapping::new();
    map.insert("class".into(), class.into());
    map.insert("path".into(), Value::String(path));
    Value::Mapping(map)
}
