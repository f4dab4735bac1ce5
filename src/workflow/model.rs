//! Workflow Description Model
//!
//! The user-authored, high-level workflow format. Steps name a catalog
//! entry and may bind some inputs explicitly; everything left unbound is
//! for the compiler to infer.
//!
//! # Example YAML Format
//!
//! ```yaml
//! inputs:
//!   reads: File
//!   index: Directory
//!
//! steps:
//!   - id: align
//!     tool: bowtie2
//!     in:
//!       index: {input: index}
//!       threads: 8
//!
//!   - id: sort
//!     tool: samtools_sort
//!     # `alignment` is inferred from align/alignment
//!
//! outputs:
//!   sorted: File
//! ```

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::registry::signature::{port_map, PortDecl};

/// An explicit binding written by the user.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSpec {
    /// `{source: step/port}` or `{source: workflow_input}`
    Source { source: String },
    /// `{input: workflow_input}`
    Input { input: String },
    /// Any other value is a literal
    Value(Value),
}

impl BindingSpec {
    pub fn source(reference: impl Into<String>) -> Self {
        Self::Source {
            source: reference.into(),
        }
    }

    pub fn input(name: impl Into<String>) -> Self {
        Self::Input { input: name.into() }
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    /// Classifies a YAML value. Only a single-key `source` or `input`
    /// mapping with a string value is a reference; anything else is literal.
    pub fn from_value(value: Value) -> Self {
        if let Value::Mapping(map) = &value {
            if map.len() == 1 {
                if let Some(Value::String(reference)) = map.get("source") {
                    return Self::source(reference.clone());
                }
                if let Some(Value::String(name)) = map.get("input") {
                    return Self::input(name.clone());
                }
            }
        }
        Self::Value(value)
    }
}

impl<'de> Deserialize<'de> for BindingSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// A single step of a workflow description.
#[derive(Deserialize, Debug, Clone)]
pub struct StepDescription {
    /// Unique identifier among sibling steps
    pub id: String,

    /// Catalog identifier of the tool, adapter or sub-workflow to invoke
    pub tool: String,

    /// Explicit input bindings, in declaration order
    #[serde(default, rename = "in", deserialize_with = "binding_map")]
    pub bindings: Vec<(String, BindingSpec)>,

    /// Input ports to scatter over
    #[serde(default, deserialize_with = "single_or_vec")]
    pub scatter: Vec<String>,
}

impl StepDescription {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            tool: tool.into().trim().to_string(),
            bindings: Vec::new(),
            scatter: Vec::new(),
        }
    }

    /// Adds an explicit binding for an input port.
    pub fn bind(mut self, port: impl Into<String>, spec: BindingSpec) -> Self {
        self.bindings.push((port.into(), spec));
        self
    }

    /// Marks an input port for scattering.
    pub fn scatter_over(mut self, port: impl Into<String>) -> Self {
        self.scatter.push(port.into());
        self
    }
}

/// A declared workflow output, optionally with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDescription {
    pub port: PortDecl,
    /// `step/port` or a workflow input name; inferred when absent
    pub source: Option<String>,
}

/// A complete workflow description.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct WorkflowDescription {
    #[serde(default, deserialize_with = "port_map")]
    pub inputs: Vec<PortDecl>,

    #[serde(default)]
    pub steps: Vec<StepDescription>,

    #[serde(default, deserialize_with = "output_map")]
    pub outputs: Vec<OutputDescription>,
}

impl WorkflowDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, port: PortDecl) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_step(mut self, step: StepDescription) -> Self {
        self.steps.push(step);
        self
    }

    /// Declares a workflow output; `source` of `None` leaves it to inference.
    pub fn with_output(mut self, port: PortDecl, source: Option<&str>) -> Self {
        self.outputs.push(OutputDescription {
            port,
            source: source.map(str::to_string),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Deserializes either a single string or array of strings into Vec<String>
fn single_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(de::Error::custom("Expected string in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

/// Deserializes the `in:` mapping, keeping declaration order.
fn binding_map<'de, D>(deserializer: D) -> Result<Vec<(String, BindingSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    map.into_iter()
        .map(|(key, value)| {
            let port = key
                .as_str()
                .ok_or_else(|| <D::Error as de::Error>::custom("input port names must be strings"))?
                .to_string();
            Ok((port, BindingSpec::from_value(value)))
        })
        .collect()
}

/// Deserializes workflow outputs: `name: Type` or `name: {type, source}`.
fn output_map<'de, D>(deserializer: D) -> Result<Vec<OutputDescription>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    map.iter()
        .map(|(key, value)| {
            let name = key
                .as_str()
                .ok_or_else(|| <D::Error as de::Error>::custom("output names must be strings"))?;
            let source = value
                .get("source")
                .map(|s| {
                    s.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| {
                            <D::Error as de::Error>::custom(format!(
                                "output '{}': source must be a string",
                                name
                            ))
                        })
                })
                .transpose()?;
            let port =
                PortDecl::from_yaml(name, value).map_err(<D::Error as de::Error>::custom)?;
            Ok(OutputDescription { port, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::PortType;

    #[test]
    fn test_parse_description() {
        let yaml = r#"
inputs:
  reads: File
steps:
  - id: align
    tool: bowtie2
    in:
      reads: {input: reads}
      threads: 8
      index: {source: fetch/index}
  - id: sort
    tool: samtools_sort
    scatter: alignment
outputs:
  sorted: File
  log: {type: File, source: align/log}
"#;
        let description: WorkflowDescription = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(description.len(), 2);
        assert_eq!(description.inputs[0].ty, PortType::file());

        let align = &description.steps[0];
        assert_eq!(align.bindings.len(), 3);
        assert_eq!(align.bindings[0], ("reads".to_string(), BindingSpec::input("reads")));
        match &align.bindings[1].1 {
            BindingSpec::Value(v) => assert_eq!(v.as_i64(), Some(8)),
            other => panic!("Expected literal, got {:?}", other),
        }
        assert_eq!(align.bindings[2].1, BindingSpec::source("fetch/index"));

        assert_eq!(description.steps[1].scatter, vec!["alignment"]);
        assert_eq!(description.outputs[0].source, None);
        assert_eq!(description.outputs[1].source.as_deref(), Some("align/log"));
    }

    #[test]
    fn test_literal_sequence_is_not_a_reference() {
        let value: Value = serde_yaml::from_str("[reads]").unwrap();
        assert!(matches!(BindingSpec::from_value(value), BindingSpec::Value(_)));

        let value: Value = serde_yaml::from_str("{source: a/b, extra: 1}").unwrap();
        assert!(matches!(BindingSpec::from_value(value), BindingSpec::Value(_)));
    }

    #[test]
    fn test_binding_order_preserved() {
        let yaml = r#"
id: s
tool: t
in:
  zeta: 1
  alpha: 2
"#;
        let step: StepDescription = serde_yaml::from_str(yaml).unwrap();
        let ports: Vec<_> = step.bindings.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(ports, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_scatter_list() {
        let yaml = "id: s\ntool: t\nscatter: [a, b]\n";
        let step: StepDescription = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.scatter, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_tool_is_error() {
        let yaml = "steps:\n  - id: s\n";
        assert!(serde_yaml::from_str::<WorkflowDescription>(yaml).is_err());
    }

    #[test]
    fn test_builder() {
        let description = WorkflowDescription::new()
            .with_input(PortDecl::new("x", PortType::file()))
            .with_step(StepDescription::new(" a ", "tool").bind("in", BindingSpec::input("x")))
            .with_output(PortDecl::new("y", PortType::file()), Some("a/out"));

        assert_eq!(description.steps[0].id, "a");
        assert_eq!(description.outputs[0].source.as_deref(), Some("a/out"));
        assert!(!description.is_empty());
    }
}
