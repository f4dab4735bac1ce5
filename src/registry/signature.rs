//! Tool and Sub-workflow Signatures
//!
//! A signature is the ordered list of typed input and output ports a
//! catalog entry exposes. Ports are declared in YAML as an ordered mapping:
//!
//! ```yaml
//! inputs:
//!   reads: File
//!   threads: {type: int, default: 4}
//!   reference: {type: File, format: edam:format_1929, naming: [genome]}
//! outputs:
//!   alignment: File
//! ```

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use super::types::PortType;
use crate::workflow::model::WorkflowDescription;

/// A single declared port of a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDecl {
    pub name: String,
    pub ty: PortType,
    /// Declared with `?` or as a union with `null`
    pub optional: bool,
    /// Default value used when the port is left unbound
    pub default: Option<Value>,
    /// Extra naming-convention tokens used by the inference tie-break
    pub naming: Vec<String>,
}

impl PortDecl {
    pub fn new(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            default: None,
            naming: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// A port must be bound unless it is optional or has a default.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Parses one port declaration from its YAML value.
    pub fn from_yaml(name: &str, value: &Value) -> Result<Self, String> {
        let mut decl = match value {
            Value::Mapping(map) if map.contains_key("type") => {
                let type_value = map.get("type").cloned().unwrap_or(Value::Null);
                let mut type_map = Mapping::new();
                type_map.insert("type".into(), type_value);
                if let Some(format) = map.get("format") {
                    type_map.insert("format".into(), format.clone());
                }
                if let Some(items) = map.get("items") {
                    type_map.insert("items".into(), items.clone());
                }
                if let Some(fields) = map.get("fields") {
                    type_map.insert("fields".into(), fields.clone());
                }
                let spec = PortType::from_yaml(&Value::Mapping(type_map))?;

                let naming = match map.get("naming") {
                    None => Vec::new(),
                    Some(Value::String(token)) => vec![token.clone()],
                    Some(Value::Sequence(tokens)) => tokens
                        .iter()
                        .map(|t| t.as_str().map(str::to_string).ok_or("naming tokens must be strings"))
                        .collect::<Result<_, _>>()?,
                    Some(_) => return Err(format!("port '{}': invalid naming metadata", name)),
                };

                Self {
                    name: name.to_string(),
                    ty: spec.ty,
                    optional: spec.optional,
                    default: map.get("default").cloned(),
                    naming,
                }
            }
            other => {
                let spec = PortType::from_yaml(other).map_err(|e| format!("port '{}': {}", name, e))?;
                Self {
                    name: name.to_string(),
                    ty: spec.ty,
                    optional: spec.optional,
                    default: None,
                    naming: Vec::new(),
                }
            }
        };
        decl.name = name.trim().to_string();
        Ok(decl)
    }
}

/// Deserializes an ordered `name: type` mapping into port declarations.
pub(crate) fn port_map<'de, D>(deserializer: D) -> Result<Vec<PortDecl>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = Option::<Mapping>::deserialize(deserializer)?.unwrap_or_default();
    map.iter()
        .map(|(key, value)| {
            let name = key
                .as_str()
                .ok_or_else(|| <D::Error as de::Error>::custom("port names must be strings"))?;
            PortDecl::from_yaml(name, value).map_err(de::Error::custom)
        })
        .collect()
}

/// The ordered input and output ports of a catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub id: String,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
}

impl Signature {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, port: PortDecl) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: PortDecl) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn input(&self, name: &str) -> Option<&PortDecl> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PortDecl> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// Kind of a catalog entry, carried onto steps and graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    LeafTool,
    SubWorkflow,
    Adapter,
}

/// A concrete command-line tool (or adapter) backed by a CWL file.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafTool {
    pub signature: Signature,
    /// Path of the tool's CWL document, as referenced from `run:`
    pub run: String,
}

impl LeafTool {
    pub fn new(signature: Signature) -> Self {
        let run = format!("{}.cwl", signature.id);
        Self { signature, run }
    }

    pub fn with_run(mut self, run: impl Into<String>) -> Self {
        self.run = run.into();
        self
    }
}

/// A workflow description that other workflows may call as a step.
#[derive(Debug, Clone)]
pub struct SubWorkflow {
    pub signature: Signature,
    pub description: WorkflowDescription,
}

impl SubWorkflow {
    /// Derives the signature from the description's declared inputs and outputs.
    pub fn new(id: impl Into<String>, description: WorkflowDescription) -> Self {
        let signature = Signature {
            id: id.into(),
            inputs: description.inputs.clone(),
            outputs: description.outputs.iter().map(|o| o.port.clone()).collect(),
        };
        Self {
            signature,
            description,
        }
    }
}

/// Closed set of things a step may invoke.
#[derive(Debug, Clone)]
pub enum CatalogEntry {
    LeafTool(LeafTool),
    Adapter(LeafTool),
    SubWorkflow(SubWorkflow),
}

impl CatalogEntry {
    pub fn signature(&self) -> &Signature {
        match self {
            Self::LeafTool(tool) | Self::Adapter(tool) => &tool.signature,
            Self::SubWorkflow(sub) => &sub.signature,
        }
    }

    pub fn id(&self) -> &str {
        &self.signature().id
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::LeafTool(_) => ToolKind::LeafTool,
            Self::Adapter(_) => ToolKind::Adapter,
            Self::SubWorkflow(_) => ToolKind::SubWorkflow,
        }
    }

    /// The `run:` path for leaf tools and adapters.
    pub fn run_path(&self) -> Option<&str> {
        match self {
            Self::LeafTool(tool) | Self::Adapter(tool) => Some(&tool.run),
            Self::SubWorkflow(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Ports {
        #[serde(default, deserialize_with = "port_map")]
        inputs: Vec<PortDecl>,
    }

    #[test]
    fn test_port_map_preserves_order() {
        let ports: Ports = serde_yaml::from_str(
            r#"
inputs:
  zeta: File
  alpha: int
  mid: string?
"#,
        )
        .unwrap();
        let names: Vec<_> = ports.inputs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(ports.inputs[2].optional);
        assert!(!ports.inputs[2].is_required());
    }

    #[test]
    fn test_port_long_form() {
        let value: Value = serde_yaml::from_str(
            "{type: File, format: edam:format_1929, default: ref.fa, naming: [genome, reference]}",
        )
        .unwrap();
        let decl = PortDecl::from_yaml("ref", &value).unwrap();
        assert_eq!(
            decl.ty,
            PortType::File {
                format: Some("edam:format_1929".to_string())
            }
        );
        assert_eq!(decl.naming, vec!["genome", "reference"]);
        assert!(decl.default.is_some());
        assert!(!decl.is_required());
    }

    #[test]
    fn test_port_array_long_form() {
        let value: Value = serde_yaml::from_str("{type: array, items: int}").unwrap();
        let decl = PortDecl::from_yaml("counts", &value).unwrap();
        assert_eq!(decl.ty.to_string(), "int[]");
        assert!(decl.is_required());
    }

    #[test]
    fn test_port_invalid_type() {
        let value: Value = serde_yaml::from_str("Integer").unwrap();
        let err = PortDecl::from_yaml("n", &value).unwrap_err();
        assert!(err.contains("port 'n'"));
    }

    #[test]
    fn test_catalog_entry_accessors() {
        let sig = Signature::new("gunzip")
            .with_input(PortDecl::new("archive", PortType::file()))
            .with_output(PortDecl::new("file", PortType::file()));
        let entry = CatalogEntry::Adapter(LeafTool::new(sig));

        assert_eq!(entry.id(), "gunzip");
        assert_eq!(entry.kind(), ToolKind::Adapter);
        assert_eq!(entry.run_path(), Some("gunzip.cwl"));
        assert!(entry.signature().input("archive").is_some());
        assert!(entry.signature().output("missing").is_none());
    }
}
