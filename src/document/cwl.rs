//! CWL Workflow Document
//!
//! Serde model of the emitted CWL v1.2 `Workflow`. Field order in these
//! structs is the field order of the YAML output, and every list keeps the
//! graph's order, so serialization is deterministic.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::compiler::dag::{Endpoint, GraphShape};
use crate::error::{CompileError, Result};

pub const CWL_VERSION: &str = "v1.2";

/// Namespace of the `wic:` extension fields.
pub const WIC_NAMESPACE: &str = "https://github.com/PolusAI/workflow-inference-compiler#";

pub const EDAM_NAMESPACE: &str = "https://edamontology.org/";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlWorkflow {
    /// Only set on the top-level document
    #[serde(rename = "cwlVersion", default, skip_serializing_if = "Option::is_none")]
    pub cwl_version: Option<String>,

    pub class: String,

    #[serde(rename = "$namespaces", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespaces: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,

    #[serde(default)]
    pub inputs: Vec<CwlInput>,

    #[serde(default)]
    pub outputs: Vec<CwlOutput>,

    #[serde(default)]
    pub steps: Vec<CwlStep>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Requirement {
    pub class: String,
}

impl Requirement {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlInput {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlOutput {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: Value,
    #[serde(rename = "outputSource")]
    pub output_source: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlStep {
    pub id: String,
    pub run: RunRef,
    #[serde(rename = "in", default)]
    pub inputs: Vec<CwlStepInput>,
    #[serde(default)]
    pub out: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scatter: Vec<String>,
    #[serde(rename = "scatterMethod", default, skip_serializing_if = "Option::is_none")]
    pub scatter_method: Option<String>,
    /// Parallel stage; steps sharing a stage are independent
    #[serde(rename = "wic:stage", default)]
    pub stage: usize,
    #[serde(rename = "wic:inserted", default, skip_serializing_if = "is_false")]
    pub inserted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A step's `run:`: a tool path or an embedded sub-workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RunRef {
    Path(String),
    Inline(Box<CwlWorkflow>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlStepInput {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "linkMerge", default, skip_serializing_if = "Option::is_none")]
    pub link_merge: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum SourceRef {
    One(String),
    Many(Vec<String>),
}

impl SourceRef {
    pub fn references(&self) -> Vec<&str> {
        match self {
            Self::One(reference) => vec![reference.as_str()],
            Self::Many(references) => references.iter().map(String::as_str).collect(),
        }
    }
}

fn endpoint(reference: &str) -> Endpoint {
    match reference.split_once('/') {
        Some((step, port)) => Endpoint::Step {
            step: step.to_string(),
            port: port.to_string(),
        },
        None => Endpoint::Input(reference.to_string()),
    }
}

impl CwlWorkflow {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| CompileError::Emit(e.to_string()))
    }

    pub fn step(&self, id: &str) -> Option<&CwlStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Recovers the node and edge sets of the top-level graph.
    pub fn shape(&self) -> GraphShape {
        let mut edges = BTreeSet::new();
        for step in &self.steps {
            for input in &step.inputs {
                let Some(source) = &input.source else {
                    continue;
                };
                for reference in source.references() {
                    edges.insert((
                        endpoint(reference),
                        Endpoint::Step {
                            step: step.id.clone(),
                            port: input.id.clone(),
                        },
                    ));
                }
            }
        }
        for output in &self.outputs {
            edges.insert((
                endpoint(&output.output_source),
                Endpoint::Output(output.id.clone()),
            ));
        }

        GraphShape {
            nodes: self.steps.iter().map(|s| s.id.clone()).collect(),
            edges,
        }
    }
}

/// Parses an emitted document back into its model.
pub fn parse_document(yaml: &str) -> Result<CwlWorkflow> {
    let document: CwlWorkflow =
        serde_yaml::from_str(yaml).map_err(|e| CompileError::parse("CWL document", e))?;
    if document.class != "Workflow" {
        return Err(CompileError::parse(
            "CWL document",
            format!("expected class Workflow, found {}", document.class),
        ));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - {id: reads, type: File}
outputs:
  - {id: sorted, type: File, outputSource: sort/sorted}
steps:
  - id: align
    run: bowtie2.cwl
    in:
      - {id: reads, source: reads}
      - {id: threads, default: 4}
    out: [alignment]
    wic:stage: 0
  - id: sort
    run: samtools_sort.cwl
    in:
      - {id: alignment, source: [align/alignment], linkMerge: merge_nested}
    out: [sorted]
    wic:stage: 1
"#;

    #[test]
    fn test_parse_document() {
        let document = parse_document(DOCUMENT).unwrap();
        assert_eq!(document.cwl_version.as_deref(), Some("v1.2"));
        assert_eq!(document.steps.len(), 2);
        assert_eq!(document.step("sort").unwrap().stage, 1);
        assert_eq!(document.steps[0].run, RunRef::Path("bowtie2.cwl".to_string()));
        assert!(document.steps[0].inputs[1].source.is_none());
    }

    #[test]
    fn test_shape() {
        let shape = parse_document(DOCUMENT).unwrap().shape();
        assert_eq!(shape.nodes.len(), 2);
        assert_eq!(shape.edges.len(), 3);
        assert!(shape.edges.contains(&(
            Endpoint::Step {
                step: "align".to_string(),
                port: "alignment".to_string()
            },
            Endpoint::Step {
                step: "sort".to_string(),
                port: "alignment".to_string()
            }
        )));
        assert!(shape.edges.contains(&(
            Endpoint::Input("reads".to_string()),
            Endpoint::Step {
                step: "align".to_string(),
                port: "reads".to_string()
            }
        )));
    }

    #[test]
    fn test_rejects_other_classes() {
        assert!(parse_document("class: CommandLineTool\n").is_err());
        assert!(parse_document("[not, a, document]").is_err());
    }

    #[test]
    fn test_inserted_flag_is_omitted_when_false() {
        let step = CwlStep {
            id: "a".to_string(),
            run: RunRef::Path("a.cwl".to_string()),
            inputs: Vec::new(),
            out: Vec::new(),
            scatter: Vec::new(),
            scatter_method: None,
            stage: 0,
            inserted: false,
        };
        let yaml = serde_yaml::to_string(&step).unwrap();
        assert!(!yaml.contains("wic:inserted"));
        assert!(yaml.contains("wic:stage: 0"));
    }
}
