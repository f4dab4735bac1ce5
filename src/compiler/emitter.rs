//! Document Emitter
//!
//! Serializes a validated [`Graph`] into a CWL v1.2 `Workflow`. This is a
//! pure function of the graph: steps appear in topological order, inputs and
//! outputs in declaration order, and requirements are derived from the
//! features the graph actually uses.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use super::dag::{Graph, Link, Node};
use crate::document::cwl::{
    CwlInput, CwlOutput, CwlStep, CwlStepInput, CwlWorkflow, Requirement, RunRef, SourceRef,
    CWL_VERSION, EDAM_NAMESPACE, WIC_NAMESPACE,
};
use crate::registry::types::PortType;
use crate::workflow::ast::{Port, Source};

const SCATTER_REQUIREMENT: &str = "ScatterFeatureRequirement";
const SUBWORKFLOW_REQUIREMENT: &str = "SubworkflowFeatureRequirement";
const MULTIPLE_INPUT_REQUIREMENT: &str = "MultipleInputFeatureRequirement";

/// Emits the top-level document for `graph`.
pub fn emit(graph: &Graph) -> CwlWorkflow {
    let mut features = BTreeSet::new();
    let mut formats = false;
    let mut document = emit_scope(graph, &mut features, &mut formats);

    document.cwl_version = Some(CWL_VERSION.to_string());
    document.requirements = features.into_iter().map(Requirement::new).collect();
    document
        .namespaces
        .insert("wic".to_string(), WIC_NAMESPACE.to_string());
    if formats {
        document
            .namespaces
            .insert("edam".to_string(), EDAM_NAMESPACE.to_string());
    }

    info!(
        "Emitted '{}': {} steps, {} requirements",
        graph.id,
        document.steps.len(),
        document.requirements.len()
    );
    document
}

fn emit_scope(graph: &Graph, features: &mut BTreeSet<&'static str>, formats: &mut bool) -> CwlWorkflow {
    let inputs = graph
        .inputs
        .iter()
        .map(|port| {
            let format = file_format(&port.ty);
            *formats |= format.is_some();
            CwlInput {
                id: port.name.clone(),
                ty: port.ty.to_cwl(port.optional),
                format,
                default: port.default.clone(),
            }
        })
        .collect();

    let outputs = graph
        .outputs
        .iter()
        .map(|output| CwlOutput {
            id: output.port.name.clone(),
            ty: output.port.ty.to_cwl(output.port.optional),
            output_source: reference(&output.source).unwrap_or_default(),
        })
        .collect();

    let steps = graph
        .nodes
        .iter()
        .map(|node| emit_step(node, features, formats))
        .collect();

    CwlWorkflow {
        cwl_version: None,
        class: "Workflow".to_string(),
        namespaces: BTreeMap::new(),
        requirements: Vec::new(),
        inputs,
        outputs,
        steps,
    }
}

fn emit_step(node: &Node, features: &mut BTreeSet<&'static str>, formats: &mut bool) -> CwlStep {
    let run = match &node.subgraph {
        Some(subgraph) => {
            features.insert(SUBWORKFLOW_REQUIREMENT);
            RunRef::Inline(Box::new(emit_scope(subgraph, features, formats)))
        }
        None => RunRef::Path(node.run.clone().unwrap_or_else(|| format!("{}.cwl", node.tool))),
    };

    let mut inputs = Vec::new();
    for input in &node.inputs {
        let Some(source) = &input.source else {
            continue;
        };
        let mut step_input = CwlStepInput {
            id: input.port.name.clone(),
            source: None,
            default: None,
            link_merge: None,
        };
        match source {
            Source::Literal(value) => step_input.default = Some(value.clone()),
            other => {
                let reference = reference(other).unwrap_or_default();
                if input.link == Link::Gather {
                    features.insert(MULTIPLE_INPUT_REQUIREMENT);
                    step_input.source = Some(SourceRef::Many(vec![reference]));
                    step_input.link_merge = Some("merge_nested".to_string());
                } else {
                    step_input.source = Some(SourceRef::One(reference));
                }
            }
        }
        inputs.push(step_input);
    }

    if !node.scatter.is_empty() {
        features.insert(SCATTER_REQUIREMENT);
    }
    debug!("Step '{}' emitted at stage {}", node.id, node.stage);

    CwlStep {
        id: node.id.clone(),
        run,
        inputs,
        out: node.outputs.iter().map(|p| p.name.clone()).collect(),
        scatter: node.scatter.clone(),
        scatter_method: (node.scatter.len() > 1).then(|| "dotproduct".to_string()),
        stage: node.stage,
        inserted: node.inserted,
    }
}

/// The CWL spelling of a step or workflow-input source.
fn reference(source: &Source) -> Option<String> {
    match source {
        Source::Step { step, port } => Some(format!("{}/{}", step, port)),
        Source::WorkflowInput(name) => Some(name.clone()),
        Source::Literal(_) => None,
    }
}

fn file_format(ty: &PortType) -> Option<String> {
    match ty {
        PortType::File { format } => format.clone(),
        PortType::Array(item) => file_format(item),
        _ => None,
    }
}

/// Declared interface of an emitted document as `(name, CWL type)` pairs,
/// inputs first.
pub fn interface(document: &CwlWorkflow) -> Vec<(String, serde_yaml::Value)> {
    document
        .inputs
        .iter()
        .map(|i| (i.id.clone(), i.ty.clone()))
        .chain(document.outputs.iter().map(|o| (o.id.clone(), o.ty.clone())))
        .collect()
}

/// CWL type of a port as written in the emitted document.
pub fn port_type(port: &Port) -> serde_yaml::Value {
    port.ty.to_cwl(port.optional)
}
