//! Shared test fixtures for the compiler stages.

use crate::registry::signature::{CatalogEntry, LeafTool, PortDecl, Signature, SubWorkflow};
use crate::registry::types::PortType;
use crate::registry::Registry;
use crate::workflow::ast::Workflow;
use crate::workflow::builder::build_workflow;
use crate::workflow::model::WorkflowDescription;

/// Port declarations from `(name, shorthand type)` pairs.
pub(crate) fn ports(decls: &[(&str, &str)]) -> Vec<PortDecl> {
    decls
        .iter()
        .map(|(name, ty)| {
            let spec = PortType::parse(ty).unwrap();
            let mut decl = PortDecl::new(*name, spec.ty);
            decl.optional = spec.optional;
            decl
        })
        .collect()
}

fn signature(id: &str, inputs: &[(&str, &str)], outputs: &[(&str, &str)]) -> Signature {
    Signature {
        id: id.to_string(),
        inputs: ports(inputs),
        outputs: ports(outputs),
    }
}

pub(crate) fn tool(id: &str, inputs: &[(&str, &str)], outputs: &[(&str, &str)]) -> CatalogEntry {
    CatalogEntry::LeafTool(LeafTool::new(signature(id, inputs, outputs)))
}

pub(crate) fn adapter(id: &str, inputs: &[(&str, &str)], outputs: &[(&str, &str)]) -> CatalogEntry {
    CatalogEntry::Adapter(LeafTool::new(signature(id, inputs, outputs)))
}

pub(crate) fn sub_workflow(id: &str, yaml: &str) -> CatalogEntry {
    CatalogEntry::SubWorkflow(SubWorkflow::new(id, describe(yaml)))
}

pub(crate) fn registry(entries: Vec<CatalogEntry>) -> Registry {
    let mut registry = Registry::new();
    for entry in entries {
        registry.insert(entry).unwrap();
    }
    registry
}

pub(crate) fn describe(yaml: &str) -> WorkflowDescription {
    serde_yaml::from_str(yaml).unwrap()
}

pub(crate) fn build(registry: &Registry, yaml: &str) -> Workflow {
    build_workflow(registry, "main", &describe(yaml)).unwrap()
}
