//! Workflow AST
//!
//! The intermediate representation the compiler passes between stages.
//! AST values are created once by the builder; afterwards only implicit
//! bindings and scatter sets are filled in, and every pass returns a new
//! [`Workflow`] snapshot rather than editing its input.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_yaml::Value;

use crate::compiler::naming::port_tokens;
use crate::registry::signature::{CatalogEntry, PortDecl, ToolKind};
use crate::registry::types::PortType;

/// Direction of a port relative to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// A typed, named slot on a step or on a workflow boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub name: String,
    pub direction: Direction,
    pub ty: PortType,
    /// `None` for workflow-level inputs and outputs
    pub owning_step: Option<String>,
    /// Normalized name tokens plus any declared naming metadata
    pub naming_tokens: Vec<String>,
    pub optional: bool,
    pub default: Option<Value>,
}

impl Port {
    /// Instantiates a declared port for an owner.
    pub fn from_decl(decl: &PortDecl, direction: Direction, owning_step: Option<&str>) -> Self {
        Self {
            name: decl.name.clone(),
            direction,
            ty: decl.ty.clone(),
            owning_step: owning_step.map(str::to_string),
            naming_tokens: port_tokens(&decl.name, &decl.naming),
            optional: decl.optional,
            default: decl.default.clone(),
        }
    }

    /// A port must be bound unless it is optional or has a default.
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}

/// Where a bound input gets its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// An output port of an earlier sibling step
    Step { step: String, port: String },
    /// An input of the enclosing workflow
    WorkflowInput(String),
    /// A literal value
    Literal(Value),
}

impl Source {
    pub fn step(step: impl Into<String>, port: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            port: port.into(),
        }
    }

    /// Parses `step/port` or a bare workflow input name.
    pub fn parse_reference(reference: &str) -> Result<Self, String> {
        let reference = reference.trim();
        match reference.split_once('/') {
            Some((step, port)) if !step.is_empty() && !port.is_empty() && !port.contains('/') => {
                Ok(Self::step(step, port))
            }
            Some(_) => Err(format!("malformed source reference '{}'", reference)),
            None if reference.is_empty() => Err("empty source reference".to_string()),
            None => Ok(Self::WorkflowInput(reference.to_string())),
        }
    }

    /// Returns the producing step, if this source is a step output.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step { step, port } => write!(f, "{}/{}", step, port),
            Self::WorkflowInput(name) => f.write_str(name),
            Self::Literal(value) => {
                let text = serde_yaml::to_string(value).unwrap_or_default();
                write!(f, "literal {}", text.trim())
            }
        }
    }
}

/// A step node of the AST.
#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    /// Catalog identifier of the invoked entry
    pub signature_ref: String,
    pub kind: ToolKind,
    /// `run:` path for leaf tools and adapters
    pub run: Option<String>,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    /// Bindings written by the user
    pub explicit_bindings: BTreeMap<String, Source>,
    /// Bindings filled in by inference and repair
    pub implicit_bindings: BTreeMap<String, Source>,
    /// Input ports this step scatters over
    pub scatter: BTreeSet<String>,
    /// Index among sibling steps; fixes causal order
    pub position: usize,
    /// Inserted by step-insertion repair
    pub inserted: bool,
    /// Callee AST for sub-workflow steps
    pub body: Option<Box<Workflow>>,
}

impl Step {
    /// Instantiates a step for a catalog entry.
    pub fn from_entry(id: &str, entry: &CatalogEntry, position: usize) -> Self {
        let signature = entry.signature();
        Self {
            id: id.to_string(),
            signature_ref: signature.id.clone(),
            kind: entry.kind(),
            run: entry.run_path().map(str::to_string),
            inputs: signature
                .inputs
                .iter()
                .map(|d| Port::from_decl(d, Direction::In, Some(id)))
                .collect(),
            outputs: signature
                .outputs
                .iter()
                .map(|d| Port::from_decl(d, Direction::Out, Some(id)))
                .collect(),
            explicit_bindings: BTreeMap::new(),
            implicit_bindings: BTreeMap::new(),
            scatter: BTreeSet::new(),
            position,
            inserted: false,
            body: None,
        }
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// The binding of an input port; explicit bindings win.
    pub fn binding(&self, port: &str) -> Option<&Source> {
        self.explicit_bindings
            .get(port)
            .or_else(|| self.implicit_bindings.get(port))
    }

    pub fn is_bound(&self, port: &str) -> bool {
        self.binding(port).is_some()
    }

    /// Required input ports that have no binding yet, in signature order.
    pub fn unbound_required_inputs(&self) -> Vec<Port> {
        self.inputs
            .iter()
            .filter(|p| p.is_required() && !self.is_bound(&p.name))
            .cloned()
            .collect()
    }

    /// All bindings, explicit first, in port order.
    pub fn bindings(&self) -> impl Iterator<Item = (&String, &Source)> {
        self.explicit_bindings.iter().chain(
            self.implicit_bindings
                .iter()
                .filter(|(port, _)| !self.explicit_bindings.contains_key(*port)),
        )
    }

    /// Type an output port presents to later steps. Scattered steps produce
    /// one value per element, so their outputs become arrays.
    pub fn output_type(&self, port: &str) -> Option<PortType> {
        let ty = self.output(port)?.ty.clone();
        if self.scatter.is_empty() {
            Some(ty)
        } else {
            Some(PortType::array(ty))
        }
    }

    /// Returns a copy of this step under a new identifier.
    pub fn renamed(&self, id: &str) -> Self {
        let mut step = self.clone();
        step.id = id.to_string();
        for port in step.inputs.iter_mut().chain(step.outputs.iter_mut()) {
            port.owning_step = Some(id.to_string());
        }
        step
    }
}

/// A workflow output together with its (explicit or inferred) source.
#[derive(Debug, Clone)]
pub struct WorkflowOutput {
    pub port: Port,
    pub explicit_source: Option<Source>,
    pub implicit_source: Option<Source>,
}

impl WorkflowOutput {
    pub fn source(&self) -> Option<&Source> {
        self.explicit_source
            .as_ref()
            .or(self.implicit_source.as_ref())
    }
}

/// A workflow scope: its boundary ports and ordered steps.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<WorkflowOutput>,
    pub steps: Vec<Step>,
    /// Identifier of the calling workflow for nested scopes
    pub parent: Option<String>,
    /// Incremented by each pass that changes the step structure
    pub generation: u32,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            steps: Vec::new(),
            parent: None,
            generation: 0,
        }
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Effective type of a source within this scope.
    pub fn source_type(&self, source: &Source) -> Option<PortType> {
        match source {
            Source::Step { step, port } => self.step(step)?.output_type(port),
            Source::WorkflowInput(name) => self.input(name).map(|p| p.ty.clone()),
            Source::Literal(_) => None,
        }
    }

    /// Renumbers step positions after insertion or inlining.
    pub fn renumber(&mut self) {
        for (position, step) in self.steps.iter_mut().enumerate() {
            step.position = position;
        }
    }

    /// The observable interface: input and output names with their types.
    pub fn interface(&self) -> Vec<(Direction, String, PortType)> {
        self.inputs
            .iter()
            .map(|p| (Direction::In, p.name.clone(), p.ty.clone()))
            .chain(
                self.outputs
                    .iter()
                    .map(|o| (Direction::Out, o.port.name.clone(), o.port.ty.clone())),
            )
            .collect()
    }

    /// Total number of steps including those of nested bodies.
    pub fn total_steps(&self) -> usize {
        self.steps
            .iter()
            .map(|s| 1 + s.body.as_ref().map_or(0, |b| b.total_steps()))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::signature::{LeafTool, Signature};

    fn entry() -> CatalogEntry {
        CatalogEntry::LeafTool(LeafTool::new(
            Signature::new("sort")
                .with_input(PortDecl::new("reads", PortType::file()))
                .with_input(PortDecl::new("threads", PortType::Primitive(crate::registry::Primitive::Int)).optional())
                .with_output(PortDecl::new("sorted", PortType::file())),
        ))
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(Source::parse_reference("a/out").unwrap(), Source::step("a", "out"));
        assert_eq!(
            Source::parse_reference("reads").unwrap(),
            Source::WorkflowInput("reads".to_string())
        );
        assert!(Source::parse_reference("a/b/c").is_err());
        assert!(Source::parse_reference("/x").is_err());
        assert!(Source::parse_reference("").is_err());
    }

    #[test]
    fn test_step_from_entry() {
        let step = Step::from_entry("s1", &entry(), 3);
        assert_eq!(step.position, 3);
        assert_eq!(step.kind, ToolKind::LeafTool);
        assert_eq!(step.run.as_deref(), Some("sort.cwl"));
        assert_eq!(step.inputs[0].owning_step.as_deref(), Some("s1"));
        assert_eq!(step.outputs[0].direction, Direction::Out);
    }

    #[test]
    fn test_unbound_required_inputs() {
        let mut step = Step::from_entry("s1", &entry(), 0);
        let unbound = step.unbound_required_inputs();
        assert_eq!(unbound.len(), 1);
        assert_eq!(unbound[0].name, "reads");

        step.implicit_bindings
            .insert("reads".to_string(), Source::WorkflowInput("x".to_string()));
        assert!(step.unbound_required_inputs().is_empty());
    }

    #[test]
    fn test_explicit_binding_wins() {
        let mut step = Step::from_entry("s1", &entry(), 0);
        step.implicit_bindings
            .insert("reads".to_string(), Source::WorkflowInput("a".to_string()));
        step.explicit_bindings
            .insert("reads".to_string(), Source::WorkflowInput("b".to_string()));

        assert_eq!(step.binding("reads"), Some(&Source::WorkflowInput("b".to_string())));
        assert_eq!(step.bindings().count(), 1);
    }

    #[test]
    fn test_scattered_output_type() {
        let mut step = Step::from_entry("s1", &entry(), 0);
        assert_eq!(step.output_type("sorted"), Some(PortType::file()));

        step.scatter.insert("reads".to_string());
        assert_eq!(step.output_type("sorted"), Some(PortType::array(PortType::file())));
    }

    #[test]
    fn test_renamed_updates_owner() {
        let step = Step::from_entry("s1", &entry(), 0).renamed("outer__s1");
        assert_eq!(step.id, "outer__s1");
        assert!(step
            .inputs
            .iter()
            .all(|p| p.owning_step.as_deref() == Some("outer__s1")));
    }

    #[test]
    fn test_source_display() {
        assert_eq!(Source::step("a", "b").to_string(), "a/b");
        assert_eq!(Source::Literal(Value::from(3)).to_string(), "literal 3");
    }
}
