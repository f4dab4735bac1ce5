//! DAG Assembly and Validation
//!
//! Builds the node/edge graph from a fully inferred workflow and validates
//! it:
//! - node identifiers are unique
//! - every required input and every workflow output has a source
//! - every source exists and is type-compatible with its target
//! - the step dependencies are acyclic (Kahn's algorithm)
//!
//! Nodes come out in topological order with ties broken by declaration
//! order, so identical input always yields the same graph. Each node also
//! gets a stage: nodes sharing a stage have no path between them and may run
//! in parallel.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info};

use crate::error::{CompileError, Result};
use crate::registry::signature::ToolKind;
use crate::registry::types::{compatibility, Compatibility, PortType};
use crate::workflow::ast::{Port, Source, Step, Workflow};

/// How a source value reaches an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Link {
    Direct,
    /// The consuming step runs once per array element
    Scatter,
    /// A single value is wrapped into the array the input expects
    Gather,
}

/// One end of an edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    Input(String),
    Step { step: String, port: String },
    Output(String),
}

impl Endpoint {
    fn from_source(source: &Source) -> Option<Self> {
        match source {
            Source::Step { step, port } => Some(Self::Step {
                step: step.clone(),
                port: port.clone(),
            }),
            Source::WorkflowInput(name) => Some(Self::Input(name.clone())),
            Source::Literal(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: Endpoint,
    pub to: Endpoint,
    pub link: Link,
}

/// An input of a node with its resolved source; optional inputs may have none.
#[derive(Debug, Clone)]
pub struct NodeInput {
    pub port: Port,
    pub source: Option<Source>,
    pub link: Link,
}

/// A concrete tool invocation, or a sub-workflow call with its own graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub tool: String,
    pub kind: ToolKind,
    pub run: Option<String>,
    /// Declaration index among siblings
    pub position: usize,
    pub inputs: Vec<NodeInput>,
    pub outputs: Vec<Port>,
    pub scatter: Vec<String>,
    pub inserted: bool,
    pub subgraph: Option<Box<Graph>>,
    /// Length of the longest dependency chain leading to this node
    pub stage: usize,
}

impl Node {
    /// Sibling steps this node consumes outputs of.
    pub fn dependencies(&self) -> BTreeSet<&str> {
        self.inputs
            .iter()
            .filter_map(|input| input.source.as_ref()?.step_id())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct GraphOutput {
    pub port: Port,
    pub source: Source,
}

/// The validated graph of one workflow scope.
#[derive(Debug, Clone)]
pub struct Graph {
    pub id: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<GraphOutput>,
    /// Nodes in topological order
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Node and edge sets of a graph, for structural comparison.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphShape {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<(Endpoint, Endpoint)>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids grouped by stage, each group in topological order.
    pub fn stages(&self) -> Vec<Vec<&str>> {
        let depth = self.nodes.iter().map(|n| n.stage + 1).max().unwrap_or(0);
        let mut stages = vec![Vec::new(); depth];
        for node in &self.nodes {
            stages[node.stage].push(node.id.as_str());
        }
        stages
    }

    /// True if no dependency path connects `a` and `b` in either direction.
    pub fn is_independent(&self, a: &str, b: &str) -> bool {
        a != b && !self.reaches(a, b) && !self.reaches(b, a)
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![to];
        while let Some(current) = pending.pop() {
            if current == from {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.node(current) {
                pending.extend(node.dependencies());
            }
        }
        false
    }

    pub fn shape(&self) -> GraphShape {
        GraphShape {
            nodes: self.nodes.iter().map(|n| n.id.clone()).collect(),
            edges: self
                .edges
                .iter()
                .map(|e| (e.from.clone(), e.to.clone()))
                .collect(),
        }
    }
}

/// Assembles and validates the graph of `workflow` and its nested bodies.
pub fn assemble(workflow: &Workflow) -> Result<Graph> {
    info!("Validating graph of '{}' ({} steps)", workflow.id, workflow.len());
    let graph = assemble_scope(workflow)?;
    info!(
        "Graph validated: {} nodes, {} edges, {} stages",
        graph.len(),
        graph.edges.len(),
        graph.stages().len()
    );
    Ok(graph)
}

fn assemble_scope(workflow: &Workflow) -> Result<Graph> {
    let mut seen = HashSet::new();
    for step in &workflow.steps {
        if !seen.insert(step.id.as_str()) {
            return Err(CompileError::DuplicateStepName {
                workflow: workflow.id.clone(),
                step: step.id.clone(),
            });
        }
    }

    let mut nodes = Vec::with_capacity(workflow.len());
    let mut edges = Vec::new();
    for step in &workflow.steps {
        let node = build_node(workflow, step)?;
        for input in &node.inputs {
            if let Some(from) = input.source.as_ref().and_then(Endpoint::from_source) {
                edges.push(Edge {
                    from,
                    to: Endpoint::Step {
                        step: node.id.clone(),
                        port: input.port.name.clone(),
                    },
                    link: input.link,
                });
            }
        }
        nodes.push(node);
    }

    let mut outputs = Vec::with_capacity(workflow.outputs.len());
    for output in &workflow.outputs {
        let source = output
            .source()
            .cloned()
            .ok_or_else(|| CompileError::UnboundRequiredInput {
                workflow: workflow.id.clone(),
                step: "outputs".to_string(),
                port: output.port.name.clone(),
            })?;
        let found = resolve_type(workflow, "outputs", &output.port.name, &source)?;
        if !matches!(
            compatibility(&found, &output.port.ty),
            Some(Compatibility::Exact | Compatibility::Any)
        ) {
            return Err(incompatible(
                workflow,
                "outputs",
                &output.port.name,
                &output.port.ty,
                &found,
            ));
        }
        if let Some(from) = Endpoint::from_source(&source) {
            edges.push(Edge {
                from,
                to: Endpoint::Output(output.port.name.clone()),
                link: Link::Direct,
            });
        }
        outputs.push(GraphOutput {
            port: output.port.clone(),
            source,
        });
    }

    let nodes = topological_order(workflow, nodes)?;
    debug!(
        "Topological order of '{}': {:?}",
        workflow.id,
        nodes.iter().map(|n| &n.id).collect::<Vec<_>>()
    );

    Ok(Graph {
        id: workflow.id.clone(),
        inputs: workflow.inputs.clone(),
        outputs,
        nodes,
        edges,
    })
}

fn build_node(workflow: &Workflow, step: &Step) -> Result<Node> {
    let mut inputs = Vec::with_capacity(step.inputs.len());
    for port in &step.inputs {
        let Some(source) = step.binding(&port.name).cloned() else {
            if port.is_required() {
                return Err(CompileError::UnboundRequiredInput {
                    workflow: workflow.id.clone(),
                    step: step.id.clone(),
                    port: port.name.clone(),
                });
            }
            inputs.push(NodeInput {
                port: port.clone(),
                source: None,
                link: Link::Direct,
            });
            continue;
        };

        let scattered = step.scatter.contains(&port.name);
        let link = match &source {
            Source::Literal(value) => {
                let expected = if scattered {
                    PortType::array(port.ty.clone())
                } else {
                    port.ty.clone()
                };
                if !expected.accepts_literal(value) {
                    return Err(CompileError::IncompatibleBinding {
                        workflow: workflow.id.clone(),
                        step: step.id.clone(),
                        port: port.name.clone(),
                        expected: expected.to_string(),
                        found: source.to_string(),
                    });
                }
                if scattered {
                    Link::Scatter
                } else {
                    Link::Direct
                }
            }
            _ => {
                let found = resolve_type(workflow, &step.id, &port.name, &source)?;
                link_for(workflow, step, port, &found, scattered)?
            }
        };
        inputs.push(NodeInput {
            port: port.clone(),
            source: Some(source),
            link,
        });
    }

    let subgraph = match &step.body {
        Some(body) => Some(Box::new(assemble_scope(body)?)),
        None => None,
    };

    Ok(Node {
        id: step.id.clone(),
        tool: step.signature_ref.clone(),
        kind: step.kind,
        run: step.run.clone(),
        position: step.position,
        inputs,
        outputs: step.outputs.clone(),
        scatter: step.scatter.iter().cloned().collect(),
        inserted: step.inserted,
        subgraph,
        stage: 0,
    })
}

/// Effective type of a step or workflow-input source. Dangling references
/// are invalid bindings.
fn resolve_type(workflow: &Workflow, step: &str, port: &str, source: &Source) -> Result<PortType> {
    workflow
        .source_type(source)
        .ok_or_else(|| CompileError::InvalidBinding {
            workflow: workflow.id.clone(),
            step: step.to_string(),
            port: port.to_string(),
            reason: match source {
                Source::Literal(_) => "a literal cannot be used here".to_string(),
                other => format!("source '{}' does not exist", other),
            },
        })
}

fn link_for(
    workflow: &Workflow,
    step: &Step,
    port: &Port,
    found: &PortType,
    scattered: bool,
) -> Result<Link> {
    if scattered {
        return match found {
            PortType::Array(item)
                if matches!(
                    compatibility(item, &port.ty),
                    Some(Compatibility::Exact | Compatibility::Any)
                ) =>
            {
                Ok(Link::Scatter)
            }
            PortType::Any => Ok(Link::Scatter),
            _ => Err(incompatible(
                workflow,
                &step.id,
                &port.name,
                &PortType::array(port.ty.clone()),
                found,
            )),
        };
    }
    match compatibility(found, &port.ty) {
        Some(Compatibility::Exact | Compatibility::Any) => Ok(Link::Direct),
        Some(Compatibility::Gather) => Ok(Link::Gather),
        Some(Compatibility::Scatter) | None => {
            Err(incompatible(workflow, &step.id, &port.name, &port.ty, found))
        }
    }
}

fn incompatible(
    workflow: &Workflow,
    step: &str,
    port: &str,
    expected: &PortType,
    found: &PortType,
) -> CompileError {
    CompileError::IncompatibleBinding {
        workflow: workflow.id.clone(),
        step: step.to_string(),
        port: port.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Orders nodes with Kahn's algorithm, taking ready nodes in declaration
/// order, and assigns stages.
fn topological_order(workflow: &Workflow, nodes: Vec<Node>) -> Result<Vec<Node>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dependency in node.dependencies() {
            if let Some(&d) = index.get(dependency) {
                in_degree[i] += 1;
                successors[d].push(i);
            }
        }
    }

    let mut ready: BTreeSet<(usize, usize)> = nodes
        .iter()
        .enumerate()
        .filter(|(i, _)| in_degree[*i] == 0)
        .map(|(i, n)| (n.position, i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    let mut stage = vec![0usize; nodes.len()];
    while let Some((_, current)) = ready.pop_first() {
        order.push(current);
        for &next in &successors[current] {
            stage[next] = stage[next].max(stage[current] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert((nodes[next].position, next));
            }
        }
    }

    if order.len() != nodes.len() {
        let placed: HashSet<usize> = order.iter().copied().collect();
        let steps = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !placed.contains(i))
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(CompileError::CyclicGraph {
            workflow: workflow.id.clone(),
            steps,
        });
    }

    let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| {
            let mut node = slots[i].take()?;
            node.stage = stage[i];
            Some(node)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::fixtures::{build, registry, tool};
    use crate::compiler::matcher::Matcher;
    use crate::config::CompilerConfig;
    use crate::registry::Registry;

    fn catalog() -> Registry {
        registry(vec![
            tool("fetch", &[], &[("data", "File")]),
            tool("left", &[("data", "File")], &[("l", "int")]),
            tool("right", &[("data", "File")], &[("r", "string")]),
            tool("join", &[("l", "int"), ("r", "string")], &[("joined", "File")]),
            tool("many", &[("items", "int[]")], &[]),
        ])
    }

    fn inferred(registry: &Registry, yaml: &str) -> Workflow {
        let workflow = build(registry, yaml);
        let config = CompilerConfig::default();
        Matcher::new(registry, &config).infer(&workflow).unwrap()
    }

    const DIAMOND: &str = r#"
steps:
  - {id: fetch, tool: fetch}
  - {id: left, tool: left}
  - {id: right, tool: right}
  - {id: join, tool: join}
outputs:
  joined: {type: File, source: join/joined}
"#;

    #[test]
    fn test_diamond_order_and_stages() {
        let registry = catalog();
        let graph = assemble(&inferred(&registry, DIAMOND)).unwrap();

        let order: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(order, vec!["fetch", "left", "right", "join"]);
        assert_eq!(graph.stages(), vec![vec!["fetch"], vec!["left", "right"], vec!["join"]]);
        assert!(graph.is_independent("left", "right"));
        assert!(!graph.is_independent("fetch", "join"));
        assert_eq!(graph.edges.len(), 5);
    }

    #[test]
    fn test_order_is_topological() {
        let registry = catalog();
        let graph = assemble(&inferred(&registry, DIAMOND)).unwrap();

        let rank: HashMap<&str, usize> = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        for node in &graph.nodes {
            for dependency in node.dependencies() {
                assert!(rank[dependency] < rank[node.id.as_str()]);
            }
        }
    }

    #[test]
    fn test_unbound_required_input() {
        let registry = catalog();
        let workflow = build(&registry, "steps:\n  - {id: left, tool: left}\n");
        let err = assemble(&workflow).unwrap_err();
        assert!(matches!(err, CompileError::UnboundRequiredInput { ref port, .. } if port == "data"));
    }

    #[test]
    fn test_sourceless_output() {
        let registry = catalog();
        let workflow = build(&registry, "steps:\n  - {id: fetch, tool: fetch}\noutputs:\n  x: File\n");
        let err = assemble(&workflow).unwrap_err();
        assert!(matches!(err, CompileError::UnboundRequiredInput { ref step, .. } if step == "outputs"));
    }

    #[test]
    fn test_dangling_source() {
        let registry = catalog();
        let mut workflow = build(&registry, "steps:\n  - {id: left, tool: left}\n");
        workflow.steps[0]
            .implicit_bindings
            .insert("data".to_string(), Source::step("ghost", "data"));
        let err = assemble(&workflow).unwrap_err();
        assert!(matches!(err, CompileError::InvalidBinding { .. }));
    }

    #[test]
    fn test_incompatible_binding() {
        let registry = catalog();
        let mut workflow = build(
            &registry,
            "steps:\n  - {id: fetch, tool: fetch}\n  - {id: join, tool: join}\n",
        );
        workflow.steps[1]
            .implicit_bindings
            .insert("l".to_string(), Source::step("fetch", "data"));
        let err = assemble(&workflow).unwrap_err();
        match err {
            CompileError::IncompatibleBinding { expected, found, .. } => {
                assert_eq!(expected, "int");
                assert_eq!(found, "File");
            }
            other => panic!("Expected IncompatibleBinding, got {:?}", other),
        }
    }

    #[test]
    fn test_scattered_binding_expects_array() {
        let registry = catalog();
        let mut workflow = build(
            &registry,
            "steps:\n  - {id: fetch, tool: fetch}\n  - {id: left, tool: left}\n",
        );
        workflow.steps[1]
            .implicit_bindings
            .insert("data".to_string(), Source::step("fetch", "data"));
        workflow.steps[1].scatter.insert("data".to_string());

        let err = assemble(&workflow).unwrap_err();
        match err {
            CompileError::IncompatibleBinding { step, port, expected, found, .. } => {
                assert_eq!(step, "left");
                assert_eq!(port, "data");
                assert_eq!(expected, "File[]");
                assert_eq!(found, "File");
            }
            other => panic!("Expected IncompatibleBinding, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_type_checked() {
        let registry = catalog();
        let ok = build(
            &registry,
            "steps:\n  - id: many\n    tool: many\n    in: {items: [1, 2, 3]}\n",
        );
        assert!(assemble(&ok).is_ok());

        let bad = build(
            &registry,
            "steps:\n  - id: many\n    tool: many\n    in: {items: text}\n",
        );
        assert!(matches!(assemble(&bad), Err(CompileError::IncompatibleBinding { .. })));
    }

    #[test]
    fn test_gather_link() {
        let registry = catalog();
        let mut workflow = build(
            &registry,
            "steps:\n  - {id: fetch, tool: fetch}\n  - {id: left, tool: left}\n  - {id: many, tool: many}\n",
        );
        workflow.steps[1]
            .implicit_bindings
            .insert("data".to_string(), Source::step("fetch", "data"));
        workflow.steps[2]
            .implicit_bindings
            .insert("items".to_string(), Source::step("left", "l"));

        let graph = assemble(&workflow).unwrap();
        assert_eq!(graph.node("many").unwrap().inputs[0].link, Link::Gather);
    }

    #[test]
    fn test_cycle_detected() {
        let registry = catalog();
        let mut workflow = build(
            &registry,
            "steps:\n  - {id: left, tool: left}\n  - {id: right, tool: right}\n  - {id: join, tool: join}\n",
        );
        workflow.steps[0].implicit_bindings.insert(
            "data".to_string(),
            Source::WorkflowInput("missing".to_string()),
        );
        assert!(matches!(assemble(&workflow), Err(CompileError::InvalidBinding { .. })));

        let mut workflow = inferred(&registry, DIAMOND);
        workflow.steps.retain(|s| s.id != "fetch");
        let join_output = Source::step("join", "joined");
        for step in workflow.steps.iter_mut().filter(|s| s.id != "join") {
            step.implicit_bindings.insert("data".to_string(), join_output.clone());
        }
        match assemble(&workflow) {
            Err(CompileError::CyclicGraph { steps, .. }) => {
                assert_eq!(steps, vec!["left", "right", "join"]);
            }
            other => panic!("Expected CyclicGraph, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_node() {
        let registry = catalog();
        let mut workflow = build(&registry, "steps:\n  - {id: fetch, tool: fetch}\n");
        let copy = workflow.steps[0].clone();
        workflow.steps.push(copy);
        assert!(matches!(
            assemble(&workflow),
            Err(CompileError::DuplicateStepName { .. })
        ));
    }
}
