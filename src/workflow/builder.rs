//! Workflow AST Builder
//!
//! Turns a parsed [`WorkflowDescription`] into a [`Workflow`] AST. Steps are
//! resolved against the registry and carry only the bindings the user
//! wrote; sub-workflow steps get their callee's AST built recursively as
//! their `body`.
//!
//! Checks performed here:
//! - every step names a known catalog entry
//! - sibling step identifiers are unique
//! - bound and scattered ports exist on the signature
//! - sources name an earlier sibling step or an existing workflow input
//! - no sub-workflow transitively calls itself

use std::collections::HashSet;

use log::{debug, info};

use super::ast::{Direction, Port, Source, Step, Workflow, WorkflowOutput};
use super::model::{BindingSpec, WorkflowDescription};
use crate::error::{CompileError, Result};
use crate::registry::signature::CatalogEntry;
use crate::registry::Registry;

/// Builds workflow ASTs against a registry.
///
/// The builder keeps an explicit stack of the workflow identifiers currently
/// being built so recursive sub-workflow references are reported instead of
/// overflowing the call stack.
pub struct AstBuilder<'a> {
    registry: &'a Registry,
    stack: Vec<String>,
}

impl<'a> AstBuilder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            stack: Vec::new(),
        }
    }

    /// Builds the root workflow named `id`.
    pub fn build(&mut self, id: &str, description: &WorkflowDescription) -> Result<Workflow> {
        info!(
            "Building AST for '{}' ({} steps)",
            id,
            description.steps.len()
        );
        let workflow = self.build_scope(id, description, None)?;
        info!(
            "AST built: {} steps ({} including sub-workflows)",
            workflow.len(),
            workflow.total_steps()
        );
        Ok(workflow)
    }

    fn build_scope(
        &mut self,
        id: &str,
        description: &WorkflowDescription,
        parent: Option<&str>,
    ) -> Result<Workflow> {
        if let Some(start) = self.stack.iter().position(|w| w == id) {
            let mut chain = self.stack[start..].to_vec();
            chain.push(id.to_string());
            return Err(CompileError::CyclicWorkflowReference { chain });
        }
        self.stack.push(id.to_string());
        let result = self.build_body(id, description, parent);
        self.stack.pop();
        result
    }

    fn build_body(
        &mut self,
        id: &str,
        description: &WorkflowDescription,
        parent: Option<&str>,
    ) -> Result<Workflow> {
        let registry = self.registry;
        let mut workflow = Workflow::new(id);
        workflow.parent = parent.map(str::to_string);

        let mut input_names = HashSet::new();
        for decl in &description.inputs {
            if !input_names.insert(decl.name.as_str()) {
                return Err(CompileError::parse(
                    format!("workflow '{}'", id),
                    format!("input '{}' is declared more than once", decl.name),
                ));
            }
            workflow
                .inputs
                .push(Port::from_decl(decl, Direction::In, None));
        }

        let mut step_names = HashSet::new();
        for (position, described) in description.steps.iter().enumerate() {
            let step_id = described.id.trim();
            if step_id.is_empty() {
                return Err(CompileError::parse(
                    format!("workflow '{}'", id),
                    format!("step {} has an empty id", position + 1),
                ));
            }
            if !step_names.insert(step_id.to_string()) {
                return Err(CompileError::DuplicateStepName {
                    workflow: id.to_string(),
                    step: step_id.to_string(),
                });
            }

            let entry = registry.get(described.tool.trim()).ok_or_else(|| {
                CompileError::UnknownStepReference {
                    workflow: id.to_string(),
                    step: step_id.to_string(),
                    reference: described.tool.clone(),
                }
            })?;

            let mut step = Step::from_entry(step_id, entry, position);

            for (port, spec) in &described.bindings {
                if step.input(port).is_none() {
                    return Err(CompileError::UnknownPort {
                        workflow: id.to_string(),
                        step: step_id.to_string(),
                        port: port.clone(),
                    });
                }
                let source = resolve_binding(&workflow, step_id, port, spec)?;
                debug!("{}: {}.{} <- {} (explicit)", id, step_id, port, source);
                step.explicit_bindings.insert(port.clone(), source);
            }

            for port in &described.scatter {
                if step.input(port).is_none() {
                    return Err(CompileError::UnknownPort {
                        workflow: id.to_string(),
                        step: step_id.to_string(),
                        port: port.clone(),
                    });
                }
                step.scatter.insert(port.clone());
            }

            if let CatalogEntry::SubWorkflow(sub) = entry {
                let body = self.build_scope(&sub.signature.id, &sub.description, Some(id))?;
                step.body = Some(Box::new(body));
            }

            workflow.steps.push(step);
        }

        for described in &description.outputs {
            let port = Port::from_decl(&described.port, Direction::Out, None);
            let explicit_source = match &described.source {
                Some(reference) => Some(resolve_output_source(&workflow, &port.name, reference)?),
                None => None,
            };
            workflow.outputs.push(WorkflowOutput {
                port,
                explicit_source,
                implicit_source: None,
            });
        }

        Ok(workflow)
    }
}

/// Builds the AST of a root workflow.
pub fn build_workflow(
    registry: &Registry,
    id: &str,
    description: &WorkflowDescription,
) -> Result<Workflow> {
    AstBuilder::new(registry).build(id, description)
}

/// Resolves an explicit step binding. `workflow` holds only the steps
/// declared so far, so any step it knows is an earlier sibling.
fn resolve_binding(
    workflow: &Workflow,
    step: &str,
    port: &str,
    spec: &BindingSpec,
) -> Result<Source> {
    let invalid = |reason: String| CompileError::InvalidBinding {
        workflow: workflow.id.clone(),
        step: step.to_string(),
        port: port.to_string(),
        reason,
    };

    let source = match spec {
        BindingSpec::Source { source } => Source::parse_reference(source).map_err(invalid)?,
        BindingSpec::Input { input } => Source::WorkflowInput(input.trim().to_string()),
        BindingSpec::Value(value) => return Ok(Source::Literal(value.clone())),
    };

    match &source {
        Source::Step {
            step: producer,
            port: output,
        } => {
            if producer == step {
                return Err(invalid(format!("step '{}' cannot consume its own output", step)));
            }
            let producer_step = workflow.step(producer).ok_or_else(|| {
                invalid(format!("'{}' is not an earlier step of this workflow", producer))
            })?;
            if producer_step.output(output).is_none() {
                return Err(CompileError::UnknownPort {
                    workflow: workflow.id.clone(),
                    step: producer.clone(),
                    port: output.clone(),
                });
            }
        }
        Source::WorkflowInput(name) => {
            if workflow.input(name).is_none() {
                return Err(invalid(format!("workflow has no input named '{}'", name)));
            }
        }
        Source::Literal(_) => {}
    }
    Ok(source)
}

/// Resolves the explicit source of a workflow output; every step is eligible.
fn resolve_output_source(workflow: &Workflow, output: &str, reference: &str) -> Result<Source> {
    let invalid = |reason: String| CompileError::InvalidBinding {
        workflow: workflow.id.clone(),
        step: "outputs".to_string(),
        port: output.to_string(),
        reason,
    };

    let source = Source::parse_reference(reference).map_err(invalid)?;
    match &source {
        Source::Step { step, port } => {
            let producer = workflow
                .step(step)
                .ok_or_else(|| invalid(format!("workflow has no step named '{}'", step)))?;
            if producer.output(port).is_none() {
                return Err(CompileError::UnknownPort {
                    workflow: workflow.id.clone(),
                    step: step.clone(),
                    port: port.clone(),
                });
            }
        }
        Source::WorkflowInput(name) => {
            if workflow.input(name).is_none() {
                return Err(invalid(format!("workflow has no input named '{}'", name)));
            }
        }
        Source::Literal(_) => {}
    }
    Ok(source)
}
