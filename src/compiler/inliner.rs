//! Sub-workflow Inliner
//!
//! Replaces sub-workflow steps with the callee's steps so the emitted
//! document is one flat graph. Callee steps are renamed
//! `<call-site>__<inner>`; references to callee inputs are rewritten to the
//! call site's bindings (or the input's default), and every reference to a
//! call-site output is redirected to the callee step producing it.
//!
//! The workflow's own inputs and outputs are never renamed or retyped.
//! Inlined steps get their scatter recomputed against the caller's source
//! types. A call site stays nested when it scatters itself, or when the flat
//! form would hand a port or an output a different type than the nested one.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info, warn};

use crate::error::{CompileError, Result};
use crate::registry::types::{compatibility, Compatibility, PortType};
use crate::workflow::ast::{Source, Step, Workflow};

/// Replacement sources for the outputs of inlined call sites, keyed by
/// `(call-site step, output port)`. `None` means the callee left it unbound.
type OutputMap = HashMap<(String, String), Option<Source>>;

/// Flattens sub-workflow steps, bottom-up.
#[derive(Debug, Default)]
pub struct Inliner {
    /// Workflow ids on the current inlining path
    visited: Vec<String>,
}

impl Inliner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new snapshot with every inlinable sub-workflow step expanded.
    pub fn inline(&mut self, workflow: &Workflow) -> Result<Workflow> {
        info!("Inlining sub-workflows of '{}'", workflow.id);
        let flat = self.inline_scope(workflow)?;
        info!(
            "Inlining complete: {} steps -> {} steps",
            workflow.len(),
            flat.len()
        );
        Ok(flat)
    }

    fn inline_scope(&mut self, workflow: &Workflow) -> Result<Workflow> {
        if let Some(start) = self.visited.iter().position(|id| *id == workflow.id) {
            let mut chain = self.visited[start..].to_vec();
            chain.push(workflow.id.clone());
            return Err(CompileError::CyclicWorkflowReference { chain });
        }

        self.visited.push(workflow.id.clone());
        let result = self.expand(workflow);
        self.visited.pop();
        result
    }

    fn expand(&mut self, workflow: &Workflow) -> Result<Workflow> {
        let mut snapshot = workflow.clone();
        snapshot.steps = Vec::with_capacity(workflow.steps.len());
        let mut outputs = OutputMap::new();
        let mut expanded = 0;

        for original in &workflow.steps {
            let mut step = original.clone();
            rewrite_bindings(&mut step, |source| redirect(source, &outputs));

            let Some(body) = step.body.take() else {
                snapshot.steps.push(step);
                continue;
            };

            let body = self.inline_scope(&body)?;
            if !step.scatter.is_empty() {
                warn!(
                    "Step '{}' scatters over sub-workflow '{}'; keeping it as a nested workflow",
                    step.id, body.id
                );
                step.body = Some(Box::new(body));
                snapshot.steps.push(step);
                continue;
            }

            let inputs: HashMap<String, Option<Source>> = body
                .inputs
                .iter()
                .map(|input| {
                    let source = step
                        .binding(&input.name)
                        .cloned()
                        .or_else(|| input.default.clone().map(Source::Literal));
                    (input.name.clone(), source)
                })
                .collect();

            match flatten_call(&snapshot, &step.id, &body, &inputs) {
                Ok((steps, mapped)) => {
                    for inner in &steps {
                        debug!("Inlined '{}' into '{}'", inner.id, workflow.id);
                    }
                    snapshot.steps.extend(steps);
                    outputs.extend(mapped);
                    expanded += 1;
                }
                Err(reason) => {
                    warn!(
                        "Step '{}' keeps sub-workflow '{}' nested: {}",
                        step.id, body.id, reason
                    );
                    step.body = Some(Box::new(body));
                    snapshot.steps.push(step);
                }
            }
        }

        for output in snapshot.outputs.iter_mut() {
            output.explicit_source = output
                .explicit_source
                .take()
                .and_then(|source| redirect(source, &outputs));
            output.implicit_source = output
                .implicit_source
                .take()
                .and_then(|source| redirect(source, &outputs));
        }

        if expanded > 0 {
            snapshot.renumber();
            snapshot.generation += 1;
            debug!("{}: inlined {} sub-workflow calls", workflow.id, expanded);
        }
        Ok(snapshot)
    }
}

/// Splices a callee's steps into a copy of `scope` and maps the call
/// site's outputs, or explains why the flat form would change types.
fn flatten_call(
    scope: &Workflow,
    call_site: &str,
    body: &Workflow,
    inputs: &HashMap<String, Option<Source>>,
) -> std::result::Result<(Vec<Step>, OutputMap), String> {
    let mut trial = scope.clone();
    let first = trial.steps.len();

    for inner in &body.steps {
        let mut renamed = inner.renamed(&qualify(call_site, &inner.id));
        rewrite_bindings(&mut renamed, |source| localize(source, call_site, inputs));
        rescatter(&trial, &mut renamed)?;
        trial.steps.push(renamed);
    }

    let mut mapped = OutputMap::new();
    for output in &body.outputs {
        let source = output
            .source()
            .cloned()
            .and_then(|source| localize(source, call_site, inputs));
        if let Some(source) = &source {
            if matches!(source, Source::Literal(_)) {
                return Err(format!("output '{}' would become a literal", output.port.name));
            }
            let found = trial
                .source_type(source)
                .ok_or_else(|| format!("output '{}' refers to missing '{}'", output.port.name, source))?;
            if !matches!(
                compatibility(&found, &output.port.ty),
                Some(Compatibility::Exact | Compatibility::Any)
            ) {
                return Err(format!(
                    "output '{}' would change from {} to {}",
                    output.port.name, output.port.ty, found
                ));
            }
        }
        mapped.insert((call_site.to_string(), output.port.name.clone()), source);
    }

    Ok((trial.steps.split_off(first), mapped))
}

/// Recomputes which ports of an inlined step scatter, now that its bindings
/// point at caller-scope sources.
fn rescatter(scope: &Workflow, step: &mut Step) -> std::result::Result<(), String> {
    let mut scatter = BTreeSet::new();
    for (name, source) in step.bindings() {
        let Some(port) = step.input(name) else {
            continue;
        };
        let was_scattered = step.scatter.contains(name);
        let scattered = match source {
            Source::Literal(value) => {
                let listed = PortType::array(port.ty.clone()).accepts_literal(value);
                if was_scattered && listed {
                    true
                } else if port.ty.accepts_literal(value) {
                    false
                } else if listed {
                    true
                } else {
                    return Err(format!("'{}.{}' cannot take {}", step.id, name, source));
                }
            }
            _ => {
                let found = scope
                    .source_type(source)
                    .ok_or_else(|| format!("'{}.{}' refers to missing '{}'", step.id, name, source))?;
                let keeps_scatter = match &found {
                    PortType::Any => true,
                    PortType::Array(item) => matches!(
                        compatibility(item, &port.ty),
                        Some(Compatibility::Exact | Compatibility::Any)
                    ),
                    _ => false,
                };
                match compatibility(&found, &port.ty) {
                    _ if was_scattered && keeps_scatter => true,
                    Some(Compatibility::Scatter) => true,
                    Some(_) => false,
                    None => {
                        return Err(format!(
                            "'{}.{}' would receive {} instead of {}",
                            step.id, name, found, port.ty
                        ))
                    }
                }
            }
        };
        if scattered {
            scatter.insert(name.clone());
        }
    }
    step.scatter = scatter;
    Ok(())
}

/// Inlines every sub-workflow of `workflow`.
pub fn inline_workflow(workflow: &Workflow) -> Result<Workflow> {
    Inliner::new().inline(workflow)
}

fn qualify(call_site: &str, inner: &str) -> String {
    format!("{}__{}", call_site, inner)
}

/// Redirects references to inlined call-site outputs.
fn redirect(source: Source, outputs: &OutputMap) -> Option<Source> {
    match source {
        Source::Step { step, port } => match outputs.get(&(step.clone(), port.clone())) {
            Some(mapped) => mapped.clone(),
            None => Some(Source::Step { step, port }),
        },
        other => Some(other),
    }
}

/// Moves a callee-scope source into the caller's scope.
fn localize(
    source: Source,
    call_site: &str,
    inputs: &HashMap<String, Option<Source>>,
) -> Option<Source> {
    match source {
        Source::Step { step, port } => Some(Source::Step {
            step: qualify(call_site, &step),
            port,
        }),
        Source::WorkflowInput(name) => inputs.get(&name).cloned().flatten(),
        literal @ Source::Literal(_) => Some(literal),
    }
}

/// Rewrites every binding of a step, dropping those that map to nothing.
fn rewrite_bindings(step: &mut Step, rewrite: impl Fn(Source) -> Option<Source>) {
    step.explicit_bindings = std::mem::take(&mut step.explicit_bindings)
        .into_iter()
        .filter_map(|(port, source)| rewrite(source).map(|s| (port, s)))
        .collect();
    step.implicit_bindings = std::mem::take(&mut step.implicit_bindings)
        .into_iter()
        .filter_map(|(port, source)| rewrite(source).map(|s| (port, s)))
        .collect();
}
