//! Port Matcher
//!
//! Resolves step inputs the user left unbound. A single forward pass visits
//! steps in declaration order; for each unbound required input it collects
//! type-compatible candidates from the enclosing workflow's inputs and the
//! outputs of earlier steps, then applies the selection policy:
//!
//! - no candidate: hand the port to step-insertion repair
//! - one candidate: bind it
//! - several: break the tie by naming similarity when enabled, otherwise
//!   report the binding as ambiguous
//!
//! Workflow outputs without an explicit source are inferred last, with every
//! step eligible.

use std::collections::HashSet;

use log::{debug, info, warn};

use super::naming::{score, tokenize};
use super::repair;
use crate::config::CompilerConfig;
use crate::error::{CompileError, Diagnostic, Result, Stage};
use crate::registry::types::{compatibility, Compatibility};
use crate::registry::Registry;
use crate::workflow::ast::{Direction, Port, Source, Step, Workflow};

/// A type-compatible source for one input port.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: Source,
    /// The source port, carrying its effective type
    pub port: Port,
    /// Tokens of the producing step's id and tool (empty for workflow inputs)
    pub step_tokens: Vec<String>,
    /// Declaration order among all candidates
    pub order: usize,
    pub compat: Compatibility,
}

/// Outcome of the selection policy.
#[derive(Debug)]
pub enum Selection {
    Unique(Candidate),
    ByNaming { candidate: Candidate, score: u32 },
    Ambiguous(Vec<Candidate>),
    None,
}

/// Enumerates candidates for `target` on the step at `position`: workflow
/// inputs first, then outputs of earlier steps, ports in signature order.
pub fn candidates(workflow: &Workflow, position: usize, target: &Port) -> Vec<Candidate> {
    let mut found = Vec::new();

    for input in &workflow.inputs {
        if let Some(compat) = compatibility(&input.ty, &target.ty) {
            found.push(Candidate {
                source: Source::WorkflowInput(input.name.clone()),
                port: input.clone(),
                step_tokens: Vec::new(),
                order: found.len(),
                compat,
            });
        }
    }

    for step in workflow.steps.iter().take(position) {
        push_step_outputs(&mut found, step, target, |_| true);
    }
    found
}

/// Enumerates candidates for a workflow output; every step is eligible and
/// only direct matches count.
pub fn output_candidates(workflow: &Workflow, target: &Port) -> Vec<Candidate> {
    let mut found = Vec::new();
    for step in &workflow.steps {
        push_step_outputs(&mut found, step, target, |compat| {
            matches!(compat, Compatibility::Exact | Compatibility::Any)
        });
    }
    found
}

fn push_step_outputs(
    found: &mut Vec<Candidate>,
    step: &Step,
    target: &Port,
    accept: impl Fn(Compatibility) -> bool,
) {
    let mut step_tokens = tokenize(&step.id);
    for token in tokenize(&step.signature_ref) {
        if !step_tokens.contains(&token) {
            step_tokens.push(token);
        }
    }

    for output in &step.outputs {
        let Some(ty) = step.output_type(&output.name) else {
            continue;
        };
        let Some(compat) = compatibility(&ty, &target.ty).filter(|c| accept(*c)) else {
            continue;
        };
        let mut port = output.clone();
        port.ty = ty;
        found.push(Candidate {
            source: Source::step(&step.id, &output.name),
            port,
            step_tokens: step_tokens.clone(),
            order: found.len(),
            compat,
        });
    }
}

/// Applies the selection policy to the candidates of `target`.
///
/// With the tie-break enabled the highest naming score wins and equal
/// scores go to the earlier candidate. A best score of zero is treated as
/// inconclusive.
pub fn select(mut found: Vec<Candidate>, target: &Port, tiebreak: bool) -> Selection {
    match found.len() {
        0 => Selection::None,
        1 => Selection::Unique(found.remove(0)),
        _ if !tiebreak => Selection::Ambiguous(found),
        _ => {
            let scores: Vec<u32> = found
                .iter()
                .map(|c| {
                    score(
                        &target.name,
                        &target.naming_tokens,
                        &c.port.name,
                        &c.port.naming_tokens,
                        &c.step_tokens,
                    )
                })
                .collect();
            let best = scores.iter().copied().max().unwrap_or(0);
            if best == 0 {
                return Selection::Ambiguous(found);
            }
            let index = scores.iter().position(|s| *s == best).unwrap_or(0);
            Selection::ByNaming {
                candidate: found.swap_remove(index),
                score: best,
            }
        }
    }
}

/// Records `candidate` as the implicit binding of `port` on `step`.
/// Array-into-element matches scatter the step over that port.
pub(crate) fn bind(step: &mut Step, port: &str, candidate: &Candidate) {
    step.implicit_bindings
        .insert(port.to_string(), candidate.source.clone());
    if candidate.compat == Compatibility::Scatter {
        step.scatter.insert(port.to_string());
    }
}

/// Runs inference over a workflow and its nested bodies.
pub struct Matcher<'a> {
    registry: &'a Registry,
    config: &'a CompilerConfig,
    diagnostics: Vec<Diagnostic>,
    /// Root inputs added by non-strict promotion
    promoted: HashSet<String>,
}

impl<'a> Matcher<'a> {
    pub fn new(registry: &'a Registry, config: &'a CompilerConfig) -> Self {
        Self {
            registry,
            config,
            diagnostics: Vec::new(),
            promoted: HashSet::new(),
        }
    }

    /// Returns a new snapshot with implicit bindings filled in.
    pub fn infer(&mut self, workflow: &Workflow) -> Result<Workflow> {
        if self.config.inference_disabled {
            info!("Inference disabled; only explicit bindings are used");
        } else {
            info!("Inferring bindings for '{}'", workflow.id);
        }
        let inferred = self.infer_scope(workflow, true)?;

        let implicit: usize = inferred
            .steps
            .iter()
            .map(|s| s.implicit_bindings.len())
            .sum();
        info!(
            "Inference complete: {} implicit bindings, {} steps (generation {})",
            implicit,
            inferred.len(),
            inferred.generation
        );
        Ok(inferred)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn infer_scope(&mut self, workflow: &Workflow, is_root: bool) -> Result<Workflow> {
        let mut snapshot = workflow.clone();

        for step in snapshot.steps.iter_mut() {
            if let Some(body) = &step.body {
                let inferred = self.infer_scope(body, false)?;
                step.body = Some(Box::new(inferred));
            }
        }

        let mut index = 0;
        while index < snapshot.steps.len() {
            let step_id = snapshot.steps[index].id.clone();
            record_explicit_scatter(&mut snapshot, index);

            if !self.config.inference_disabled {
                for port in snapshot.steps[index].unbound_required_inputs() {
                    self.resolve_port(&mut snapshot, &step_id, &port, is_root)?;
                }
            }
            index = snapshot.step_index(&step_id).unwrap_or(index) + 1;
        }

        if !self.config.inference_disabled {
            self.infer_outputs(&mut snapshot)?;
        }
        Ok(snapshot)
    }

    fn resolve_port(
        &mut self,
        workflow: &mut Workflow,
        step_id: &str,
        port: &Port,
        is_root: bool,
    ) -> Result<()> {
        let Some(index) = workflow.step_index(step_id) else {
            return Ok(());
        };
        let found = candidates(workflow, index, port);

        match select(found, port, self.config.naming_convention_tiebreak) {
            Selection::Unique(candidate) => {
                debug!(
                    "{}: {}.{} <- {} (unique)",
                    workflow.id, step_id, port.name, candidate.source
                );
                self.check_promoted(&workflow.id, step_id, &port.name, &candidate.source, is_root);
                bind(&mut workflow.steps[index], &port.name, &candidate);
            }
            Selection::ByNaming { candidate, score } => {
                debug!(
                    "{}: {}.{} <- {} (naming score {})",
                    workflow.id, step_id, port.name, candidate.source, score
                );
                self.check_promoted(&workflow.id, step_id, &port.name, &candidate.source, is_root);
                bind(&mut workflow.steps[index], &port.name, &candidate);
            }
            Selection::Ambiguous(found) => {
                let labels: Vec<String> = found.iter().map(|c| c.source.to_string()).collect();
                if self.config.strict_validation {
                    return Err(CompileError::AmbiguousBinding {
                        workflow: workflow.id.clone(),
                        step: step_id.to_string(),
                        port: port.name.clone(),
                        candidates: labels,
                    });
                }
                self.relax(
                    &workflow.id,
                    step_id,
                    &port.name,
                    format!("ambiguous between {}; binding {}", labels.join(", "), labels[0]),
                );
                self.check_promoted(&workflow.id, step_id, &port.name, &found[0].source, is_root);
                bind(&mut workflow.steps[index], &port.name, &found[0]);
            }
            Selection::None => {
                let reason = if self.config.insertion_repair_enabled
                    && !workflow.steps[index].inserted
                {
                    if let Some(repaired) =
                        repair::repair(self.registry, self.config, workflow, step_id, port)?
                    {
                        *workflow = repaired;
                        return Ok(());
                    }
                    format!(
                        "no compatible source for {} and no adapter bridges one",
                        port.ty
                    )
                } else {
                    format!(
                        "no earlier output or workflow input is compatible with {}",
                        port.ty
                    )
                };

                if self.config.strict_validation {
                    return Err(CompileError::InferenceFailure {
                        workflow: workflow.id.clone(),
                        step: step_id.to_string(),
                        port: port.name.clone(),
                        reason,
                    });
                }
                if is_root {
                    let name = promote_to_input(workflow, index, port);
                    self.promoted.insert(name.clone());
                    self.relax(
                        &workflow.id,
                        step_id,
                        &port.name,
                        format!("{}; promoted to workflow input '{}'", reason, name),
                    );
                } else {
                    self.relax(&workflow.id, step_id, &port.name, format!("{}; left unbound", reason));
                }
            }
        }
        Ok(())
    }

    fn infer_outputs(&mut self, workflow: &mut Workflow) -> Result<()> {
        for index in 0..workflow.outputs.len() {
            if workflow.outputs[index].explicit_source.is_some() {
                continue;
            }
            let target = workflow.outputs[index].port.clone();
            let found = output_candidates(workflow, &target);

            let chosen = match select(found, &target, self.config.naming_convention_tiebreak) {
                Selection::Unique(candidate) | Selection::ByNaming { candidate, .. } => candidate,
                Selection::Ambiguous(mut found) => {
                    let labels: Vec<String> = found.iter().map(|c| c.source.to_string()).collect();
                    if self.config.strict_validation {
                        return Err(CompileError::AmbiguousBinding {
                            workflow: workflow.id.clone(),
                            step: "outputs".to_string(),
                            port: target.name.clone(),
                            candidates: labels,
                        });
                    }
                    self.relax(
                        &workflow.id,
                        "outputs",
                        &target.name,
                        format!("ambiguous between {}; binding {}", labels.join(", "), labels[0]),
                    );
                    found.remove(0)
                }
                Selection::None => {
                    let reason = format!("no step produces a {}", target.ty);
                    if self.config.strict_validation {
                        return Err(CompileError::InferenceFailure {
                            workflow: workflow.id.clone(),
                            step: "outputs".to_string(),
                            port: target.name.clone(),
                            reason,
                        });
                    }
                    self.relax(&workflow.id, "outputs", &target.name, reason);
                    continue;
                }
            };
            debug!(
                "{}: output {} <- {}",
                workflow.id, target.name, chosen.source
            );
            workflow.outputs[index].implicit_source = Some(chosen.source);
        }
        Ok(())
    }

    /// Promoted inputs are placeholders, so a later step taking one is
    /// reported rather than bound silently.
    fn check_promoted(
        &mut self,
        workflow: &str,
        step: &str,
        port: &str,
        source: &Source,
        is_root: bool,
    ) {
        if let Source::WorkflowInput(name) = source {
            if is_root && self.promoted.contains(name) {
                self.relax(
                    workflow,
                    step,
                    port,
                    format!("bound to promoted workflow input '{}'", name),
                );
            }
        }
    }

    fn relax(&mut self, workflow: &str, step: &str, port: &str, message: String) {
        let diagnostic = Diagnostic::new(Stage::Inference, workflow, step, port, message);
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

/// Scatters a step over explicitly bound ports whose source is an array of
/// the input's type.
fn record_explicit_scatter(workflow: &mut Workflow, index: usize) {
    let step = &workflow.steps[index];
    let scattered: Vec<String> = step
        .explicit_bindings
        .iter()
        .filter_map(|(port, source)| {
            let source_ty = workflow.source_type(source)?;
            let target = step.input(port)?;
            (compatibility(&source_ty, &target.ty) == Some(Compatibility::Scatter))
                .then(|| port.clone())
        })
        .collect();
    workflow.steps[index].scatter.extend(scattered);
}

/// Adds a root workflow input `<step>__<port>` and binds the port to it.
fn promote_to_input(workflow: &mut Workflow, index: usize, port: &Port) -> String {
    let step = &workflow.steps[index];
    let mut name = format!("{}__{}", step.id, port.name);
    while workflow.input(&name).is_some() {
        name.push('_');
    }

    let mut input = port.clone();
    input.name = name.clone();
    input.direction = Direction::In;
    input.owning_step = None;
    workflow.inputs.push(input);
    workflow.steps[index]
        .implicit_bindings
        .insert(port.name.clone(), Source::WorkflowInput(name.clone()));
    name
}
