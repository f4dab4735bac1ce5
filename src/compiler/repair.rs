//! Step-Insertion Repair
//!
//! When no earlier output can feed a required input, look for an adapter
//! that bridges some eligible source to it. The search is pure: it returns
//! [`InsertionCandidate`]s without touching the workflow. Applying a
//! candidate yields a new snapshot with the adapter step placed right after
//! its source, which is kept only if re-matching the failing port now
//! succeeds through the adapter.
//!
//! Repair is depth one. Inserted steps are never repaired themselves, and an
//! adapter qualifies only if it has exactly one required input.

use log::{debug, info};

use super::matcher::{bind, candidates, select, Candidate, Selection};
use crate::config::CompilerConfig;
use crate::error::{CompileError, Result};
use crate::registry::signature::LeafTool;
use crate::registry::types::compatibility;
use crate::registry::Registry;
use crate::workflow::ast::{Direction, Port, Step, Workflow};

/// A proposed adapter insertion; nothing is changed until it is applied.
#[derive(Debug, Clone)]
pub struct InsertionCandidate {
    /// Catalog identifier of the adapter
    pub adapter: String,
    pub adapter_input: String,
    pub adapter_output: String,
    /// Where the adapter's input will be wired from
    pub source: Candidate,
    pub target_step: String,
    pub target_port: String,
}

/// Searches the whitelist for adapters bridging an eligible source to
/// `target` on `step_id`, in whitelist order.
pub fn insertion_candidates(
    registry: &Registry,
    config: &CompilerConfig,
    workflow: &Workflow,
    step_id: &str,
    target: &Port,
) -> Vec<InsertionCandidate> {
    let Some(position) = workflow.step_index(step_id) else {
        return Vec::new();
    };

    registry
        .adapters(config.adapter_whitelist.as_deref())
        .into_iter()
        .filter_map(|adapter| bridge(adapter, config, workflow, position, step_id, target))
        .collect()
}

/// Returns the first adapter that can bridge `target`, if any.
pub fn find_insertion(
    registry: &Registry,
    config: &CompilerConfig,
    workflow: &Workflow,
    step_id: &str,
    target: &Port,
) -> Option<InsertionCandidate> {
    insertion_candidates(registry, config, workflow, step_id, target)
        .into_iter()
        .next()
}

fn bridge(
    adapter: &LeafTool,
    config: &CompilerConfig,
    workflow: &Workflow,
    position: usize,
    step_id: &str,
    target: &Port,
) -> Option<InsertionCandidate> {
    let signature = &adapter.signature;
    let mut required = signature.inputs.iter().filter(|p| p.is_required());
    let adapter_input = required.next()?;
    if required.next().is_some() {
        return None;
    }

    let adapter_output = signature
        .outputs
        .iter()
        .find(|out| compatibility(&out.ty, &target.ty).is_some())?;

    let input_port = Port::from_decl(adapter_input, Direction::In, Some(&signature.id));
    let source = match select(
        candidates(workflow, position, &input_port),
        &input_port,
        config.naming_convention_tiebreak,
    ) {
        Selection::Unique(candidate) | Selection::ByNaming { candidate, .. } => candidate,
        Selection::Ambiguous(found) => {
            debug!(
                "Adapter '{}' skipped: input '{}' is ambiguous between {} sources",
                signature.id,
                adapter_input.name,
                found.len()
            );
            return None;
        }
        Selection::None => return None,
    };

    Some(InsertionCandidate {
        adapter: signature.id.clone(),
        adapter_input: adapter_input.name.clone(),
        adapter_output: adapter_output.name.clone(),
        source,
        target_step: step_id.to_string(),
        target_port: target.name.clone(),
    })
}

/// Returns a new snapshot with the adapter step inserted after its source.
///
/// The adapter's input is bound; the failing port is left for re-matching.
pub fn apply_insertion(
    registry: &Registry,
    workflow: &Workflow,
    candidate: &InsertionCandidate,
) -> Result<(Workflow, String)> {
    let entry = registry
        .get(&candidate.adapter)
        .ok_or_else(|| CompileError::UnknownStepReference {
            workflow: workflow.id.clone(),
            step: candidate.target_step.clone(),
            reference: candidate.adapter.clone(),
        })?;

    let base = format!(
        "{}__{}__{}",
        candidate.adapter, candidate.target_step, candidate.target_port
    );
    let mut step_id = base.clone();
    let mut suffix = 2;
    while workflow.step(&step_id).is_some() {
        step_id = format!("{}_{}", base, suffix);
        suffix += 1;
    }

    let index = match candidate.source.source.step_id() {
        Some(producer) => workflow.step_index(producer).map_or(0, |i| i + 1),
        None => 0,
    };

    let mut step = Step::from_entry(&step_id, entry, index);
    step.inserted = true;
    bind(&mut step, &candidate.adapter_input, &candidate.source);

    let mut snapshot = workflow.clone();
    snapshot.steps.insert(index, step);
    snapshot.renumber();
    snapshot.generation += 1;
    Ok((snapshot, step_id))
}

/// Tries each bridging adapter in order and returns the first snapshot in
/// which the failing port binds through the inserted step.
pub fn repair(
    registry: &Registry,
    config: &CompilerConfig,
    workflow: &Workflow,
    step_id: &str,
    target: &Port,
) -> Result<Option<Workflow>> {
    for candidate in insertion_candidates(registry, config, workflow, step_id, target) {
        let (mut snapshot, inserted_id) = apply_insertion(registry, workflow, &candidate)?;
        let Some(index) = snapshot.step_index(step_id) else {
            continue;
        };

        let found = candidates(&snapshot, index, target);
        let chosen = match select(found, target, config.naming_convention_tiebreak) {
            Selection::Unique(chosen) | Selection::ByNaming { candidate: chosen, .. } => chosen,
            _ => {
                debug!(
                    "Discarding insertion of '{}': {}.{} still does not bind",
                    candidate.adapter, step_id, target.name
                );
                continue;
            }
        };
        if chosen.source.step_id() != Some(inserted_id.as_str()) {
            debug!(
                "Discarding insertion of '{}': {}.{} bound to {} instead",
                candidate.adapter, step_id, target.name, chosen.source
            );
            continue;
        }

        bind(&mut snapshot.steps[index], &target.name, &chosen);
        info!(
            "Inserted adapter '{}' as step '{}' ({} -> {}.{})",
            candidate.adapter, inserted_id, candidate.source.source, step_id, target.name
        );
        return Ok(Some(snapshot));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::fixtures::{adapter, build, registry, tool};
    use crate::compiler::matcher::Matcher;
    use crate::workflow::ast::Source;

    fn catalog() -> Registry {
        registry(vec![
            tool("A", &[], &[("x", "File")]),
            tool("B", &[("y", "string")], &[]),
            adapter("file_to_string", &[("file", "File")], &[("text", "string")]),
            adapter("two_inputs", &[("a", "File"), ("b", "File")], &[("text", "string")]),
            adapter("int_to_dir", &[("n", "int")], &[("dir", "Directory")]),
        ])
    }

    fn failing() -> Workflow {
        build(&catalog(), "steps:\n  - {id: A, tool: A}\n  - {id: B, tool: B}\n")
    }

    #[test]
    fn test_find_insertion() {
        let registry = catalog();
        let workflow = failing();
        let target = workflow.steps[1].input("y").unwrap().clone();

        let config = CompilerConfig::default();
        let candidate = find_insertion(&registry, &config, &workflow, "B", &target).unwrap();
        assert_eq!(candidate.adapter, "file_to_string");
        assert_eq!(candidate.adapter_input, "file");
        assert_eq!(candidate.adapter_output, "text");
        assert_eq!(candidate.source.source, Source::step("A", "x"));
        assert_eq!(candidate.target_port, "y");
    }

    #[test]
    fn test_search_is_pure() {
        let registry = catalog();
        let workflow = failing();
        let target = workflow.steps[1].input("y").unwrap().clone();

        let config = CompilerConfig::default();
        let found = insertion_candidates(&registry, &config, &workflow, "B", &target);
        assert_eq!(found.len(), 1);
        assert_eq!(workflow.len(), 2);
        assert_eq!(workflow.generation, 0);
    }

    #[test]
    fn test_apply_insertion_places_after_source() {
        let registry = catalog();
        let workflow = failing();
        let target = workflow.steps[1].input("y").unwrap().clone();
        let config = CompilerConfig::default();
        let candidate = find_insertion(&registry, &config, &workflow, "B", &target).unwrap();

        let (snapshot, id) = apply_insertion(&registry, &workflow, &candidate).unwrap();
        assert_eq!(id, "file_to_string__B__y");
        let ids: Vec<_> = snapshot.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "file_to_string__B__y", "B"]);
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.steps[1].inserted);
        assert_eq!(snapshot.steps[2].position, 2);
        assert_eq!(workflow.len(), 2);
    }

    #[test]
    fn test_repair_through_matcher() {
        let registry = catalog();
        let workflow = failing();

        let config = CompilerConfig::default().with_insertion_repair(true);
        let inferred = Matcher::new(&registry, &config).infer(&workflow).unwrap();

        assert_eq!(inferred.len(), workflow.len() + 1);
        let adapter = &inferred.steps[1];
        assert_eq!(adapter.binding("file"), Some(&Source::step("A", "x")));
        assert_eq!(
            inferred.step("B").unwrap().binding("y"),
            Some(&Source::step("file_to_string__B__y", "text"))
        );
    }

    #[test]
    fn test_whitelist_restricts_adapters() {
        let registry = catalog();
        let workflow = failing();

        let config = CompilerConfig::default()
            .with_insertion_repair(true)
            .with_adapter_whitelist(vec!["int_to_dir".to_string()]);
        let err = Matcher::new(&registry, &config).infer(&workflow).unwrap_err();
        assert!(matches!(err, CompileError::InferenceFailure { ref port, .. } if port == "y"));
    }

    #[test]
    fn test_workflow_input_source_inserts_at_front() {
        let registry = catalog();
        let workflow = build(&registry, "inputs: {doc: File}\nsteps:\n  - {id: B, tool: B}\n");

        let config = CompilerConfig::default().with_insertion_repair(true);
        let inferred = Matcher::new(&registry, &config).infer(&workflow).unwrap();
        assert_eq!(inferred.steps[0].id, "file_to_string__B__y");
        assert_eq!(
            inferred.steps[0].binding("file"),
            Some(&Source::WorkflowInput("doc".to_string()))
        );
    }
}
