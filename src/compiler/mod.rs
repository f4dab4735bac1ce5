//! Workflow Compiler
//!
//! Turns a workflow description into a CWL document. The passes run in a
//! fixed order, each taking a snapshot and returning a new one:
//!
//! 1. [`build_workflow`]: resolve the description against the registry
//! 2. [`matcher`]: infer implicit bindings, calling [`repair`] on failures
//! 3. [`inliner`]: optionally flatten sub-workflows
//! 4. [`dag`]: assemble, validate and order the graph
//! 5. [`emitter`]: serialize the graph as CWL
//!
//! [`naming`] holds the token scoring used by the inference tie-break.

pub mod dag;
pub mod emitter;
pub mod inliner;
pub mod matcher;
pub mod naming;
pub mod repair;

#[cfg(test)]
pub(crate) mod fixtures;

use log::info;

pub use dag::{assemble, Graph};
pub use emitter::emit;
pub use inliner::inline_workflow;
pub use matcher::Matcher;

use crate::config::CompilerConfig;
use crate::document::cwl::CwlWorkflow;
use crate::error::{Diagnostic, Result};
use crate::registry::Registry;
use crate::workflow::ast::Workflow;
use crate::workflow::builder::build_workflow;
use crate::workflow::model::WorkflowDescription;

/// Everything one compilation produced.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Final AST snapshot (inferred, possibly inlined)
    pub workflow: Workflow,
    pub graph: Graph,
    pub document: CwlWorkflow,
    /// Problems relaxed by non-strict validation
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn to_yaml(&self) -> Result<String> {
        self.document.to_yaml()
    }
}

/// Runs the compiler passes against a registry.
pub struct Compiler<'a> {
    registry: &'a Registry,
    config: &'a CompilerConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a Registry, config: &'a CompilerConfig) -> Self {
        Self { registry, config }
    }

    /// Compiles `description` as the root workflow `name`.
    pub fn compile(&self, name: &str, description: &WorkflowDescription) -> Result<Compilation> {
        info!(
            "Compiling '{}' ({} steps) against {} catalog entries",
            name,
            description.len(),
            self.registry.len()
        );

        let built = build_workflow(self.registry, name, description)?;

        let mut matcher = Matcher::new(self.registry, self.config);
        let mut workflow = matcher.infer(&built)?;
        let diagnostics = matcher.into_diagnostics();

        if self.config.inline_subworkflows {
            workflow = inline_workflow(&workflow)?;
        }

        let graph = assemble(&workflow)?;
        let document = emit(&graph);

        info!(
            "Compiled '{}': {} steps in {} stages, {} warnings",
            name,
            graph.len(),
            graph.stages().len(),
            diagnostics.len()
        );
        Ok(Compilation {
            workflow,
            graph,
            document,
            diagnostics,
        })
    }
}

/// Compiles a description with the given registry and configuration.
pub fn compile(
    registry: &Registry,
    config: &CompilerConfig,
    name: &str,
    description: &WorkflowDescription,
) -> Result<Compilation> {
    Compiler::new(registry, config).compile(name, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::cwl::parse_document;
    use crate::error::CompileError;
    use crate::compiler::fixtures::{adapter, describe, registry, sub_workflow, tool};

    fn catalog() -> Registry {
        registry(vec![
            tool("A", &[], &[("x", "File")]),
            tool("B", &[("y", "File")], &[("z", "File")]),
            tool("I", &[("y", "int")], &[("z", "File")]),
            tool("C", &[("w", "File")], &[("done", "File")]),
            adapter("file_to_int", &[("file", "File")], &[("number", "int")]),
            sub_workflow(
                "pair",
                "inputs: {data: File}\nsteps:\n  - id: b\n    tool: B\n    in: {y: {input: data}}\n  - id: c\n    tool: C\n    in: {w: {source: b/z}}\noutputs:\n  done: {type: File, source: c/done}\n",
            ),
            sub_workflow(
                "fanout",
                "inputs: {data: 'File[]'}\nsteps:\n  - id: b\n    tool: B\n    in: {y: {input: data}}\n",
            ),
            sub_workflow(
                "passthru",
                "inputs:\n  level: {type: int, default: 3}\noutputs:\n  level_out: {type: int, source: level}\n",
            ),
            sub_workflow("loose", "steps:\n  - {id: b, tool: B}\n"),
        ])
    }

    fn run(yaml: &str, config: &CompilerConfig) -> Result<Compilation> {
        compile(&catalog(), config, "main", &describe(yaml))
    }

    const CHAIN: &str = r#"
steps:
  - {id: a, tool: A}
  - {id: b, tool: B}
  - id: c
    tool: C
    in: {w: {source: b/z}}
"#;

    #[test]
    fn test_compile_binds_compatible_output() {
        let compilation = run(
            "steps:\n  - {id: a, tool: A}\n  - {id: b, tool: B}\n",
            &CompilerConfig::default(),
        )
        .unwrap();
        let b = compilation.document.step("b").unwrap();
        assert_eq!(
            b.inputs[0].source.as_ref().map(|s| s.references()),
            Some(vec!["a/x"])
        );
        assert!(compilation.diagnostics.is_empty());
    }

    #[test]
    fn test_compile_incompatible_type_fails() {
        let err = run(
            "steps:\n  - {id: a, tool: A}\n  - {id: b, tool: I}\n",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        match err {
            CompileError::InferenceFailure { step, port, .. } => {
                assert_eq!(step, "b");
                assert_eq!(port, "y");
            }
            other => panic!("Expected inference failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unique_match_ignores_tiebreak_and_repair() {
        let plain = run(CHAIN, &CompilerConfig::default()).unwrap();
        let config = CompilerConfig::default()
            .with_naming_tiebreak(true)
            .with_insertion_repair(true);
        let tuned = run(CHAIN, &config).unwrap();
        assert_eq!(plain.to_yaml().unwrap(), tuned.to_yaml().unwrap());
    }

    #[test]
    fn test_repair_adds_one_step() {
        let config = CompilerConfig::default().with_insertion_repair(true);
        let compilation = run("steps:\n  - {id: a, tool: A}\n  - {id: b, tool: I}\n", &config).unwrap();

        assert_eq!(compilation.graph.len(), 3);
        let inserted: Vec<_> = compilation
            .document
            .steps
            .iter()
            .filter(|s| s.inserted)
            .collect();
        assert_eq!(inserted.len(), 1);
        let ids: Vec<_> = compilation.document.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", inserted[0].id.as_str(), "b"]);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let config = CompilerConfig::default().with_insertion_repair(true);
        let yaml = "steps:\n  - {id: a, tool: A}\n  - {id: b, tool: I}\n";
        let first = run(yaml, &config).unwrap().to_yaml().unwrap();
        let second = run(yaml, &config).unwrap().to_yaml().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_inlining_preserves_interface() {
        let yaml = "inputs: {reads: File}\nsteps:\n  - id: p\n    tool: pair\n    in: {data: {input: reads}}\noutputs:\n  done: {type: File, source: p/done}\n";
        let nested = run(yaml, &CompilerConfig::default()).unwrap();
        let flat = run(yaml, &CompilerConfig::default().with_inlining(true)).unwrap();

        assert_eq!(
            emitter::interface(&nested.document),
            emitter::interface(&flat.document)
        );
        let ids: Vec<_> = flat.document.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["p__b", "p__c"]);
        assert_eq!(flat.document.outputs[0].output_source, "p__c/done");
        assert_eq!(nested.document.steps.len(), 1);
    }

    #[test]
    fn test_round_trip_shape() {
        let compilation = run(CHAIN, &CompilerConfig::default()).unwrap();
        let parsed = parse_document(&compilation.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed.shape(), compilation.graph.shape());
    }

    #[test]
    fn test_steps_follow_dependencies() {
        let err = run(
            "steps:\n  - {id: a, tool: A}\n  - {id: c, tool: C, in: {w: {source: b/z}}}\n  - {id: b, tool: B}\n",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InvalidBinding { .. }));

        let compilation = run(CHAIN, &CompilerConfig::default()).unwrap();
        let position = |id: &str| {
            compilation
                .document
                .steps
                .iter()
                .position(|s| s.id == id)
                .unwrap()
        };
        for step in &compilation.document.steps {
            for input in &step.inputs {
                for reference in input.source.iter().flat_map(|s| s.references()) {
                    if let Some((from, _)) = reference.split_once('/') {
                        assert!(position(from) < position(&step.id));
                    }
                }
            }
        }
    }

    #[test]
    fn test_unknown_tool_reports_build_error() {
        let err = run("steps:\n  - {id: a, tool: nope}\n", &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownStepReference { .. }));
    }

    #[test]
    fn test_inlined_gather_call_compiles() {
        let yaml = "steps:\n  - {id: a, tool: A}\n  - id: f\n    tool: fanout\n    in: {data: {source: a/x}}\n";
        let nested = run(yaml, &CompilerConfig::default()).unwrap();
        let flat = run(yaml, &CompilerConfig::default().with_inlining(true)).unwrap();

        let ids: Vec<_> = flat.document.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "f__b"]);
        assert!(flat.document.step("f__b").unwrap().scatter.is_empty());
        assert_eq!(
            emitter::interface(&nested.document),
            emitter::interface(&flat.document)
        );
    }

    #[test]
    fn test_defaulted_output_call_stays_nested() {
        let yaml = "steps:\n  - {id: p, tool: passthru}\noutputs:\n  final: {type: int, source: p/level_out}\n";
        let flat = run(yaml, &CompilerConfig::default().with_inlining(true)).unwrap();

        let ids: Vec<_> = flat.document.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["p"]);
        assert_eq!(flat.document.outputs[0].output_source, "p/level_out");
    }

    #[test]
    fn test_non_strict_nested_failure_is_reported() {
        let config = CompilerConfig::default().with_strict_validation(false);
        let err = run("steps:\n  - {id: l, tool: loose}\n", &config).unwrap_err();
        match err {
            CompileError::UnboundRequiredInput { step, port, .. } => {
                assert_eq!(step, "b");
                assert_eq!(port, "y");
            }
            other => panic!("Expected UnboundRequiredInput, got {:?}", other),
        }
    }

    #[test]
    fn test_non_strict_sourceless_output_is_reported() {
        let config = CompilerConfig::default().with_strict_validation(false);
        let err = run("steps:\n  - {id: a, tool: A}\noutputs:\n  n: int\n", &config).unwrap_err();
        assert!(matches!(err, CompileError::UnboundRequiredInput { ref step, .. } if step == "outputs"));
    }

    #[test]
    fn test_non_strict_ambiguous_output_binds_first() {
        let config = CompilerConfig::default().with_strict_validation(false);
        let compilation = run(
            "steps:\n  - {id: a, tool: A}\n  - {id: b, tool: B}\noutputs:\n  result: File\n",
            &config,
        )
        .unwrap();

        assert_eq!(compilation.document.outputs[0].output_source, "a/x");
        assert_eq!(compilation.diagnostics.len(), 1);
        assert_eq!(compilation.diagnostics[0].step, "outputs");
    }

    #[test]
    fn test_failed_repair_is_an_inference_error() {
        let config = CompilerConfig::default().with_insertion_repair(true);
        let err = run("steps:\n  - {id: b, tool: I}\n", &config).unwrap_err();
        assert!(matches!(err, CompileError::InferenceFailure { .. }));
        assert_eq!(err.stage(), crate::error::Stage::Inference);
    }
}
