//! Compilation Errors and Diagnostics
//!
//! Every stage of the pipeline fails fast with a [`CompileError`] that names
//! the offending workflow, step and port. Relaxations permitted by
//! non-strict validation are reported as [`Diagnostic`]s instead.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the compiler.
pub type Result<T> = std::result::Result<T, CompileError>;

/// Pipeline stage an error or diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Parse,
    Build,
    Inference,
    Inline,
    Validate,
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::Build => "build",
            Self::Inference => "inference",
            Self::Inline => "inline",
            Self::Validate => "validate",
            Self::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Errors surfaced to callers of the compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Failed to parse {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Step '{step}' in workflow '{workflow}' references unknown tool or workflow '{reference}'")]
    UnknownStepReference {
        workflow: String,
        step: String,
        reference: String,
    },

    #[error("Workflow '{workflow}' declares step '{step}' more than once")]
    DuplicateStepName { workflow: String, step: String },

    #[error("Step '{step}' in workflow '{workflow}' has no port named '{port}'")]
    UnknownPort {
        workflow: String,
        step: String,
        port: String,
    },

    #[error("Binding '{step}.{port}' in workflow '{workflow}' is invalid: {reason}")]
    InvalidBinding {
        workflow: String,
        step: String,
        port: String,
        reason: String,
    },

    #[error(
        "Input '{step}.{port}' in workflow '{workflow}' matches several outputs: {}",
        .candidates.join(", ")
    )]
    AmbiguousBinding {
        workflow: String,
        step: String,
        port: String,
        candidates: Vec<String>,
    },

    #[error("Could not infer input '{step}.{port}' in workflow '{workflow}': {reason}")]
    InferenceFailure {
        workflow: String,
        step: String,
        port: String,
        reason: String,
    },

    #[error("Workflow reference cycle: {}", .chain.join(" -> "))]
    CyclicWorkflowReference { chain: Vec<String> },

    #[error("Workflow '{workflow}' contains a dependency cycle between steps: {}", .steps.join(", "))]
    CyclicGraph { workflow: String, steps: Vec<String> },

    #[error("Required input '{step}.{port}' in workflow '{workflow}' has no binding")]
    UnboundRequiredInput {
        workflow: String,
        step: String,
        port: String,
    },

    #[error(
        "Binding '{step}.{port}' in workflow '{workflow}' connects {found} to an input of type {expected}"
    )]
    IncompatibleBinding {
        workflow: String,
        step: String,
        port: String,
        expected: String,
        found: String,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to emit document: {0}")]
    Emit(String),
}

impl CompileError {
    /// Builds a parse error from any displayable cause.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Parse { .. } | Self::Io { .. } | Self::Config(_) => Stage::Parse,
            Self::UnknownStepReference { .. }
            | Self::DuplicateStepName { .. }
            | Self::UnknownPort { .. }
            | Self::InvalidBinding { .. } => Stage::Build,
            Self::AmbiguousBinding { .. } | Self::InferenceFailure { .. } => Stage::Inference,
            Self::CyclicWorkflowReference { .. } => Stage::Inline,
            Self::CyclicGraph { .. }
            | Self::UnboundRequiredInput { .. }
            | Self::IncompatibleBinding { .. } => Stage::Validate,
            Self::Emit(_) => Stage::Emit,
        }
    }
}

/// A warning recorded when non-strict validation relaxes an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub stage: Stage,
    pub workflow: String,
    pub step: String,
    pub port: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        stage: Stage,
        workflow: impl Into<String>,
        step: impl Into<String>,
        port: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            workflow: workflow.into(),
            step: step.into(),
            port: port.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}.{}: {}",
            self.stage, self.workflow, self.step, self.port, self.message
        )
    }
}
