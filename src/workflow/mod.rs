//! Workflow Definition Module
//!
//! Provides the user-facing workflow description, its YAML loading, and the
//! AST the compiler works on.
//!
//! # Structure
//!
//! - [`model`]: Workflow description as written by the user
//! - [`parser`]: YAML parsing and loading
//! - [`ast`]: Typed workflow AST (ports, sources, steps)
//! - [`builder`]: Description to AST resolution against the registry

pub mod ast;
pub mod builder;
pub mod model;
pub mod parser;

pub use ast::{Direction, Port, Source, Step, Workflow, WorkflowOutput};
pub use builder::{build_workflow, AstBuilder};
pub use model::{BindingSpec, OutputDescription, StepDescription, WorkflowDescription};
pub use parser::{load_input_values, load_workflow, parse_workflow, workflow_name};
