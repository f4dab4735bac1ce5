//! WIC - Workflow Inference Compiler
//!
//! Compiles high-level workflow descriptions, which list steps and only the
//! bindings the author cares about, into complete CWL v1.2 workflows. Missing
//! edges are inferred from port types, unresolvable ones can be bridged by
//! inserting adapter steps, and sub-workflows can be inlined.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`registry`]: Typed tool, adapter and sub-workflow signatures
//! - [`workflow`]: Workflow descriptions, YAML loading and the typed AST
//! - [`compiler`]: Inference, repair, inlining, validation and emission
//! - [`document`]: CWL document, job file and Graphviz output
//! - [`runner`]: Handing the compiled workflow to a CWL runner
//! - [`config`]: Compiler options
//! - [`error`]: Errors and diagnostics
//!
//! # Example
//!
//! ```rust,no_run
//! use wic::{compile, load_registry, load_workflow, CompilerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = load_registry("catalog.yml")?;
//!     let description = load_workflow("align.wic.yml")?;
//!
//!     let config = CompilerConfig::default().with_naming_tiebreak(true);
//!     let compilation = compile(&registry, &config, "align", &description)?;
//!
//!     println!("{}", compilation.to_yaml()?);
//!     Ok(())
//! }
//! ```

pub mod compiler;
pub mod config;
pub mod document;
pub mod error;
pub mod registry;
pub mod runner;
pub mod workflow;

// Re-export commonly used types
pub use compiler::{compile, Compilation, Compiler};
pub use config::CompilerConfig;
pub use error::{CompileError, Diagnostic, Result, Stage};
pub use registry::{load_registry, Registry};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "wic";
