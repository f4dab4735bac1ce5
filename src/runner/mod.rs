//! Running Compiled Workflows
//!
//! The compiler never executes tools itself. This module hands the emitted
//! document and job file to a third-party CWL runner.
//!
//! # Structure
//!
//! - [`script`]: Runner command construction and `run.sh` generation
//! - [`local`]: Running that command on the local machine

pub mod local;
pub mod script;

pub use local::run_local;
pub use script::{build_command, generate_run_script, shell_join, CwlRunner, RunnerOptions, RUN_SCRIPT};
