//! Compiler Output Documents
//!
//! Everything written to the output directory besides logs.
//!
//! # Structure
//!
//! - [`cwl`]: The CWL workflow document model and round-trip parsing
//! - [`job`]: The CWL job file built from user-supplied input values
//! - [`graphviz`]: DOT rendering of the assembled graph

pub mod cwl;
pub mod graphviz;
pub mod job;

pub use cwl::{parse_document, CwlStep, CwlWorkflow, RunRef};
pub use graphviz::{to_dot, GraphOptions};
pub use job::{job_inputs, JobInputs};
