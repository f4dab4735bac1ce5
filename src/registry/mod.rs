//! Tool and Sub-workflow Registry
//!
//! Provides the typed signatures the compiler matches against.
//!
//! # Structure
//!
//! - [`types`]: Port types and the compatibility relation
//! - [`signature`]: Port declarations, signatures and catalog entries
//! - [`catalog`]: The read-only registry and its YAML loader

pub mod catalog;
pub mod signature;
pub mod types;

pub use catalog::{load_registry, Registry};
pub use signature::{CatalogEntry, LeafTool, PortDecl, Signature, SubWorkflow, ToolKind};
pub use types::{compatibility, Compatibility, PortType, Primitive};
