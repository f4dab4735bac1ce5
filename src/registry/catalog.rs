//! Signature Registry
//!
//! Immutable lookup table from identifiers to catalog entries. The compiler
//! only ever reads from a [`Registry`]; it is built once (programmatically or
//! from a catalog file) and passed by reference.
//!
//! # Example Catalog
//!
//! ```yaml
//! tools:
//!   - id: bowtie2
//!     run: tools/bowtie2.cwl
//!     inputs:
//!       reads: File
//!       index: Directory
//!     outputs:
//!       alignment: File
//!
//!   - id: gunzip
//!     kind: adapter
//!     inputs: {archive: File}
//!     outputs: {file: File}
//!
//!   - id: align_and_sort
//!     kind: workflow
//!     path: workflows/align_and_sort.yml
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::Deserialize;

use super::signature::{port_map, CatalogEntry, LeafTool, PortDecl, Signature, SubWorkflow};
use crate::error::{CompileError, Result};
use crate::workflow::model::WorkflowDescription;
use crate::workflow::parser::load_workflow;

/// Read-only map of tool, adapter and sub-workflow signatures.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, rejecting duplicate identifiers.
    pub fn insert(&mut self, entry: CatalogEntry) -> Result<()> {
        let id = entry.id().to_string();
        if self.entries.contains_key(&id) {
            return Err(CompileError::parse(
                "catalog",
                format!("'{}' is declared more than once", id),
            ));
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    /// Builder-style variant of [`Registry::insert`].
    pub fn with(mut self, entry: CatalogEntry) -> Result<Self> {
        self.insert(entry)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Returns the adapters eligible for repair.
    ///
    /// With a whitelist, adapters come back in whitelist order and unknown or
    /// non-adapter names are skipped. Without one, every catalog adapter is
    /// eligible in identifier order.
    pub fn adapters(&self, whitelist: Option<&[String]>) -> Vec<&LeafTool> {
        match whitelist {
            Some(names) => names
                .iter()
                .filter_map(|name| match self.entries.get(name) {
                    Some(CatalogEntry::Adapter(tool)) => Some(tool),
                    Some(_) => {
                        warn!("Whitelisted '{}' is not an adapter; ignoring", name);
                        None
                    }
                    None => {
                        warn!("Whitelisted adapter '{}' is not in the catalog", name);
                        None
                    }
                })
                .collect(),
            None => self
                .entries
                .values()
                .filter_map(|entry| match entry {
                    CatalogEntry::Adapter(tool) => Some(tool),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Parses a catalog from YAML text. Relative sub-workflow paths are
    /// resolved against `base_dir`.
    pub fn from_yaml_str(yaml: &str, base_dir: &Path) -> Result<Self> {
        let file: CatalogFile =
            serde_yaml::from_str(yaml).map_err(|e| CompileError::parse("catalog", e))?;

        let mut registry = Self::new();
        for raw in file.tools {
            let entry = raw.into_entry(base_dir)?;
            debug!(
                "Catalog entry '{}' ({:?}): {} inputs, {} outputs",
                entry.id(),
                entry.kind(),
                entry.signature().inputs.len(),
                entry.signature().outputs.len()
            );
            registry.insert(entry)?;
        }
        Ok(registry)
    }
}

/// Loads a catalog file.
pub fn load_registry(path: impl AsRef<Path>) -> Result<Registry> {
    let path = path.as_ref();
    info!("Loading catalog from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let registry = Registry::from_yaml_str(&content, base_dir)?;

    info!(
        "Catalog loaded: {} entries ({} adapters)",
        registry.len(),
        registry.adapters(None).len()
    );
    Ok(registry)
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tools: Vec<RawEntry>,
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RawKind {
    #[default]
    Tool,
    Adapter,
    Workflow,
}

#[derive(Deserialize)]
struct RawEntry {
    id: String,
    #[serde(default)]
    kind: RawKind,
    #[serde(default)]
    run: Option<String>,
    #[serde(default, deserialize_with = "port_map")]
    inputs: Vec<PortDecl>,
    #[serde(default, deserialize_with = "port_map")]
    outputs: Vec<PortDecl>,
    #[serde(default)]
    workflow: Option<WorkflowDescription>,
    #[serde(default)]
    path: Option<String>,
}

impl RawEntry {
    fn into_entry(self, base_dir: &Path) -> Result<CatalogEntry> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(CompileError::parse("catalog", "entry has an empty id"));
        }

        match self.kind {
            RawKind::Tool | RawKind::Adapter => {
                let signature = Signature {
                    id: id.clone(),
                    inputs: self.inputs,
                    outputs: self.outputs,
                };
                let mut tool = LeafTool::new(signature);
                if let Some(run) = self.run {
                    tool = tool.with_run(run);
                }
                Ok(if self.kind == RawKind::Adapter {
                    CatalogEntry::Adapter(tool)
                } else {
                    CatalogEntry::LeafTool(tool)
                })
            }
            RawKind::Workflow => {
                let description = match (self.workflow, self.path) {
                    (Some(description), _) => description,
                    (None, Some(path)) => load_workflow(base_dir.join(path))?,
                    (None, None) => {
                        return Err(CompileError::parse(
                            "catalog",
                            format!("workflow '{}' needs either 'workflow' or 'path'", id),
                        ))
                    }
                };
                Ok(CatalogEntry::SubWorkflow(SubWorkflow::new(id, description)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::signature::ToolKind;
    use crate::registry::types::PortType;

    const CATALOG: &str = r#"
tools:
  - id: bowtie2
    run: tools/bowtie2.cwl
    inputs:
      reads: File
      index: Directory
    outputs:
      alignment: File
  - id: gunzip
    kind: adapter
    inputs: {archive: File}
    outputs: {file: File}
  - id: to_string
    kind: adapter
    inputs: {file: File}
    outputs: {text: string}
  - id: align
    kind: workflow
    workflow:
      inputs: {reads: File}
      steps:
        - id: run
          tool: bowtie2
      outputs: {alignment: File}
"#;

    #[test]
    fn test_from_yaml_str() {
        let registry = Registry::from_yaml_str(CATALOG, Path::new(".")).unwrap();
        assert_eq!(registry.len(), 4);

        let bowtie = registry.get("bowtie2").unwrap();
        assert_eq!(bowtie.kind(), ToolKind::LeafTool);
        assert_eq!(bowtie.run_path(), Some("tools/bowtie2.cwl"));
        assert_eq!(bowtie.signature().inputs[1].ty, PortType::Directory);

        let align = registry.get("align").unwrap();
        assert_eq!(align.kind(), ToolKind::SubWorkflow);
        assert_eq!(align.signature().inputs[0].name, "reads");
        assert_eq!(align.signature().outputs[0].name, "alignment");
    }

    #[test]
    fn test_adapters_default_order() {
        let registry = Registry::from_yaml_str(CATALOG, Path::new(".")).unwrap();
        let ids: Vec<_> = registry
            .adapters(None)
            .iter()
            .map(|a| a.signature.id.as_str())
            .collect();
        assert_eq!(ids, vec!["gunzip", "to_string"]);
    }

    #[test]
    fn test_adapters_whitelist_order() {
        let registry = Registry::from_yaml_str(CATALOG, Path::new(".")).unwrap();
        let whitelist = vec![
            "to_string".to_string(),
            "bowtie2".to_string(),
            "missing".to_string(),
            "gunzip".to_string(),
        ];
        let ids: Vec<_> = registry
            .adapters(Some(&whitelist))
            .iter()
            .map(|a| a.signature.id.as_str())
            .collect();
        assert_eq!(ids, vec!["to_string", "gunzip"]);
    }

    #[test]
    fn test_duplicate_entry() {
        let yaml = r#"
tools:
  - id: a
  - id: a
"#;
        assert!(Registry::from_yaml_str(yaml, Path::new(".")).is_err());
    }

    #[test]
    fn test_workflow_without_definition() {
        let yaml = r#"
tools:
  - id: w
    kind: workflow
"#;
        let err = Registry::from_yaml_str(yaml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("needs either"));
    }

    #[test]
    fn test_load_registry_with_workflow_path() {
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("workflows")).unwrap();
        std::fs::write(
            temp_dir.path().join("workflows/inner.yml"),
            "inputs: {x: int}\nsteps: []\noutputs: {y: {type: int, source: x}}\n",
        )
        .unwrap();
        let catalog = temp_dir.path().join("catalog.yml");
        std::fs::write(
            &catalog,
            "tools:\n  - id: inner\n    kind: workflow\n    path: workflows/inner.yml\n",
        )
        .unwrap();

        let registry = load_registry(&catalog).unwrap();
        assert_eq!(registry.get("inner").unwrap().kind(), ToolKind::SubWorkflow);
    }

    #[test]
    fn test_load_registry_missing_file() {
        assert!(load_registry("/nonexistent/catalog.yml").is_err());
    }
}
