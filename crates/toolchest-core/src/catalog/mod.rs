//! Tool catalog: the registry of installable tools and bundles.
//!
//! The catalog is pure data. It is validated once at load time (unknown
//! dependencies, duplicate ids, cycles) and is read-only afterwards, so it can
//! be shared across workers behind an `Arc` without locking.
//!
//! Declaration order of `tools` is significant: it is the deterministic
//! tie-break used by the resolver and the scheduler.

pub mod error;
pub mod model;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::{CatalogError, CatalogResult};
pub use model::{BundleConfig, InstallRef, PackageManagerKind, ToolConfig};

use crate::graph::ToolGraph;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    tools: Vec<ToolConfig>,
    #[serde(default)]
    bundles: Vec<BundleConfig>,
}

/// Validated, read-only registry of tools and bundles.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolConfig>,
    tool_index: HashMap<String, usize>,
    bundles: Vec<BundleConfig>,
    bundle_index: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Build and validate a catalog from tool and bundle definitions.
    pub fn new(tools: Vec<ToolConfig>, bundles: Vec<BundleConfig>) -> CatalogResult<Self> {
        let mut tool_index = HashMap::with_capacity(tools.len());
        for (pos, tool) in tools.iter().enumerate() {
            if tool_index.insert(tool.id.clone(), pos).is_some() {
                return Err(CatalogError::DuplicateTool {
                    id: tool.id.clone(),
                });
            }
        }

        let mut bundle_index = HashMap::with_capacity(bundles.len());
        for (pos, bundle) in bundles.iter().enumerate() {
            if tool_index.contains_key(&bundle.id)
                || bundle_index.insert(bundle.id.clone(), pos).is_some()
            {
                return Err(CatalogError::DuplicateBundle {
                    id: bundle.id.clone(),
                });
            }
        }

        let catalog = Self {
            tools,
            tool_index,
            bundles,
            bundle_index,
        };
        catalog.validate()?;
        debug!(
            tools = catalog.tools.len(),
            bundles = catalog.bundles.len(),
            "catalog validated"
        );
        Ok(catalog)
    }

    /// Parse a JSON catalog document (`{"tools": [...], "bundles": [...]}`).
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let doc: CatalogDocument = serde_json::from_str(json)?;
        Self::new(doc.tools, doc.bundles)
    }

    /// Load and validate a JSON catalog file.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Serialize back to the JSON document format.
    pub fn to_json_string(&self) -> CatalogResult<String> {
        let doc = CatalogDocument {
            tools: self.tools.clone(),
            bundles: self.bundles.clone(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn lookup(&self, id: &str) -> Option<&ToolConfig> {
        self.tool_index.get(id).map(|&pos| &self.tools[pos])
    }

    pub fn bundle(&self, id: &str) -> Option<&BundleConfig> {
        self.bundle_index.get(id).map(|&pos| &self.bundles[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tool_index.contains_key(id)
    }

    pub fn is_bundle(&self, id: &str) -> bool {
        self.bundle_index.contains_key(id)
    }

    /// Position of `id` in declaration order.
    pub fn declaration_index(&self, id: &str) -> Option<usize> {
        self.tool_index.get(id).copied()
    }

    /// Tools in declaration order.
    pub fn tools(&self) -> &[ToolConfig] {
        &self.tools
    }

    pub fn bundles(&self) -> &[BundleConfig] {
        &self.bundles
    }

    /// Member tool ids of a bundle, in the bundle's own order.
    pub fn expand_bundle(&self, bundle_id: &str) -> CatalogResult<Vec<String>> {
        self.bundle(bundle_id)
            .map(|b| b.tools.clone())
            .ok_or_else(|| CatalogError::UnknownTool {
                id: bundle_id.to_string(),
            })
    }

    /// Expand a mix of tool and bundle ids into tool ids.
    ///
    /// First occurrence wins; duplicates are dropped.
    pub fn expand_request(&self, ids: &[String]) -> CatalogResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            let members = if self.contains(id) {
                vec![id.clone()]
            } else if self.is_bundle(id) {
                self.expand_bundle(id)?
            } else {
                return Err(CatalogError::UnknownTool { id: id.clone() });
            };
            for member in members {
                if seen.insert(member.clone()) {
                    out.push(member);
                }
            }
        }
        Ok(out)
    }

    /// Check that every dependency and bundle member resolves and that the
    /// dependency relation is acyclic.
    pub fn validate(&self) -> CatalogResult<()> {
        for tool in &self.tools {
            for dep in &tool.dependencies {
                if !self.contains(dep) {
                    return Err(CatalogError::UnknownDependency {
                        tool: tool.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        for bundle in &self.bundles {
            if let Some(missing) = bundle.tools.iter().find(|t| !self.contains(t)) {
                return Err(CatalogError::UnknownBundleMember {
                    bundle: bundle.id.clone(),
                    tool: missing.clone(),
                });
            }
        }

        if let Some(path) = self.dependency_graph()?.find_cycle() {
            return Err(CatalogError::CycleDetected { path });
        }
        Ok(())
    }

    /// The full dependency graph, nodes in declaration order.
    pub fn dependency_graph(&self) -> CatalogResult<ToolGraph> {
        self.graph_over(self.tools.iter().map(|t| t.id.as_str()))
    }

    /// Dependency graph restricted to `ids`. Nodes are added in declaration
    /// order regardless of the order of `ids`; edges to tools outside the set
    /// are dropped.
    /// The first unknown id, in input order, is an error.
    pub fn graph_over<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> CatalogResult<ToolGraph> {
        let mut wanted: HashSet<&str> = HashSet::new();
        for id in ids {
            if !self.contains(id) {
                return Err(CatalogError::UnknownTool { id: id.to_string() });
            }
            wanted.insert(id);
        }
        let mut graph = ToolGraph::new();
        for tool in self.tools.iter().filter(|t| wanted.contains(t.id.as_str())) {
            graph.add_node(&tool.id);
        }
        for tool in self.tools.iter().filter(|t| wanted.contains(t.id.as_str())) {
            for dep in tool.dependencies.iter().filter(|d| wanted.contains(d.as_str())) {
                graph.add_dependency(dep, &tool.id)?;
            }
        }
        Ok(graph)
    }
}
