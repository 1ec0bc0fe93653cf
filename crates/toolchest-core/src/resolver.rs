//! Dependency resolution: request → validated, layered execution plan.

use std::collections::{HashSet, VecDeque};

use toolchest_state::ManifestSnapshot;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{CatalogError, CatalogResult, ToolCatalog};
use crate::options::InstallationOptions;
use crate::plan::{ExecutionPlan, NodeState, PlanNode};

/// Turns requested tool/bundle ids into an [`ExecutionPlan`].
pub struct DependencyResolver<'a> {
    catalog: &'a ToolCatalog,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a ToolCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve `request` against the catalog and a manifest snapshot.
    ///
    /// 1. Expand bundles, dropping duplicates.
    /// 2. Take the transitive dependency closure (unless `skip_deps`).
    /// 3. Reject cycles inside the closure.
    /// 4. Drop tools already `Installed` (unless `force`); they still satisfy
    ///    their dependents.
    /// 5. Layer the rest with Kahn's algorithm, ties broken by declaration
    ///    order.
    pub fn resolve(
        &self,
        request: &[String],
        options: &InstallationOptions,
        installed: &ManifestSnapshot,
    ) -> CatalogResult<ExecutionPlan> {
        let requested = self.catalog.expand_request(request)?;
        let closure = if options.skip_deps {
            requested.clone()
        } else {
            self.closure(&requested)?
        };

        let graph = self.catalog.graph_over(closure.iter().map(String::as_str))?;
        if let Some(path) = graph.find_cycle() {
            return Err(CatalogError::CycleDetected { path });
        }

        let satisfied: HashSet<&str> = if options.force {
            HashSet::new()
        } else {
            graph
                .ids()
                .iter()
                .filter(|id| installed.get(id.as_str()).is_some_and(|r| r.is_installed()))
                .map(String::as_str)
                .collect()
        };
        let pre_satisfied: Vec<String> = graph
            .ids()
            .iter()
            .filter(|id| satisfied.contains(id.as_str()))
            .cloned()
            .collect();

        let plan_graph = graph.retain(|id| !satisfied.contains(id));
        let layers = plan_graph.layers()?;

        let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
        let mut nodes = Vec::with_capacity(plan_graph.len());
        for (layer, ids) in layers.iter().enumerate() {
            for id in ids {
                let tool = self
                    .catalog
                    .lookup(id)
                    .ok_or_else(|| CatalogError::UnknownTool { id: id.clone() })?;
                let dependencies = graph
                    .dependencies_of(id)?
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                nodes.push(PlanNode {
                    tool: tool.clone(),
                    dependencies,
                    state: NodeState::Pending,
                    layer,
                    requested: wanted.contains(id.as_str()),
                });
            }
        }

        let plan = ExecutionPlan {
            run_id: Uuid::new_v4().to_string(),
            nodes,
            layers,
            pre_satisfied,
            requested,
        };
        debug!(
            run_id = %plan.run_id,
            scheduled = plan.len(),
            pre_satisfied = plan.pre_satisfied.len(),
            layers = plan.layers.len(),
            "plan resolved"
        );
        Ok(plan)
    }

    /// Every tool reachable from `roots` over dependency edges, roots
    /// included. Order is discovery order; the graph re-sorts it.
    fn closure(&self, roots: &[String]) -> CatalogResult<Vec<String>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let tool = self
                .catalog
                .lookup(&id)
                .ok_or_else(|| CatalogError::UnknownTool { id: id.clone() })?;
            queue.extend(tool.dependencies.iter().cloned());
            out.push(id);
        }
        Ok(out)
    }
}
