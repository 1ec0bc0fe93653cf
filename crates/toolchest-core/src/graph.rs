//! Tool dependency graph and layered topological ordering.
//!
//! Tools are nodes in a directed graph. An edge `A → B` means "B depends on
//! A": A must finish installing before B may start.
//!
//! Node insertion order is the tie-break everywhere: whenever several nodes
//! become ready at once they come out in the order they were added, which the
//! catalog sets to declaration order. Hash-map iteration order never leaks
//! into a plan.

use std::collections::{BTreeSet, HashMap};

use crate::catalog::{CatalogError, CatalogResult};

/// Directed dependency graph over tool ids.
///
/// Edges are stored as both `dependency → dependents` and
/// `dependent → dependencies` adjacency sets, keyed by insertion position.
#[derive(Debug, Clone, Default)]
pub struct ToolGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// `node → {dependency, ...}`
    upstream: Vec<BTreeSet<usize>>,
    /// `node → {dependent, ...}`
    downstream: Vec<BTreeSet<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

impl ToolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Idempotent; returns the node's position.
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&pos) = self.index.get(id) {
            return pos;
        }
        let pos = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), pos);
        self.upstream.push(BTreeSet::new());
        self.downstream.push(BTreeSet::new());
        pos
    }

    /// Add an edge: `dependent` depends on `dependency`.
    ///
    /// Both nodes must already be registered. Cycles are not rejected here;
    /// call [`ToolGraph::find_cycle`] once the graph is complete.
    pub fn add_dependency(&mut self, dependency: &str, dependent: &str) -> CatalogResult<()> {
        let dep = self.position(dependency)?;
        let node = self.position(dependent)?;
        self.upstream[node].insert(dep);
        self.downstream[dep].insert(node);
        Ok(())
    }

    fn position(&self, id: &str) -> CatalogResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| CatalogError::UnknownTool { id: id.to_string() })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Node ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Direct dependencies of `id`, in insertion order.
    pub fn dependencies_of(&self, id: &str) -> CatalogResult<Vec<&str>> {
        let pos = self.position(id)?;
        Ok(self.upstream[pos]
            .iter()
            .map(|&i| self.ids[i].as_str())
            .collect())
    }

    /// Copy of the graph restricted to nodes for which `keep` returns true.
    /// Edges touching a dropped node are dropped with it.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> ToolGraph {
        let mut out = ToolGraph::new();
        for id in self.ids.iter().filter(|id| keep(id)) {
            out.add_node(id);
        }
        for (node, deps) in self.upstream.iter().enumerate() {
            if !out.contains(&self.ids[node]) {
                continue;
            }
            for &dep in deps {
                let dep_id = &self.ids[dep];
                if out.contains(dep_id) {
                    // Both endpoints were just registered.
                    let _ = out.add_dependency(dep_id, &self.ids[node]);
                }
            }
        }
        out
    }

    /// Find one dependency cycle, if any.
    ///
    /// The returned path follows "depends on" edges and repeats its first
    /// node at the end, e.g. `["a", "b", "a"]` for a ↔ b. Search starts from
    /// nodes in insertion order, so the reported cycle is deterministic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.ids.len()];
        let mut path = Vec::new();
        for start in 0..self.ids.len() {
            if marks[start] == Mark::Unvisited {
                if let Some(cycle) = self.dfs_cycle(start, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        marks[node] = Mark::OnPath;
        path.push(node);

        for &dep in &self.upstream[node] {
            match marks[dep] {
                Mark::OnPath => {
                    let from = path.iter().position(|&p| p == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[from..].iter().map(|&i| self.ids[i].clone()).collect();
                    cycle.push(self.ids[dep].clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.dfs_cycle(dep, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[node] = Mark::Done;
        None
    }

    /// Kahn's algorithm with level tracking.
    ///
    /// Layer 0 holds every node without dependencies; layer k holds the nodes
    /// whose dependencies all sit in earlier layers. Within a layer, nodes
    /// keep insertion order.
    pub fn layers(&self) -> CatalogResult<Vec<Vec<String>>> {
        let mut in_degree: Vec<usize> = self.upstream.iter().map(BTreeSet::len).collect();
        let mut current: Vec<usize> = (0..self.ids.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut layers = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut next = BTreeSet::new();
            for &node in &current {
                for &dependent in &self.downstream[node] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.insert(dependent);
                    }
                }
            }
            layers.push(current.iter().map(|&i| self.ids[i].clone()).collect());
            current = next.into_iter().collect();
        }

        if placed != self.ids.len() {
            let path = self.find_cycle().unwrap_or_else(|| {
                (0..self.ids.len())
                    .filter(|&i| in_degree[i] > 0)
                    .map(|i| self.ids[i].clone())
                    .collect()
            });
            return Err(CatalogError::CycleDetected { path });
        }

        Ok(layers)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> ToolGraph {
        let mut g = ToolGraph::new();
        for n in nodes {
            g.add_node(n);
        }
        for (dep, dependent) in edges {
            g.add_dependency(dep, dependent).unwrap();
        }
        g
    }

    fn diamond() -> ToolGraph {
        // A→B, A→C, B→D, C→D
        graph(
            &["A", "B", "C", "D"],
            &[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")],
        )
    }

    #[test]
    fn test_layers_group_independent_nodes() {
        let layers = diamond().layers().unwrap();
        assert_eq!(
            layers,
            vec![vec!["A".to_string()], vec!["B".into(), "C".into()], vec!["D".into()]]
        );
    }

    #[test]
    fn test_layer_order_follows_insertion_not_name() {
        let g = graph(&["zeta", "alpha", "mid"], &[]);
        assert_eq!(g.layers().unwrap(), vec![vec!["zeta", "alpha", "mid"]]);
    }

    #[test]
    fn test_find_cycle_reports_repeated_node() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(matches!(g.layers(), Err(CatalogError::CycleDetected { .. })));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = graph(&["solo"], &[("solo", "solo")]);
        assert_eq!(g.find_cycle().unwrap(), vec!["solo", "solo"]);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        assert!(diamond().find_cycle().is_none());
    }

    #[test]
    fn test_retain_drops_edges_to_removed_nodes() {
        let kept = diamond().retain(|id| id != "A");
        assert_eq!(kept.len(), 3);
        assert!(kept.dependencies_of("B").unwrap().is_empty());
        assert_eq!(kept.dependencies_of("D").unwrap(), vec!["B", "C"]);
        assert_eq!(kept.layers().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_node_in_edge_is_rejected() {
        let mut g = graph(&["A"], &[]);
        assert!(matches!(
            g.add_dependency("A", "missing"),
            Err(CatalogError::UnknownTool { .. })
        ));
    }
}
