//! Service dependency graph using `petgraph`.
//!
//! Services may depend on each other in cycles; bring-up order is left to
//! the readiness probes, so the graph is only used to compute which
//! services a selection pulls in.

use std::collections::HashMap;

use grund_common::error::{GrundError, Result};
use grund_common::types::Service;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

/// A dependency graph of services.
///
/// Edges point from a service to the services it depends on.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of `services` from their declared service dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`GrundError::NotFound`] if a service depends on a name that
    /// is not among `services`.
    pub fn from_services(services: &[Service]) -> Result<Self> {
        let mut graph = Self::new();
        for service in services {
            let _ = graph.add_service(&service.name);
        }
        for service in services {
            let dependent = graph.add_service(&service.name);
            for name in &service.depends_on.services {
                let Some(&dependency) = graph.nodes.get(name) else {
                    return Err(GrundError::NotFound {
                        kind: "service",
                        id: format!("{name} (required by {})", service.name),
                    });
                };
                graph.add_dependency(dependent, dependency);
            }
        }
        Ok(graph)
    }

    /// Adds a service node, returning the existing one if already present.
    pub fn add_service(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_owned());
        let _ = self.nodes.insert(name.to_owned(), idx);
        idx
    }

    /// Adds an edge: `dependent` depends on `dependency`.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.update_edge(dependent, dependency, ());
    }

    /// Number of services in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns `selected` plus every service they depend on transitively.
    ///
    /// Names appear in first-visit order, each once.
    ///
    /// # Errors
    ///
    /// Returns [`GrundError::NotFound`] if a selected name is unknown.
    pub fn closure(&self, selected: &[&str]) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut dfs = Dfs::empty(&self.graph);

        for name in selected {
            let Some(&start) = self.nodes.get(*name) else {
                return Err(GrundError::NotFound {
                    kind: "service",
                    id: (*name).to_owned(),
                });
            };
            dfs.move_to(start);
            while let Some(idx) = dfs.next(&self.graph) {
                order.push(self.graph[idx].clone());
            }
        }

        tracing::debug!(
            selected = selected.len(),
            closure = order.len(),
            "computed service closure"
        );
        Ok(order)
    }
}
