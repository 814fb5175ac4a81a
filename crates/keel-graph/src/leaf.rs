//! Leaf selection: the lowest in-flux module nothing else blocks

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, instrument};

use keel_core::error::GraphError;

use crate::graph::{DependencyGraph, ModuleNode, Traversal};
use crate::influx::{InFlux, InFluxCheck};

/// The chosen leaf and the other candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafSelection {
    /// Directory of the selected module
    pub leaf: PathBuf,
    /// Every candidate, sorted by path string
    pub candidates: Vec<PathBuf>,
    /// In-flux status of the selected module
    pub status: InFlux,
}

/// Pick the next module to work on.
///
/// A candidate is an in-flux module whose local dependencies are all
/// clean. Candidates are gathered over the whole traversal and the
/// lexicographically first directory wins.
#[instrument(skip_all, fields(modules = traversal.order.len()))]
pub fn select_leaf<M, C>(
    graph: &DependencyGraph<M>,
    traversal: &Traversal,
    checker: &mut C,
) -> Result<LeafSelection, GraphError>
where
    M: ModuleNode,
    C: InFluxCheck<M> + ?Sized,
{
    let mut candidates: Vec<(PathBuf, InFlux)> = Vec::new();

    for dir in &traversal.order {
        let Some(module) = graph.module_by_dir(dir) else {
            continue;
        };

        let status = checker.check(graph, module);
        if !status.in_flux {
            continue;
        }

        let blocked = graph
            .local_dependencies(module)
            .dirs
            .iter()
            .filter_map(|dep_dir| graph.module_by_dir(dep_dir))
            .find(|dep| checker.check(graph, dep).in_flux);

        match blocked {
            Some(dep) => debug!(
                module = module.identity(),
                blocked_by = dep.identity(),
                "in-flux module blocked by a dependency"
            ),
            None => candidates.push((dir.clone(), status)),
        }
    }

    candidates.sort_by(|a, b| a.0.as_os_str().cmp(b.0.as_os_str()));
    let (leaf, status) = candidates
        .first()
        .cloned()
        .ok_or(GraphError::NoSuitableLeaf)?;

    info!(
        leaf = %leaf.display(),
        candidates = candidates.len(),
        reason = status.reason.map(|r| r.as_str()).unwrap_or(""),
        "selected leaf module"
    );

    Ok(LeafSelection {
        leaf,
        candidates: candidates.into_iter().map(|(dir, _)| dir).collect(),
        status,
    })
}
