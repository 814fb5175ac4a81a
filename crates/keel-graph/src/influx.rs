//! In-flux analysis: is a module safe to treat as released?

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use keel_git::GitRepo;

use crate::graph::{DependencyGraph, Module, ModuleNode};

/// Why a module is in flux
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InFluxReason {
    /// A direct requirement is pinned to a pseudo-version
    InFluxDependencies,
    /// The module subtree has staged, unstaged or untracked changes
    DirtyWorkingTree,
    /// The descriptor has replace directives
    ReplaceDirectives,
}

impl InFluxReason {
    /// Human-readable reason
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InFluxDependencies => "has in-flux dependencies",
            Self::DirtyWorkingTree => "dirty working tree",
            Self::ReplaceDirectives => "has replace directives",
        }
    }
}

impl fmt::Display for InFluxReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an in-flux check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InFlux {
    /// Whether the module is in flux
    pub in_flux: bool,
    /// First matching reason
    pub reason: Option<InFluxReason>,
}

impl InFlux {
    /// A clean module
    pub fn clean() -> Self {
        Self::default()
    }

    /// An in-flux module
    pub fn because(reason: InFluxReason) -> Self {
        Self {
            in_flux: true,
            reason: Some(reason),
        }
    }
}

/// Decides whether a module is in flux
pub trait InFluxCheck<M: ModuleNode = Module> {
    /// Check one module of `graph`
    fn check(&mut self, graph: &DependencyGraph<M>, module: &M) -> InFlux;
}

/// Git-backed analyzer with a per-run memo.
///
/// Checks run in priority order: pseudo-version requirements, then the
/// module's own working tree (nested modules excluded), then replace
/// directives. A repository that cannot be opened skips the tree check.
#[derive(Default)]
pub struct InFluxAnalyzer {
    results: HashMap<PathBuf, InFlux>,
    repos: HashMap<PathBuf, Option<GitRepo>>,
}

impl InFluxAnalyzer {
    /// Create an analyzer with an empty memo
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized modules
    pub fn cached(&self) -> usize {
        self.results.len()
    }

    fn repo(&mut self, root: &Path) -> Option<&GitRepo> {
        self.repos
            .entry(root.to_path_buf())
            .or_insert_with(|| match GitRepo::open(root) {
                Ok(repo) => Some(repo),
                Err(err) => {
                    debug!(repo = %root.display(), error = %err, "cannot open repository, skipping tree check");
                    None
                }
            })
            .as_ref()
    }

    fn is_dirty(&mut self, graph: &DependencyGraph<Module>, module: &Module) -> bool {
        let Some(root) = graph.repository_of(module).map(|r| r.root.clone()) else {
            return false;
        };
        let nested = graph.nested_module_dirs(module);
        let Some(repo) = self.repo(&root) else {
            return false;
        };
        let Some(subtree) = repo.relative_path(&module.directory) else {
            debug!(module = %module.identity, "module lies outside its repository workdir");
            return false;
        };
        let excluded: Vec<String> = nested
            .iter()
            .filter_map(|dir| repo.relative_path(dir))
            .collect();

        match repo.dirty_counts(Some(&subtree), &excluded) {
            Ok(counts) => counts.is_dirty(),
            Err(err) => {
                debug!(module = %module.identity, error = %err, "status unavailable, skipping tree check");
                false
            }
        }
    }
}

impl InFluxCheck<Module> for InFluxAnalyzer {
    fn check(&mut self, graph: &DependencyGraph<Module>, module: &Module) -> InFlux {
        if let Some(cached) = self.results.get(&module.directory) {
            return *cached;
        }

        let result = if module.direct_requirements().any(|d| d.is_pseudo_version()) {
            InFlux::because(InFluxReason::InFluxDependencies)
        } else if self.is_dirty(graph, module) {
            InFlux::because(InFluxReason::DirtyWorkingTree)
        } else if module.has_replaces() {
            InFlux::because(InFluxReason::ReplaceDirectives)
        } else {
            InFlux::clean()
        };

        debug!(
            module = %module.identity,
            in_flux = result.in_flux,
            reason = result.reason.map(|r| r.as_str()).unwrap_or(""),
            "in-flux check"
        );
        self.results.insert(module.directory.clone(), result);
        result
    }
}
