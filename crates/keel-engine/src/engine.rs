//! The release readiness pipeline

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use keel_apidiff::compare_trees;
use keel_core::error::{EngineError, GraphError};
use keel_core::{DirtyCounts, Result};
use keel_git::types::module_tag_version;
use keel_git::{CachedWorktree, GitRepo, TagInfo, UpstreamStatus};
use keel_graph::{discover, select_leaf, DependencyGraph, GraphBuilder, InFluxAnalyzer, Module};

use crate::options::EngineOptions;
use crate::progress::{Cancellation, Progress};
use crate::result::{EngineResult, ModuleSummary};
use crate::verdict::{self, Outcome};

/// Git state of the leaf's repository
#[derive(Debug, Default)]
struct RepositoryStatus {
    upstream: UpstreamStatus,
    dirty: DirtyCounts,
    missing_remote_tags: Vec<String>,
}

/// Runs discovery, graph traversal, leaf selection and the verdict
#[derive(Debug)]
pub struct Engine {
    options: EngineOptions,
}

impl Engine {
    /// Create an engine
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    /// Options this engine runs with
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Pick the next module to release from the repository containing
    /// `start_dir` and judge whether releasing it would break its API.
    ///
    /// Only the cache mirror is written to. `cancel` is checked before each
    /// stage.
    #[instrument(skip(self, progress, cancel), fields(start = %start_dir.display()))]
    pub fn run(
        &self,
        start_dir: &Path,
        progress: &mut Progress<'_>,
        cancel: &Cancellation,
    ) -> Result<EngineResult> {
        if self.options.roots.is_empty() {
            return Err(EngineError::NoScanRoots.into());
        }

        cancel.check("discovery")?;
        let roots = self.options.resolved_roots(start_dir);
        progress.line(format_args!("Scanning {} root(s) for go.mod files", roots.len()));
        let report = discover(&roots, &*self.options.managed);
        let mut warnings: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();

        cancel.check("graph build")?;
        let mut builder = GraphBuilder::<Module>::new();
        builder.add_descriptors(report.descriptors);
        let graph = builder.build();
        warnings.extend(graph.errors().iter().map(|e| e.to_string()));
        progress.line(format_args!(
            "Found {} module(s) in {} repositories",
            graph.len(),
            graph.repositories().count()
        ));

        let traversal = graph.traverse_from(start_dir)?;
        warnings.extend(traversal.warnings.iter().cloned());
        let unresolved_allowed = self.unresolved_allowed(&graph, &traversal.order);

        cancel.check("leaf selection")?;
        let mut analyzer = InFluxAnalyzer::new();
        let selection = select_leaf(&graph, &traversal, &mut analyzer)?;
        let module = graph
            .module_by_dir(&selection.leaf)
            .ok_or_else(|| GraphError::UnknownModule(selection.leaf.clone()))?;
        let repository = graph
            .repository_of(module)
            .ok_or_else(|| GraphError::NoRepository(module.directory.clone()))?;
        progress.line(format_args!(
            "Next module: {} ({})",
            module.identity,
            selection
                .status
                .reason
                .map(|r| r.as_str())
                .unwrap_or("in flux")
        ));

        cancel.check("repository status")?;
        let repo = match GitRepo::open(&repository.root) {
            Ok(repo) => Some(repo),
            Err(err) => {
                warn!(repo = %repository.root.display(), error = %err, "cannot open repository");
                warnings.push(format!("{}: {}", repository.root.display(), err));
                None
            }
        };
        let relative = repo
            .as_ref()
            .and_then(|r| r.relative_path(&module.directory))
            .unwrap_or_default();
        let prefix = verdict::tag_prefix(&relative, self.options.independent_tags);
        let status = match &repo {
            Some(repo) => self.repository_status(repo, &graph, module, &relative, &prefix, &mut warnings),
            None => RepositoryStatus::default(),
        };

        cancel.check("verdict")?;
        let head = repo.as_ref().filter(|r| r.has_head());
        let baseline = match head {
            Some(repo) => repo.latest_reachable_tag(&prefix)?,
            None => None,
        };
        let outcome = self.verdict(
            module,
            &repository.root,
            repo.as_ref(),
            baseline.as_ref(),
            &relative,
            progress,
        )?;

        let at_head = match head {
            Some(repo) => repo
                .module_tags_at_head(&prefix)?
                .into_iter()
                .map(|t| t.name)
                .collect(),
            None => Vec::new(),
        };
        let unpushed_tag_warning = verdict::unpushed_tag(
            baseline.as_ref().map(|t| t.name.as_str()),
            &at_head,
            &status.missing_remote_tags,
        )
        .map(|tag| format!("tag {} has not been pushed to {}", tag, self.options.remote));
        if let Some(warning) = &unpushed_tag_warning {
            warn!(module = %module.identity, "{}", warning);
        }

        progress.line(format_args!("Verdict: {} ({})", outcome.verdict, outcome.reason));
        info!(
            module = %module.identity,
            verdict = %outcome.verdict,
            reason = %outcome.reason,
            "engine run complete"
        );

        Ok(EngineResult {
            leaf: selection.leaf.clone(),
            module: module.identity.clone(),
            in_flux_reason: selection.status.reason,
            candidates: selection.candidates,
            repository: repository.root.clone(),
            modules: graph
                .modules_in(&repository.root)
                .map(|m| ModuleSummary {
                    identity: m.identity.clone(),
                    directory: m.directory.clone(),
                })
                .collect(),
            branch: status.upstream.branch,
            upstream: status.upstream.upstream,
            ahead: status.upstream.ahead,
            behind: status.upstream.behind,
            dirty: status.dirty,
            missing_remote_tags: status.missing_remote_tags,
            verdict: outcome.verdict,
            verdict_reason: outcome.reason,
            unpushed_tag_warning,
            baseline_tag: baseline.map(|t| t.name),
            api_report: outcome.api_report,
            unresolved_allowed,
            warnings,
        })
    }

    /// Allow-listed requirements of traversed modules that no scanned
    /// directory declares
    fn unresolved_allowed(&self, graph: &DependencyGraph<Module>, order: &[PathBuf]) -> Vec<String> {
        if self.options.allow.is_empty() {
            return Vec::new();
        }

        let unresolved: BTreeSet<String> = order
            .iter()
            .filter_map(|dir| graph.module_by_dir(dir))
            .flat_map(|module| graph.external_dependencies(module))
            .filter(|identity| self.options.allow.matches(identity))
            .map(str::to_string)
            .collect();

        for identity in &unresolved {
            info!(module = %identity, "allow-listed requirement not found on disk");
        }
        unresolved.into_iter().collect()
    }

    fn repository_status(
        &self,
        repo: &GitRepo,
        graph: &DependencyGraph<Module>,
        module: &Module,
        relative: &str,
        prefix: &str,
        warnings: &mut Vec<String>,
    ) -> RepositoryStatus {
        let upstream = repo.upstream_status().unwrap_or_else(|err| {
            warn!(error = %err, "cannot read upstream status");
            warnings.push(format!("upstream status: {}", err));
            UpstreamStatus::default()
        });

        let excluded: Vec<String> = graph
            .nested_module_dirs(module)
            .iter()
            .filter_map(|dir| repo.relative_path(dir))
            .collect();
        let dirty = repo
            .dirty_counts(Some(relative), &excluded)
            .unwrap_or_else(|err| {
                warn!(error = %err, "cannot read working tree status");
                warnings.push(format!("working tree status: {}", err));
                DirtyCounts::default()
            });

        let missing_remote_tags = self.missing_remote_tags(repo, prefix, warnings);

        debug!(
            branch = upstream.branch.as_deref().unwrap_or(""),
            ahead = upstream.ahead,
            behind = upstream.behind,
            dirty = dirty.total(),
            missing = missing_remote_tags.len(),
            "repository status"
        );
        RepositoryStatus {
            upstream,
            dirty,
            missing_remote_tags,
        }
    }

    fn missing_remote_tags(&self, repo: &GitRepo, prefix: &str, warnings: &mut Vec<String>) -> Vec<String> {
        let remote = self.options.remote.as_str();
        match repo.has_remote(remote) {
            Ok(true) => {}
            Ok(false) => {
                debug!(remote, "remote not configured, skipping tag check");
                return Vec::new();
            }
            Err(err) => {
                warnings.push(format!("remote {}: {}", remote, err));
                return Vec::new();
            }
        }

        match repo.missing_remote_tags(remote, prefix, self.options.git_timeout) {
            Ok(tags) => tags
                .into_iter()
                .filter(|tag| module_tag_version(tag, prefix).is_some())
                .collect(),
            Err(err) => {
                warn!(remote, error = %err, "cannot list remote tags");
                warnings.push(format!("remote {}: {}", remote, err));
                Vec::new()
            }
        }
    }

    /// Withhold, or diff the live module against its baseline tag checked
    /// out in the cache mirror
    fn verdict(
        &self,
        module: &Module,
        repo_root: &Path,
        repo: Option<&GitRepo>,
        baseline: Option<&TagInfo>,
        relative: &str,
        progress: &mut Progress<'_>,
    ) -> Result<Outcome> {
        if let Some(reason) = verdict::descriptor_withheld_reason(module) {
            return Ok(Outcome::withheld(reason));
        }
        let Some(repo) = repo else {
            return Ok(Outcome::withheld(verdict::NO_REPOSITORY));
        };
        if !repo.has_head() {
            return Ok(Outcome::withheld(verdict::NO_HEAD));
        }
        let Some(baseline) = baseline else {
            return Ok(Outcome::withheld(verdict::NO_BASELINE_TAG));
        };

        progress.line(format_args!(
            "Comparing {} against {}",
            module.identity, baseline.name
        ));
        let mut worktree = match CachedWorktree::open(repo_root, &self.options.cache) {
            Ok(worktree) => worktree,
            Err(err) => {
                warn!(repo = %repo_root.display(), error = %err, "cached checkout unavailable");
                return Ok(Outcome::withheld(format!("cached checkout unavailable: {}", err)));
            }
        };
        if let Err(err) = worktree.checkout(&baseline.name).map(|_| ()) {
            warn!(tag = %baseline.name, error = %err, "cannot check out baseline");
            release(&mut worktree);
            return Ok(Outcome::withheld(format!("cached checkout unavailable: {}", err)));
        }

        let old_tree = worktree.tree(relative);
        let report = compare_trees(&old_tree, &module.directory, &module.identity, &self.options.diff);
        release(&mut worktree);

        Ok(Outcome::from_report(report?, &baseline.name))
    }
}

fn release(worktree: &mut CachedWorktree) {
    if let Err(err) = worktree.close() {
        warn!(error = %err, "failed to release cached checkout");
    }
}
