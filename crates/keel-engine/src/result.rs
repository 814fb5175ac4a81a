//! Engine run result

use std::path::PathBuf;

use serde::Serialize;

use keel_apidiff::ApiDiffReport;
use keel_core::{DirtyCounts, Verdict};
use keel_git::Upstream;
use keel_graph::InFluxReason;

/// A module of the leaf's repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    /// Module path
    pub identity: String,
    /// Module directory
    pub directory: PathBuf,
}

/// Everything one engine run found out about the next module to release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineResult {
    /// Directory of the selected leaf module
    pub leaf: PathBuf,
    /// Module path of the leaf
    pub module: String,
    /// Why the leaf is in flux
    pub in_flux_reason: Option<InFluxReason>,
    /// Every leaf candidate, sorted by path
    pub candidates: Vec<PathBuf>,
    /// Root of the repository owning the leaf
    pub repository: PathBuf,
    /// Modules of that repository, in identity order
    pub modules: Vec<ModuleSummary>,
    /// Current branch, `None` when detached
    pub branch: Option<String>,
    /// Upstream of the current branch
    pub upstream: Option<Upstream>,
    /// Commits not pushed to the upstream
    pub ahead: usize,
    /// Upstream commits not merged locally
    pub behind: usize,
    /// Changes in the leaf's subtree, nested modules excluded
    pub dirty: DirtyCounts,
    /// Local tags in the leaf's namespace that the remote lacks
    pub missing_remote_tags: Vec<String>,
    /// Release recommendation
    pub verdict: Verdict,
    /// Human-readable explanation of the verdict
    pub verdict_reason: String,
    /// Set when the baseline or a tag at HEAD has not been pushed
    pub unpushed_tag_warning: Option<String>,
    /// Tag the API was compared against
    pub baseline_tag: Option<String>,
    /// API diff behind a `Breaking` or `MaybeNotBreaking` verdict
    pub api_report: Option<ApiDiffReport>,
    /// Allow-listed requirements that were not found on disk
    pub unresolved_allowed: Vec<String>,
    /// Non-fatal problems met during the run
    pub warnings: Vec<String>,
}

impl EngineResult {
    /// Whether the leaf's subtree has uncommitted changes
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// Whether the API diff found breaking changes
    pub fn is_breaking(&self) -> bool {
        self.verdict == Verdict::Breaking
    }
}
