//! Verdict composition

use keel_apidiff::ApiDiffReport;
use keel_core::Verdict;
use keel_graph::Module;

/// A direct requirement is pinned to a pseudo-version
pub const IN_FLUX_DEPENDENCIES: &str = "module has in-flux dependencies";
/// The descriptor carries replace directives
pub const REPLACE_DIRECTIVES: &str = "module has replace directives";
/// The module's repository could not be opened
pub const NO_REPOSITORY: &str = "no git repository";
/// The repository has no commit yet
pub const NO_HEAD: &str = "no HEAD commit";
/// No semver tag in the module's namespace is reachable from HEAD
pub const NO_BASELINE_TAG: &str = "no baseline tag";

/// Verdict with its reason and, when a diff ran, the report behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub reason: String,
    pub api_report: Option<ApiDiffReport>,
}

impl Outcome {
    /// The module cannot be judged yet
    pub fn withheld(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Withheld,
            reason: reason.into(),
            api_report: None,
        }
    }

    /// Judge an API diff against `baseline`.
    ///
    /// Packages that could not be compared are mentioned in the reason but
    /// do not turn the verdict into `Breaking`.
    pub fn from_report(report: ApiDiffReport, baseline: &str) -> Self {
        let breaking = report.breaking_count();
        let (verdict, mut reason) = if breaking > 0 {
            (
                Verdict::Breaking,
                format!("{} breaking change(s) since {}", breaking, baseline),
            )
        } else {
            (
                Verdict::MaybeNotBreaking,
                format!("no breaking changes since {}", baseline),
            )
        };
        if !report.errors.is_empty() {
            reason.push_str(&format!(
                "; {} package(s) could not be compared",
                report.errors.len()
            ));
        }

        Self {
            verdict,
            reason,
            api_report: Some(report),
        }
    }
}

/// Withholding reason that follows from the descriptor alone
pub fn descriptor_withheld_reason(module: &Module) -> Option<&'static str> {
    if module.direct_requirements().any(|d| d.is_pseudo_version()) {
        Some(IN_FLUX_DEPENDENCIES)
    } else if module.has_replaces() {
        Some(REPLACE_DIRECTIVES)
    } else {
        None
    }
}

/// Tag prefix for a module at `relative_dir` inside its repository.
///
/// Root modules, and every module when tags are shared, use bare `vX.Y.Z`.
pub fn tag_prefix(relative_dir: &str, independent: bool) -> String {
    if !independent || relative_dir.is_empty() {
        String::new()
    } else {
        format!("{}/", relative_dir.trim_end_matches('/'))
    }
}

/// First of the baseline tag and the tags at HEAD that the remote lacks
pub fn unpushed_tag<'a>(
    baseline: Option<&'a str>,
    at_head: &'a [String],
    missing: &[String],
) -> Option<&'a str> {
    let mut tags: Vec<&str> = baseline
        .into_iter()
        .chain(at_head.iter().map(String::as_str))
        .collect();
    tags.sort_unstable();
    tags.dedup();
    tags.into_iter().find(|tag| missing.iter().any(|m| m == tag))
}
