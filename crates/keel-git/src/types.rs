//! Git types

use semver::Version;
use serde::{Deserialize, Serialize};

/// Information about a git tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Tag name
    pub name: String,
    /// Commit hash the tag points to
    pub commit_hash: String,
    /// Tag message (for annotated tags)
    pub message: Option<String>,
}

impl TagInfo {
    /// Create a new TagInfo
    pub fn new(name: impl Into<String>, commit_hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit_hash: commit_hash.into(),
            message: None,
        }
    }

    /// Set the tag message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Semantic version of this tag inside a module's tag namespace.
    ///
    /// `prefix` is the module directory relative to the repository root
    /// followed by `/`, or empty for a root module. The remainder must be a
    /// `v`-prefixed semantic version, as Go module tags are.
    pub fn module_version(&self, prefix: &str) -> Option<Version> {
        module_tag_version(&self.name, prefix)
    }
}

/// Parse `<prefix>vX.Y.Z[-pre][+build]` into a version
pub fn module_tag_version(tag: &str, prefix: &str) -> Option<Version> {
    let rest = tag.strip_prefix(prefix)?;
    let version = rest.strip_prefix('v')?;
    Version::parse(version).ok()
}

/// The remote-tracking branch a local branch follows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    /// Remote name, e.g. `origin`
    pub remote: String,
    /// Branch name on the remote, e.g. `main`
    pub branch: String,
}

/// Position of the current branch relative to its upstream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamStatus {
    /// Current branch, `None` when HEAD is detached or unborn
    pub branch: Option<String>,
    /// Configured upstream, if any
    pub upstream: Option<Upstream>,
    /// Local commits not on the upstream
    pub ahead: usize,
    /// Upstream commits not in the local branch
    pub behind: usize,
}
