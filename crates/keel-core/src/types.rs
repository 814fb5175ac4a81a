//! Core types for Keel

use serde::{Deserialize, Serialize};

/// Final recommendation for a module's next release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The module cannot be judged yet; the reason explains why
    Withheld,
    /// The exported API changed incompatibly since the baseline tag
    Breaking,
    /// No incompatible change was detected
    MaybeNotBreaking,
}

impl Verdict {
    /// Returns the string representation of the verdict
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Withheld => "withheld",
            Self::Breaking => "breaking",
            Self::MaybeNotBreaking => "maybe-not-breaking",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Working-tree change counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyCounts {
    /// Changes recorded in the index
    pub staged: usize,
    /// Tracked files modified in the working tree
    pub unstaged: usize,
    /// Files git does not track
    pub untracked: usize,
}

impl DirtyCounts {
    /// Whether any change is present
    pub fn is_dirty(&self) -> bool {
        self.total() > 0
    }

    /// Sum of all counters
    pub fn total(&self) -> usize {
        self.staged + self.unstaged + self.untracked
    }
}
