//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::defaults::{default_cache_dir, DEFAULT_GIT_TIMEOUT_SECS, DEFAULT_REMOTE};

/// Main configuration for Keel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where to look for modules
    pub scan: ScanConfig,

    /// Cached mirror configuration
    pub cache: CacheConfig,

    /// Git configuration
    pub git: GitConfig,

    /// Tagging conventions
    pub tags: TagsConfig,

    /// API diff configuration
    pub apidiff: ApiDiffConfig,
}

/// Module scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories to scan for go.mod files
    pub roots: Vec<PathBuf>,

    /// Glob patterns of module paths worth tracking
    pub allow: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            allow: Vec::new(),
        }
    }
}

/// Cached mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory holding repository mirrors and their locks
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

/// Git configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Remote name
    pub remote: String,

    /// Per-invocation timeout for git subprocesses
    pub timeout_secs: u64,
}

impl GitConfig {
    /// Timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
        }
    }
}

/// Tagging conventions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    /// Whether each module is tagged under its own directory prefix
    pub independent: bool,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self { independent: true }
    }
}

/// API diff configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiDiffConfig {
    /// Whether packages under an `internal/` path are compared
    pub include_internal: bool,
}

/// Compiled allow-list of module path patterns
#[derive(Debug, Clone)]
pub struct ModuleAllowList {
    patterns: Vec<String>,
    set: GlobSet,
}

impl ModuleAllowList {
    /// Compile a list of glob patterns
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| ConfigError::InvalidPattern {
            pattern: patterns.join(", "),
            message: e.to_string(),
        })?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    /// An allow-list that matches nothing
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Whether a module path matches any pattern
    pub fn matches(&self, module_path: &str) -> bool {
        self.set.is_match(module_path)
    }

    /// The source patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether no pattern is configured
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ModuleAllowList {
    fn default() -> Self {
        Self::empty()
    }
}
