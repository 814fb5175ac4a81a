//! Engine options

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use keel_apidiff::DiffOptions;
use keel_core::config::{Config, ModuleAllowList, DEFAULT_GIT_TIMEOUT_SECS};
use keel_core::error::ConfigError;
use keel_git::CacheOptions;

/// Predicate deciding whether a repository root is managed elsewhere and
/// must not be scanned
pub type ManagedPredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Options for an engine run
#[derive(Clone)]
pub struct EngineOptions {
    /// Directories to scan; relative entries resolve against the start
    /// directory
    pub roots: Vec<PathBuf>,
    /// Module paths worth reporting when they are required but not on disk
    pub allow: ModuleAllowList,
    /// Mirror location and git step timeout
    pub cache: CacheOptions,
    /// Remote checked for unpushed tags
    pub remote: String,
    /// Timeout for remote queries
    pub git_timeout: Duration,
    /// Whether each module has its own tag namespace
    pub independent_tags: bool,
    /// API diff settings
    pub diff: DiffOptions,
    /// Repositories skipped by discovery
    pub managed: ManagedPredicate,
}

impl EngineOptions {
    /// Options scanning `roots` with every other setting at its default
    pub fn new(roots: Vec<PathBuf>) -> Self {
        let config = Config::default();
        Self {
            roots,
            allow: ModuleAllowList::empty(),
            cache: CacheOptions::from_config(&config),
            remote: config.git.remote,
            git_timeout: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS),
            independent_tags: config.tags.independent,
            diff: DiffOptions::default(),
            managed: Arc::new(|_: &Path| false),
        }
    }

    /// Options from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            roots: config.scan.roots.clone(),
            allow: ModuleAllowList::new(&config.scan.allow)?,
            cache: CacheOptions::from_config(config),
            remote: config.git.remote.clone(),
            git_timeout: config.git.timeout(),
            independent_tags: config.tags.independent,
            diff: DiffOptions::from_config(config),
            managed: Arc::new(|_: &Path| false),
        })
    }

    /// Set the cache root
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache.cache_root = root.into();
        self
    }

    /// Set the module allow-list
    pub fn with_allow(mut self, allow: ModuleAllowList) -> Self {
        self.allow = allow;
        self
    }

    /// Set the remote checked for unpushed tags
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Use one shared tag namespace for every module of a repository
    pub fn with_shared_tags(mut self) -> Self {
        self.independent_tags = false;
        self
    }

    /// Skip repositories for which `managed` returns true
    pub fn with_managed(mut self, managed: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.managed = Arc::new(managed);
        self
    }

    /// Scan roots made absolute against `start_dir`
    pub fn resolved_roots(&self, start_dir: &Path) -> Vec<PathBuf> {
        self.roots
            .iter()
            .map(|root| {
                if root.is_absolute() {
                    root.clone()
                } else {
                    start_dir.join(root)
                }
            })
            .collect()
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("roots", &self.roots)
            .field("allow", &self.allow.patterns())
            .field("cache", &self.cache)
            .field("remote", &self.remote)
            .field("git_timeout", &self.git_timeout)
            .field("independent_tags", &self.independent_tags)
            .field("diff", &self.diff)
            .finish_non_exhaustive()
    }
}
