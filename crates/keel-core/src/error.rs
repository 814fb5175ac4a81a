//! Error types for Keel

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using KeelError
pub type Result<T> = std::result::Result<T, KeelError>;

/// Main error type for Keel operations
#[derive(Debug, Error)]
pub enum KeelError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Git-related errors
    #[error(transparent)]
    Git(#[from] GitError),

    /// Module discovery errors
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Dependency graph errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Cached worktree errors
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// API diff errors
    #[error(transparent)]
    ApiDiff(#[from] ApiDiffError),

    /// Engine pipeline errors
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Invalid glob in the module allow-list
    #[error("Invalid module pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Git-related errors
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository not found
    #[error("Git repository not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// Not a git repository
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    /// Failed to open repository
    #[error("Failed to open repository: {0}")]
    OpenFailed(String),

    /// No commits found
    #[error("No commits found in repository")]
    NoCommits,

    /// Remote not found
    #[error("Remote not found: {0}")]
    RemoteNotFound(String),

    /// The git binary could not be started
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A git subprocess exited unsuccessfully
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// A git subprocess exceeded its time budget and was killed
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),
}

/// Errors raised while scanning for module descriptors.
///
/// Discovery never aborts on these: they are collected and reported once
/// the walk completes.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A directory entry could not be read
    #[error("Failed to read {path}: {message}")]
    Walk { path: PathBuf, message: String },

    /// A descriptor file exists but is not a usable go.mod
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A scan root does not exist
    #[error("Scan root does not exist: {0}")]
    MissingRoot(PathBuf),
}

/// Dependency graph errors
#[derive(Debug, Error)]
pub enum GraphError {
    /// No version-control root above a module directory
    #[error("No git repository contains module at {0}")]
    NoRepository(PathBuf),

    /// The same module path is declared in more than one directory
    #[error("Module {path} is declared in several directories: {}", display_paths(.dirs))]
    AmbiguousModule { path: String, dirs: Vec<PathBuf> },

    /// A dependency cycle among local modules
    #[error("Dependency cycle among modules: {}", .modules.join(", "))]
    Cycle { modules: Vec<String> },

    /// The starting directory does not belong to any discovered repository
    #[error("No discovered module lives in the repository containing {0}")]
    StartNotInGraph(PathBuf),

    /// A module directory was not found in the graph
    #[error("Unknown module directory: {0}")]
    UnknownModule(PathBuf),

    /// The graph was built but no module is ready to work on
    #[error("No suitable leaf module: every module is either released or blocked by an in-flux dependency")]
    NoSuitableLeaf,

    /// Git failure while inspecting a module
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Cached worktree errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Source repository path is unusable
    #[error("Source repository not found at {0}")]
    SourceNotFound(PathBuf),

    /// The cache root and the source live on different filesystems
    #[error("Cache root {cache_root} is not on the same filesystem as {source_repo}; hard-linked clones need both on one device")]
    CrossDevice {
        cache_root: PathBuf,
        source_repo: PathBuf,
    },

    /// Another process holds the mirror lock
    #[error("Another run is in progress for this repository (lock held at {0})")]
    Locked(PathBuf),

    /// The mirror escaped the cache root
    #[error("Mirror {mirror} is not located under cache root {cache_root}")]
    NotContained { mirror: PathBuf, cache_root: PathBuf },

    /// The mirror directory exists but holds no git metadata
    #[error("Mirror {0} does not contain a git repository")]
    NotARepository(PathBuf),

    /// The handle was already closed
    #[error("Cached worktree for {0} is closed")]
    Closed(PathBuf),

    /// A git step failed
    #[error("Cached worktree {step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: GitError,
    },

    /// Filesystem error on a cache path
    #[error("Cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// API diff errors
#[derive(Debug, Error)]
pub enum ApiDiffError {
    /// A tree to compare does not exist
    #[error("Source tree not found at {0}")]
    TreeNotFound(PathBuf),

    /// The Go grammar could not be loaded
    #[error("Failed to load Go grammar: {0}")]
    Language(String),

    /// IO error while loading sources
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Engine pipeline errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Nothing to scan
    #[error("No scan roots configured")]
    NoScanRoots,

    /// The caller cancelled the run between stages
    #[error("Run cancelled during {0}")]
    Cancelled(&'static str),

    /// Writing the verdict report failed
    #[error("Failed to write report: {0}")]
    Report(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl KeelError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}
