//! Keel Core - shared foundations for release readiness analysis
//!
//! This crate provides the error taxonomy, configuration loading and the
//! small set of types shared by the graph, git, API diff and engine crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{load_config_or_default, Config, ModuleAllowList};
pub use error::{
    ApiDiffError, CacheError, ConfigError, DiscoveryError, EngineError, GitError, GraphError,
    KeelError, Result,
};
pub use types::{DirtyCounts, Verdict};
