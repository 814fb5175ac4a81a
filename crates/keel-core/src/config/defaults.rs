//! Default configuration values

use std::path::PathBuf;

/// Default configuration file name
pub const DEFAULT_CONFIG_TOML: &str = "keel.toml";

/// Alternative (hidden) configuration file name
pub const ALT_CONFIG_TOML: &str = ".keel.toml";

/// Default timeout for a single git subprocess, in seconds
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 60;

/// Default remote consulted for upstream and tag status
pub const DEFAULT_REMOTE: &str = "origin";

/// Name of the tool's own state directory, skipped during discovery
pub const STATE_DIR_NAME: &str = ".keel";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![DEFAULT_CONFIG_TOML, ALT_CONFIG_TOML]
}

/// Default location for cached repository mirrors
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("keel")
        .join("worktrees")
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Keel configuration

[scan]
roots = ["."]
# Module paths worth tracking even when they are not checked out locally
allow = []

[git]
remote = "origin"
timeout_secs = 60

[tags]
# Tag each module with its directory as prefix, e.g. "api/v1.2.0"
independent = true

[apidiff]
include_internal = false
"#;
