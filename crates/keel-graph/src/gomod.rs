//! go.mod file parsing
//!
//! The parse is deliberately lax: a descriptor only needs a `module`
//! directive to be usable. Unknown directives are ignored and malformed
//! requirement lines are skipped rather than rejected.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keel_core::error::DiscoveryError;

/// Go's pseudo-version shape: a commit timestamp and hash in place of a tag
static PSEUDO_VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v[0-9]+\.(0\.0-|[0-9]+\.[0-9]+-([^+]*\.)?0\.)[0-9]{14}-[A-Za-z0-9]+(\+[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$",
    )
    .expect("Invalid regex")
});

/// A go.mod that could not be used as a module descriptor
#[derive(Debug, Error)]
#[error("{0}")]
pub struct GoModParseError(String);

/// Parsed go.mod file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoMod {
    /// Module path
    pub module: String,
    /// Go version
    pub go_version: Option<String>,
    /// Direct dependencies
    pub require: Vec<Dependency>,
    /// Replacements
    pub replace: Vec<Replace>,
    /// Exclusions
    pub exclude: Vec<Dependency>,
    /// Retractions
    pub retract: Vec<String>,
}

/// A dependency in go.mod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Module path
    pub path: String,
    /// Version
    pub version: String,
    /// Whether this is an indirect dependency
    pub indirect: bool,
}

impl Dependency {
    /// Whether the pinned version is a pseudo-version (an unreleased commit)
    pub fn is_pseudo_version(&self) -> bool {
        is_pseudo_version(&self.version)
    }
}

/// A replace directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replace {
    /// Original module path
    pub old_path: String,
    /// Original version (optional)
    pub old_version: Option<String>,
    /// Replacement path
    pub new_path: String,
    /// Replacement version (optional)
    pub new_version: Option<String>,
}

impl Replace {
    /// Whether the replacement points at a directory on disk
    pub fn is_local(&self) -> bool {
        self.new_path.starts_with("./")
            || self.new_path.starts_with("../")
            || self.new_path.starts_with('/')
            || self.new_path == "."
            || self.new_path == ".."
    }
}

/// Whether `version` follows the pseudo-version convention
/// (`vX.Y.Z-yyyymmddhhmmss-abcdefabcdef` and its pre-release variants)
pub fn is_pseudo_version(version: &str) -> bool {
    version.matches('-').count() >= 2 && PSEUDO_VERSION_REGEX.is_match(version)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Block {
    Require,
    Replace,
    Exclude,
    Retract,
    Other,
}

impl GoMod {
    /// Load a go.mod file
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let content = std::fs::read_to_string(path).map_err(|e| DiscoveryError::Parse {
            path: path.to_path_buf(),
            message: format!("failed to read go.mod: {}", e),
        })?;

        Self::parse(&content).map_err(|e| DiscoveryError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse go.mod content
    pub fn parse(content: &str) -> Result<Self, GoModParseError> {
        let mut module = String::new();
        let mut go_version = None;
        let mut require = Vec::new();
        let mut replace = Vec::new();
        let mut exclude = Vec::new();
        let mut retract = Vec::new();

        let mut in_block: Option<Block> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            if let Some(block) = in_block {
                if line.starts_with(')') {
                    in_block = None;
                    continue;
                }
                match block {
                    Block::Require => require.extend(Self::parse_require_line(line)),
                    Block::Replace => replace.extend(Self::parse_replace_line(line)),
                    Block::Exclude => exclude.extend(Self::parse_require_line(line)),
                    Block::Retract => retract.push(strip_comment(line).to_string()),
                    Block::Other => {}
                }
                continue;
            }

            let code = strip_comment(line);
            if let Some(directive) = code.strip_suffix('(') {
                in_block = Some(match directive.trim() {
                    "require" => Block::Require,
                    "replace" => Block::Replace,
                    "exclude" => Block::Exclude,
                    "retract" => Block::Retract,
                    _ => Block::Other,
                });
                continue;
            }

            let (keyword, rest) = match code.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r.trim()),
                None => (code, ""),
            };
            match keyword {
                "module" => module = unquote(rest).to_string(),
                "go" => go_version = Some(rest.to_string()),
                "require" => require.extend(Self::parse_require_line(rest)),
                "replace" => replace.extend(Self::parse_replace_line(rest)),
                "exclude" => exclude.extend(Self::parse_require_line(rest)),
                "retract" => retract.push(rest.to_string()),
                _ => {}
            }
        }

        if module.is_empty() {
            return Err(GoModParseError(
                "no module directive found in go.mod".to_string(),
            ));
        }

        Ok(Self {
            module,
            go_version,
            require,
            replace,
            exclude,
            retract,
        })
    }

    /// Parse a require line: `path version [// indirect]`
    fn parse_require_line(line: &str) -> Option<Dependency> {
        let line = line.trim();
        let indirect = line
            .split_once("//")
            .is_some_and(|(_, comment)| comment.trim().starts_with("indirect"));
        let line = strip_comment(line);

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            Some(Dependency {
                path: unquote(parts[0]).to_string(),
                version: unquote(parts[1]).to_string(),
                indirect,
            })
        } else {
            None
        }
    }

    /// Parse a replace line: `old [version] => new [version]`
    fn parse_replace_line(line: &str) -> Option<Replace> {
        let line = strip_comment(line);
        let (old, new) = line.split_once("=>")?;

        let old_parts: Vec<&str> = old.split_whitespace().map(unquote).collect();
        let new_parts: Vec<&str> = new.split_whitespace().map(unquote).collect();

        if old_parts.is_empty() || new_parts.is_empty() {
            return None;
        }

        Some(Replace {
            old_path: old_parts[0].to_string(),
            old_version: old_parts.get(1).map(|s| s.to_string()),
            new_path: new_parts[0].to_string(),
            new_version: new_parts.get(1).map(|s| s.to_string()),
        })
    }

    /// Direct (non-indirect) requirements
    pub fn direct_requirements(&self) -> impl Iterator<Item = &Dependency> {
        self.require.iter().filter(|d| !d.indirect)
    }

    /// Get the major version from the module path (for v2+ modules)
    pub fn major_version(&self) -> Option<u64> {
        let last = self.module.rsplit('/').next()?;
        last.strip_prefix('v')?.parse().ok()
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('`').and_then(|s| s.strip_suffix('`')))
        .unwrap_or(s)
}
