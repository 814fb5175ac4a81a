//! Loading a module tree as a set of Go packages

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use tree_sitter::{Node, Parser};
use walkdir::DirEntry;

use keel_core::error::ApiDiffError;
use keel_graph::discovery::{walk, WalkAction, DESCRIPTOR_FILE};

use crate::surface::PackageApi;

/// Options for [`load_package_set`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Load packages under an `internal` path segment
    pub include_internal: bool,
}

/// Every package of one module tree
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    /// Tree root
    pub root: PathBuf,
    /// Module path the import paths are built from
    pub module_path: String,
    /// Successfully loaded packages by import path
    pub packages: BTreeMap<String, PackageApi>,
    /// Packages that could not be loaded, with the reason
    pub failed: BTreeMap<String, String>,
    /// Non-fatal problems (skipped files, unreadable entries)
    pub warnings: Vec<String>,
}

impl PackageSet {
    /// Import paths seen in the tree, loaded or not
    pub fn import_paths(&self) -> BTreeSet<&str> {
        self.packages
            .keys()
            .chain(self.failed.keys())
            .map(String::as_str)
            .collect()
    }
}

/// Whether an import path has an `internal` segment
pub fn is_internal(import_path: &str) -> bool {
    import_path.split('/').any(|segment| segment == "internal")
}

/// Load every package under `root`.
///
/// Nested modules, `testdata`, `vendor` and names starting with `.` or `_`
/// are skipped, as are `_test.go` files. A syntax error fails only the
/// package that contains it.
#[instrument(skip(options), fields(root = %root.display()))]
pub fn load_package_set(
    root: &Path,
    module_path: &str,
    options: &LoadOptions,
) -> Result<PackageSet, ApiDiffError> {
    if !root.is_dir() {
        return Err(ApiDiffError::TreeNotFound(root.to_path_buf()));
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| ApiDiffError::Language(e.to_string()))?;

    let mut set = PackageSet {
        root: root.to_path_buf(),
        module_path: module_path.to_string(),
        ..Default::default()
    };

    let mut sources: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let errors = walk(root, classify, |entry| {
        if entry.file_type().is_file() {
            if let Some(dir) = entry.path().parent() {
                sources
                    .entry(dir.to_path_buf())
                    .or_default()
                    .push(entry.path().to_path_buf());
            }
        }
    });
    set.warnings.extend(errors.iter().map(|e| e.to_string()));

    for (dir, files) in sources {
        let import_path = import_path(module_path, root, &dir);
        if !options.include_internal && is_internal(&import_path) {
            debug!(package = %import_path, "skipping internal package");
            continue;
        }

        match load_package(&mut parser, &import_path, &files, &mut set.warnings) {
            Ok(Some(api)) => {
                set.packages.insert(import_path, api);
            }
            Ok(None) => debug!(package = %import_path, "no usable files"),
            Err(message) => {
                warn!(package = %import_path, error = %message, "package failed to load");
                set.failed.insert(import_path, message);
            }
        }
    }

    info!(
        packages = set.packages.len(),
        failed = set.failed.len(),
        "loaded package set"
    );
    Ok(set)
}

fn classify(entry: &DirEntry) -> WalkAction {
    if entry.depth() == 0 {
        return WalkAction::Continue;
    }
    let name = entry.file_name().to_string_lossy();

    if entry.file_type().is_dir() {
        if name.starts_with('.')
            || name.starts_with('_')
            || name == "testdata"
            || name == "vendor"
            || entry.path().join(DESCRIPTOR_FILE).exists()
        {
            return WalkAction::SkipSubtree;
        }
        return WalkAction::Continue;
    }

    let is_source = name.ends_with(".go")
        && !name.ends_with("_test.go")
        && !name.starts_with('.')
        && !name.starts_with('_');
    if entry.file_type().is_file() && is_source {
        WalkAction::Continue
    } else {
        WalkAction::SkipEntry
    }
}

fn import_path(module_path: &str, root: &Path, dir: &Path) -> String {
    let rel: Vec<String> = dir
        .strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    if rel.is_empty() {
        module_path.to_string()
    } else {
        format!("{}/{}", module_path, rel.join("/"))
    }
}

fn load_package(
    parser: &mut Parser,
    import_path: &str,
    files: &[PathBuf],
    warnings: &mut Vec<String>,
) -> Result<Option<PackageApi>, String> {
    let mut api: Option<PackageApi> = None;

    for path in files {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;

        if excluded_by_build_constraint(&source) {
            warnings.push(format!("{}: excluded by build constraint", path.display()));
            continue;
        }

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| format!("{}: parser produced no tree", path.display()))?;
        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root).map(|n| n.start_position().row + 1).unwrap_or(1);
            return Err(format!("{}:{}: syntax error", path.display(), line));
        }

        let Some(name) = package_name(root, source.as_bytes()) else {
            warnings.push(format!("{}: missing package clause", path.display()));
            continue;
        };
        let api = api.get_or_insert_with(|| PackageApi::new(import_path, name.clone()));
        if api.name != name {
            warnings.push(format!(
                "{}: package {} does not match package {}",
                path.display(),
                name,
                api.name
            ));
            continue;
        }

        api.extract_file(root, source.as_bytes());
    }

    Ok(api)
}

/// `//go:build ignore` (or the legacy `// +build ignore`) before the
/// package clause
fn excluded_by_build_constraint(source: &str) -> bool {
    for line in source.lines() {
        let line = line.trim();
        if line.starts_with("package ") {
            break;
        }
        let expr = line
            .strip_prefix("//go:build")
            .or_else(|| line.strip_prefix("// +build"));
        if expr.is_some_and(|e| e.trim() == "ignore") {
            return true;
        }
    }
    false
}

fn package_name(root: Node, src: &[u8]) -> Option<String> {
    let mut cursor = root.walk();
    let clause = root
        .named_children(&mut cursor)
        .find(|n| n.kind() == "package_clause")?;
    let mut cursor = clause.walk();
    let ident = clause
        .named_children(&mut cursor)
        .find(|n| n.kind() == "package_identifier")?;
    ident.utf8_text(src).ok().map(|s| s.to_string())
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(first_error)
}
