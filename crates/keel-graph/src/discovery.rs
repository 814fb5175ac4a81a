//! Module descriptor discovery

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use keel_core::error::DiscoveryError;

use crate::gomod::GoMod;

/// Name of the module descriptor file
pub const DESCRIPTOR_FILE: &str = "go.mod";

/// Directory names never descended into
pub const IGNORED_DIRS: &[&str] = &[
    // version control
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "_darcs",
    ".jj",
    // dependency caches
    "vendor",
    "node_modules",
    ".cache",
    "pkg",
    // build output
    "target",
    "dist",
    "build",
    "bin",
    "out",
    // editor metadata
    ".idea",
    ".vscode",
    ".vs",
    // own state
    keel_core::config::STATE_DIR_NAME,
    "testdata",
];

/// What the walk should do with the entry just visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Process the entry and descend into it
    Continue,
    /// Skip the entry and everything below it
    SkipSubtree,
    /// Skip this entry only
    SkipEntry,
    /// Stop the whole walk
    Abort,
}

/// A descriptor that parsed well enough to identify its module
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Canonical path of the go.mod file
    pub path: PathBuf,
    /// Parsed content
    pub gomod: GoMod,
}

/// Result of scanning a set of roots
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Usable descriptors in walk order
    pub descriptors: Vec<Descriptor>,
    /// Non-fatal problems met along the way
    pub errors: Vec<DiscoveryError>,
}

impl DiscoveryReport {
    /// Descriptor paths in walk order
    pub fn paths(&self) -> Vec<&Path> {
        self.descriptors.iter().map(|d| d.path.as_path()).collect()
    }
}

/// Whether a directory name is on the deny-list
pub fn is_ignored_dir(name: &str) -> bool {
    IGNORED_DIRS.contains(&name)
}

/// Walk `root` in file-name order, letting `visit` steer the traversal.
///
/// Entries the visitor returns [`WalkAction::Continue`] for are passed to
/// `accept`. Entry-level I/O failures are logged and returned; they never
/// end the walk.
pub fn walk<V, A>(root: &Path, mut visit: V, mut accept: A) -> Vec<DiscoveryError>
where
    V: FnMut(&DirEntry) -> WalkAction,
    A: FnMut(&DirEntry),
{
    let mut errors = Vec::new();
    let mut entries = WalkDir::new(root).sort_by_file_name().into_iter();

    loop {
        let entry = match entries.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                errors.push(DiscoveryError::Walk {
                    path,
                    message: err.to_string(),
                });
                continue;
            }
        };

        match visit(&entry) {
            WalkAction::Continue => accept(&entry),
            WalkAction::SkipSubtree => {
                if entry.file_type().is_dir() {
                    entries.skip_current_dir();
                }
            }
            WalkAction::SkipEntry => {}
            WalkAction::Abort => break,
        }
    }

    errors
}

/// Find every go.mod under `roots`.
///
/// `managed` is asked about each repository root met during the walk; a
/// `true` answer skips that repository entirely. Descriptors reachable from
/// several overlapping roots are reported once.
#[instrument(skip(managed), fields(roots = roots.len()))]
pub fn discover(roots: &[PathBuf], managed: &dyn Fn(&Path) -> bool) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        if !root.exists() {
            warn!(root = %root.display(), "scan root does not exist");
            report.errors.push(DiscoveryError::MissingRoot(root.clone()));
            continue;
        }

        let mut found = Vec::new();
        let errors = walk(
            root,
            |entry| classify(entry, managed),
            |entry| {
                if entry.file_type().is_file() && entry.file_name() == DESCRIPTOR_FILE {
                    found.push(entry.path().to_path_buf());
                }
            },
        );
        report.errors.extend(errors);

        for path in found {
            let canonical = path.canonicalize().unwrap_or(path);
            if !seen.insert(canonical.clone()) {
                debug!(path = %canonical.display(), "descriptor already discovered");
                continue;
            }
            match GoMod::load(&canonical) {
                Ok(gomod) => report.descriptors.push(Descriptor {
                    path: canonical,
                    gomod,
                }),
                Err(err) => {
                    warn!(error = %err, "skipping unparseable descriptor");
                    report.errors.push(err);
                }
            }
        }
    }

    info!(
        descriptors = report.descriptors.len(),
        errors = report.errors.len(),
        "module discovery complete"
    );
    report
}

fn classify(entry: &DirEntry, managed: &dyn Fn(&Path) -> bool) -> WalkAction {
    if !entry.file_type().is_dir() {
        return WalkAction::Continue;
    }

    // The root itself is scanned whatever its name
    if entry.depth() > 0 {
        if let Some(name) = entry.file_name().to_str() {
            if is_ignored_dir(name) {
                return WalkAction::SkipSubtree;
            }
        }
    }

    let path = entry.path();
    if path.join(".git").exists() && managed(path) {
        debug!(repo = %path.display(), "skipping managed repository");
        return WalkAction::SkipSubtree;
    }

    WalkAction::Continue
}
