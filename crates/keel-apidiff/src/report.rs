//! API diff report

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Serialize;

/// Classified changes of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageChanges {
    /// Changes that break existing clients
    pub breaking: Vec<String>,
    /// Compatible additions and changes
    pub non_breaking: Vec<String>,
    /// Changes reported for context only
    pub informational: Vec<String>,
}

impl PackageChanges {
    /// Whether the package has no change at all
    pub fn is_empty(&self) -> bool {
        self.breaking.is_empty() && self.non_breaking.is_empty() && self.informational.is_empty()
    }

    fn sort(&mut self) {
        self.breaking.sort();
        self.non_breaking.sort();
        self.informational.sort();
    }
}

/// Result of comparing two module trees
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApiDiffReport {
    /// Changes by import path
    pub packages: BTreeMap<String, PackageChanges>,
    /// Packages that could not be compared
    pub errors: Vec<String>,
    /// Non-fatal load problems
    pub warnings: Vec<String>,
}

impl ApiDiffReport {
    /// Whether any package has a breaking change
    pub fn has_breaking_changes(&self) -> bool {
        self.packages.values().any(|p| !p.breaking.is_empty())
    }

    /// Whether no package changed
    pub fn is_empty(&self) -> bool {
        self.packages.values().all(PackageChanges::is_empty)
    }

    /// Total number of breaking changes
    pub fn breaking_count(&self) -> usize {
        self.packages.values().map(|p| p.breaking.len()).sum()
    }

    pub(crate) fn package_mut(&mut self, import_path: &str) -> &mut PackageChanges {
        self.packages.entry(import_path.to_string()).or_default()
    }

    /// Sort every bucket and drop packages without changes
    pub(crate) fn finish(&mut self) {
        self.packages.retain(|_, changes| !changes.is_empty());
        for changes in self.packages.values_mut() {
            changes.sort();
        }
        self.errors.sort();
    }

    /// Plain-text rendering, ordered by import path and then alphabetically
    /// within each bucket
    pub fn write_package_changes<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for (import_path, changes) in &self.packages {
            if changes.is_empty() {
                continue;
            }
            writeln!(out, "{}", import_path)?;
            write_bucket(out, "Breaking changes", &changes.breaking)?;
            write_bucket(out, "Non-breaking changes", &changes.non_breaking)?;
            write_bucket(out, "Informational", &changes.informational)?;
        }

        if !self.errors.is_empty() {
            let mut errors = self.errors.clone();
            errors.sort();
            writeln!(out, "Errors:")?;
            for error in errors {
                writeln!(out, "  - {}", error)?;
            }
        }
        Ok(())
    }
}

fn write_bucket<W: Write + ?Sized>(out: &mut W, title: &str, items: &[String]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let mut items: Vec<&String> = items.iter().collect();
    items.sort();

    writeln!(out, "  {}:", title)?;
    for item in items {
        writeln!(out, "    - {}", item)?;
    }
    Ok(())
}
