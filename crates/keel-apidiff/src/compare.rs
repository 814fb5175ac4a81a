//! Comparing two package sets

use std::path::Path;

use tracing::{info, instrument};

use keel_core::config::Config;
use keel_core::error::ApiDiffError;

use crate::corrections;
use crate::diff::{diff_packages, RawChange};
use crate::loader::{is_internal, load_package_set, LoadOptions, PackageSet};
use crate::report::ApiDiffReport;
use crate::surface::PackageApi;

/// Options for a comparison
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Compare `internal` packages too, reporting their changes as
    /// informational
    pub include_internal: bool,
}

impl DiffOptions {
    /// Options from the `[apidiff]` section
    pub fn from_config(config: &Config) -> Self {
        Self {
            include_internal: config.apidiff.include_internal,
        }
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            include_internal: self.include_internal,
        }
    }
}

/// Load two trees of the same module and compare them
#[instrument(skip(options), fields(old = %old_root.display(), new = %new_root.display()))]
pub fn compare_trees(
    old_root: &Path,
    new_root: &Path,
    module_path: &str,
    options: &DiffOptions,
) -> Result<ApiDiffReport, ApiDiffError> {
    let old = load_package_set(old_root, module_path, &options.load_options())?;
    let new = load_package_set(new_root, module_path, &options.load_options())?;
    Ok(diff_package_sets(&old, &new, options))
}

/// Compare two loaded package sets
pub fn diff_package_sets(old: &PackageSet, new: &PackageSet, options: &DiffOptions) -> ApiDiffReport {
    let mut report = ApiDiffReport::default();
    report
        .warnings
        .extend(old.warnings.iter().map(|w| format!("old: {}", w)));
    report
        .warnings
        .extend(new.warnings.iter().map(|w| format!("new: {}", w)));

    let paths: std::collections::BTreeSet<&str> =
        old.import_paths().into_iter().chain(new.import_paths()).collect();

    for path in paths {
        let internal = is_internal(path);
        if internal && !options.include_internal {
            continue;
        }

        let mut failed = false;
        for (side, set) in [("old", old), ("new", new)] {
            if let Some(err) = set.failed.get(path) {
                report.errors.push(format!("{} ({}): {}", path, side, err));
                failed = true;
            }
        }
        if failed {
            continue;
        }

        let changes: Vec<(String, bool)> = match (old.packages.get(path), new.packages.get(path)) {
            (Some(_), None) => vec![("package removed".to_string(), false)],
            (None, Some(_)) => vec![("package added".to_string(), true)],
            (Some(before), Some(after)) => {
                let raw = diff_packages(before, after);
                corrections::apply(raw, before, after)
                    .into_iter()
                    .map(|change| (classify(&change, before, after), change.compatible))
                    .collect()
            }
            (None, None) => Vec::new(),
        };

        let bucket = report.package_mut(path);
        for (text, compatible) in changes {
            if internal {
                bucket.informational.push(text);
            } else if compatible {
                bucket.non_breaking.push(text);
            } else {
                bucket.breaking.push(text);
            }
        }
    }

    report.finish();
    info!(
        packages = report.packages.len(),
        breaking = report.breaking_count(),
        errors = report.errors.len(),
        "API diff complete"
    );
    report
}

/// Prefix the message with the object's kind, taken from whichever tree
/// still has it
fn classify(change: &RawChange, old: &PackageApi, new: &PackageApi) -> String {
    match new
        .kind_of(&change.object)
        .or_else(|| old.kind_of(&change.object))
    {
        Some(kind) => format!("{} {}", kind.prefix(), change.message),
        None => change.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "go.mod", "module example.com/m\n");
        for (rel, content) in files {
            write(temp.path(), rel, content);
        }
        temp
    }

    fn compare(old: &TempDir, new: &TempDir, options: DiffOptions) -> ApiDiffReport {
        compare_trees(old.path(), new.path(), "example.com/m", &options).unwrap()
    }

    const LIB: &str = r#"package m

// Client talks to the service
type Client struct {
	Addr    string `json:"addr"`
	Timeout int
}

type Handler interface {
	Handle(req string) error
}

func New(addr string) *Client { return &Client{Addr: addr} }

func (c *Client) Do(h Handler) error { return nil }
"#;

    #[test]
    fn test_identical_trees_produce_empty_report() {
        let old = tree(&[("m.go", LIB), ("sub/s.go", "package sub\n\nvar X = 1\n")]);
        let new = tree(&[("m.go", LIB), ("sub/s.go", "package sub\n\nvar X = 1\n")]);

        let report = compare(&old, &new, DiffOptions::default());
        assert!(report.is_empty());
        assert!(!report.has_breaking_changes());
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_comment_and_tag_edits_are_not_breaking() {
        let old = tree(&[("m.go", LIB)]);
        let edited = LIB
            .replace("// Client talks to the service", "// Client is a service client")
            .replace("`json:\"addr\"`", "`json:\"address\"`");
        let new = tree(&[("m.go", &edited)]);

        let report = compare(&old, &new, DiffOptions::default());
        assert!(report.is_empty(), "unexpected: {:?}", report.packages);
    }

    #[test]
    fn test_classified_breaking_and_non_breaking() {
        let old = tree(&[("m.go", LIB)]);
        let edited = LIB
            .replace(
                "func New(addr string) *Client",
                "func New(addr string, retries int) *Client",
            )
            .replace(
                "\tHandle(req string) error\n",
                "\tHandle(req string) error\n\tClose() error\n",
            )
            + "\nfunc Version() string { return \"\" }\n";
        let new = tree(&[("m.go", &edited)]);

        let report = compare(&old, &new, DiffOptions::default());
        let pkg = &report.packages["example.com/m"];
        assert_eq!(
            pkg.breaking,
            vec![
                "func New: changed from func(string) *Client to func(string, int) *Client"
                    .to_string(),
                "method Handler.Close: added".to_string(),
            ]
        );
        assert_eq!(pkg.non_breaking, vec!["func Version: added".to_string()]);
        assert!(report.has_breaking_changes());
    }

    #[test]
    fn test_package_added_and_removed() {
        let old = tree(&[("m.go", "package m\n"), ("gone/g.go", "package gone\n")]);
        let new = tree(&[("m.go", "package m\n"), ("fresh/f.go", "package fresh\n")]);

        let report = compare(&old, &new, DiffOptions::default());
        assert_eq!(
            report.packages["example.com/m/gone"].breaking,
            vec!["package removed".to_string()]
        );
        assert_eq!(
            report.packages["example.com/m/fresh"].non_breaking,
            vec!["package added".to_string()]
        );
    }

    #[test]
    fn test_internal_packages() {
        let old = tree(&[("internal/x/x.go", "package x\n\nfunc F() {}\n")]);
        let new = tree(&[("internal/x/x.go", "package x\n")]);

        let excluded = compare(&old, &new, DiffOptions::default());
        assert!(excluded.is_empty());

        let included = compare(
            &old,
            &new,
            DiffOptions {
                include_internal: true,
            },
        );
        let pkg = &included.packages["example.com/m/internal/x"];
        assert_eq!(pkg.informational, vec!["func F: removed".to_string()]);
        assert!(!included.has_breaking_changes());
    }

    #[test]
    fn test_failed_package_is_reported_not_diffed() {
        let old = tree(&[("a/a.go", "package a\n\nfunc A() {}\n"), ("b/b.go", "package b\n\nfunc B() {}\n")]);
        let new = tree(&[("a/a.go", "package a\n\nfunc A( {\n"), ("b/b.go", "package b\n")]);

        let report = compare(&old, &new, DiffOptions::default());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("example.com/m/a (new):"));
        assert!(!report.packages.contains_key("example.com/m/a"));
        assert_eq!(
            report.packages["example.com/m/b"].breaking,
            vec!["func B: removed".to_string()]
        );
    }
}
