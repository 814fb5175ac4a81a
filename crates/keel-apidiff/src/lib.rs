//! Keel API diff - exported API comparison for Go module trees
//!
//! Two directory trees of the same module are loaded as package sets with
//! tree-sitter, their exported surfaces diffed member by member, and every
//! change sorted into breaking, non-breaking or informational buckets.

pub mod compare;
mod corrections;
pub mod diff;
pub mod loader;
pub mod report;
pub mod surface;

pub use compare::{compare_trees, diff_package_sets, DiffOptions};
pub use diff::RawChange;
pub use loader::{is_internal, load_package_set, LoadOptions, PackageSet};
pub use report::{ApiDiffReport, PackageChanges};
pub use surface::{ApiObject, ObjectKind, PackageApi};
