//! Keel Graph - module discovery and dependency ordering
//!
//! Finds go.mod descriptors under a set of roots, indexes the modules by
//! repository and identity, walks them dependencies-first and picks the
//! next module ready to work on.

pub mod discovery;
pub mod gomod;
pub mod graph;
pub mod influx;
pub mod leaf;

pub use discovery::{discover, Descriptor, DiscoveryReport, WalkAction};
pub use gomod::{is_pseudo_version, GoMod};
pub use graph::{
    DependencyGraph, GraphBuilder, LocalDependencies, Module, ModuleNode, Repository, Traversal,
};
pub use influx::{InFlux, InFluxAnalyzer, InFluxCheck, InFluxReason};
pub use leaf::{select_leaf, LeafSelection};
