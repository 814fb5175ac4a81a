//! Keel Engine - picks the next Go module to release and judges it
//!
//! The engine chains module discovery, the dependency graph, leaf
//! selection, repository status and an API diff against the module's last
//! reachable tag into one [`EngineResult`].

pub mod engine;
pub mod options;
pub mod progress;
pub mod result;
pub mod verdict;

pub use engine::Engine;
pub use options::{EngineOptions, ManagedPredicate};
pub use progress::{Cancellation, Progress};
pub use result::{EngineResult, ModuleSummary};
pub use verdict::Outcome;
