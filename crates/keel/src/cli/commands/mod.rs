//! CLI commands

mod diff;
mod graph;
mod init;
mod next;

pub use diff::DiffCommand;
pub use graph::GraphCommand;
pub use init::InitCommand;
pub use next::NextCommand;
