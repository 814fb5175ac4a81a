//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{DiffCommand, GraphCommand, InitCommand, NextCommand};

/// Keel - release readiness for multi-repo Go workspaces
#[derive(Debug, Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pick the next module to release and judge its API changes
    Next(NextCommand),

    /// Compare the exported API of two trees of one module
    Diff(DiffCommand),

    /// Show the module dependency order
    Graph(GraphCommand),

    /// Write a default keel.toml
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Next(ref cmd) => cmd.execute(&self),
            Commands::Diff(ref cmd) => cmd.execute(&self),
            Commands::Graph(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
        }
    }

    /// Whether human-readable chatter should be printed
    pub fn is_chatty(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}
