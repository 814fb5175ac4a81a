//! Diff command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use keel_apidiff::{compare_trees, DiffOptions};
use keel_core::config::load_config_or_default;
use keel_core::error::{EngineError, KeelError};
use keel_graph::GoMod;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Compare the exported API of two trees of one module
#[derive(Debug, Args)]
pub struct DiffCommand {
    /// Tree holding the old version of the module
    pub old: PathBuf,

    /// Tree holding the new version of the module
    pub new: PathBuf,

    /// Module path (read from the new tree's go.mod when omitted)
    #[arg(long)]
    pub module: Option<String>,

    /// Compare internal packages too
    #[arg(long)]
    pub include_internal: bool,
}

impl DiffCommand {
    /// Execute the diff command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(
            old = %self.old.display(),
            new = %self.new.display(),
            "executing diff command"
        );
        let cwd = std::env::current_dir()?;
        let (config, _) = load_config_or_default(&cwd);

        let module = match &self.module {
            Some(module) => module.clone(),
            None => {
                GoMod::load(&self.new.join("go.mod"))
                    .map_err(KeelError::from)?
                    .module
            }
        };
        let mut options = DiffOptions::from_config(&config);
        options.include_internal |= self.include_internal;

        let report =
            compare_trees(&self.old, &self.new, &module, &options).map_err(KeelError::from)?;

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Text if cli.quiet => {}
            OutputFormat::Text => {
                if report.is_empty() && report.errors.is_empty() {
                    output::success(&format!("No API changes in {}", module));
                } else {
                    let mut stdout = std::io::stdout();
                    report
                        .write_package_changes(&mut stdout)
                        .map_err(|e| KeelError::from(EngineError::Report(e.to_string())))?;
                }
                if cli.verbose {
                    for warning in &report.warnings {
                        output::warning(warning);
                    }
                }
            }
        }

        Ok(if report.has_breaking_changes() {
            exit_codes::BREAKING
        } else {
            exit_codes::SUCCESS
        })
    }
}
