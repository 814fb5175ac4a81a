//! Graph command

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use keel_core::config::load_config_or_default;
use keel_core::error::KeelError;
use keel_engine::EngineOptions;
use keel_graph::{discover, DependencyGraph, GraphBuilder, Module};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Show the module dependency order
#[derive(Debug, Args)]
pub struct GraphCommand {
    /// Walk every discovered repository, not only the current one
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
struct RepositoryOrder<'a> {
    root: &'a std::path::Path,
    modules: Vec<ModuleEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ModuleEntry<'a> {
    identity: &'a str,
    directory: &'a std::path::Path,
}

impl GraphCommand {
    /// Execute the graph command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(all = self.all, "executing graph command");
        let cwd = std::env::current_dir()?;
        let (config, _) = load_config_or_default(&cwd);

        let options = EngineOptions::from_config(&config).map_err(KeelError::from)?;
        let report = discover(&options.resolved_roots(&cwd), &*options.managed);
        let mut builder = GraphBuilder::<Module>::new();
        builder.add_descriptors(report.descriptors);
        let graph = builder.build();

        let traversal = if self.all {
            graph.traverse_all()
        } else {
            graph.traverse_from(&cwd)
        }
        .map_err(KeelError::from)?;

        let order = ordered(&graph, &traversal.by_repository);
        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&order)?),
            OutputFormat::Text if cli.quiet => {}
            OutputFormat::Text => {
                for repo in &order {
                    println!("{}", output::header(&repo.root.display().to_string()));
                    for (i, module) in repo.modules.iter().enumerate() {
                        println!(
                            "  {:>3}. {} {}",
                            i + 1,
                            style(module.identity).bold(),
                            output::path_style().apply_to(module.directory.display())
                        );
                    }
                }
                for err in report.errors.iter().map(ToString::to_string).chain(
                    graph.errors().iter().map(ToString::to_string),
                ) {
                    output::warning(&err);
                }
                for warning in &traversal.warnings {
                    output::warning(warning);
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}

fn ordered<'a>(
    graph: &'a DependencyGraph<Module>,
    by_repository: &'a std::collections::BTreeMap<std::path::PathBuf, Vec<std::path::PathBuf>>,
) -> Vec<RepositoryOrder<'a>> {
    by_repository
        .iter()
        .map(|(root, dirs)| RepositoryOrder {
            root,
            modules: dirs
                .iter()
                .filter_map(|dir| graph.module_by_dir(dir))
                .map(|m| ModuleEntry {
                    identity: &m.identity,
                    directory: &m.directory,
                })
                .collect(),
        })
        .collect()
}
