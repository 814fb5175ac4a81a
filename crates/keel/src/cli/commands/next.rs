//! Next command

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::{info, warn};

use keel_core::config::load_config_or_default;
use keel_core::error::{EngineError, KeelError};
use keel_engine::{Cancellation, Engine, EngineOptions, EngineResult, Progress};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Pick the next module to release and judge its API changes
#[derive(Debug, Args)]
pub struct NextCommand {
    /// Directory for cached repository mirrors
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Compare internal packages too
    #[arg(long)]
    pub include_internal: bool,

    /// Remote checked for unpushed tags
    #[arg(long)]
    pub remote: Option<String>,
}

impl NextCommand {
    /// Execute the next command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(
            include_internal = self.include_internal,
            "executing next command"
        );
        let cwd = std::env::current_dir()?;
        let (config, config_path) = load_config_or_default(&cwd);

        let mut options = EngineOptions::from_config(&config).map_err(KeelError::from)?;
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_root(dir);
        }
        if let Some(remote) = &self.remote {
            options = options.with_remote(remote);
        }
        options.diff.include_internal |= self.include_internal;

        if cli.verbose && cli.is_chatty() {
            match &config_path {
                Some(path) => println!("{}", output::key_value("Config", path.display())),
                None => println!("{}", output::key_value("Config", "defaults")),
            }
        }

        let mut stderr = std::io::stderr();
        let mut progress = if cli.is_chatty() {
            Progress::new(&mut stderr)
        } else {
            Progress::silent()
        };

        let cancel = Cancellation::new();
        if let Err(e) = ctrlc::set_handler(on_interrupt(&cancel)) {
            warn!(error = %e, "could not install interrupt handler");
        }

        let result = Engine::new(options).run(&cwd, &mut progress, &cancel)?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Text if !cli.quiet => print_result(&result, cli.verbose)?,
            OutputFormat::Text => {}
        }

        Ok(if result.is_breaking() {
            exit_codes::BREAKING
        } else {
            exit_codes::SUCCESS
        })
    }
}

/// Handler that stops the run at the next stage boundary
fn on_interrupt(cancel: &Cancellation) -> impl Fn() + Send + 'static {
    let cancel = cancel.clone();
    move || {
        info!("interrupt received, cancelling");
        cancel.cancel();
    }
}

fn print_result(result: &EngineResult, verbose: bool) -> anyhow::Result<()> {
    println!();
    println!("{}", output::header("Next module"));
    println!("{}", output::key_value("Module", style(&result.module).bold()));
    println!(
        "{}",
        output::key_value("Directory", output::path_style().apply_to(result.leaf.display()))
    );
    if let Some(reason) = result.in_flux_reason {
        println!("{}", output::key_value("In flux", reason));
    }
    if verbose && result.candidates.len() > 1 {
        for candidate in &result.candidates {
            println!("{}", output::key_value("Candidate", candidate.display()));
        }
    }
    println!();

    println!("{}", output::header("Repository"));
    println!(
        "{}",
        output::key_value("Root", output::path_style().apply_to(result.repository.display()))
    );
    match (&result.branch, &result.upstream) {
        (Some(branch), Some(upstream)) => println!(
            "{}",
            output::key_value(
                "Branch",
                format!(
                    "{} -> {}/{} (ahead {}, behind {})",
                    branch, upstream.remote, upstream.branch, result.ahead, result.behind
                )
            )
        ),
        (Some(branch), None) => println!(
            "{}",
            output::key_value("Branch", format!("{} (no upstream)", branch))
        ),
        (None, _) => println!("{}", output::key_value("Branch", style("detached").dim())),
    }
    let dirty = if result.is_dirty() {
        style(format!(
            "{} staged, {} unstaged, {} untracked",
            result.dirty.staged, result.dirty.unstaged, result.dirty.untracked
        ))
        .yellow()
    } else {
        style("clean".to_string()).green()
    };
    println!("{}", output::key_value("Working tree", dirty));
    let modules: Vec<&str> = result.modules.iter().map(|m| m.identity.as_str()).collect();
    println!("{}", output::key_value("Modules", modules.join(", ")));
    if !result.missing_remote_tags.is_empty() {
        println!(
            "{}",
            output::key_value(
                "Not on remote",
                output::tag_style().apply_to(result.missing_remote_tags.join(", "))
            )
        );
    }
    println!();

    println!("{}", output::header("Verdict"));
    println!("{}", output::key_value("Verdict", output::verdict(result.verdict)));
    println!("{}", output::key_value("Reason", &result.verdict_reason));
    if let Some(tag) = &result.baseline_tag {
        println!("{}", output::key_value("Baseline", output::tag_style().apply_to(tag)));
    }
    if let Some(warning) = &result.unpushed_tag_warning {
        output::warning(warning);
    }

    if let Some(report) = &result.api_report {
        if report.is_empty() && report.errors.is_empty() {
            output::success("No API changes");
        } else {
            println!();
            let mut stdout = std::io::stdout();
            report
                .write_package_changes(&mut stdout)
                .map_err(|e| KeelError::from(EngineError::Report(e.to_string())))?;
        }
    }

    if !result.unresolved_allowed.is_empty() {
        println!();
        println!("{}", output::header("Allow-listed modules not found locally"));
        for identity in &result.unresolved_allowed {
            println!("  - {}", identity);
        }
    }

    if verbose {
        for warning in &result.warnings {
            output::warning(warning);
        }
    }
    Ok(())
}
