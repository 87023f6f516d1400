//! Ruleweave CLI binary entry point.
//! Resolves configuration, loads the ruleset, lints every matched document
//! and prints the combined report.

use clap::Parser;
use rayon::prelude::*;
use ruleweave::cli::{Cli, Commands};
use ruleweave::config::{self, Effective};
use ruleweave::document::{SourceDocument, STDIN};
use ruleweave::fetch::{is_http, normalize, HttpAndFileFetcher, StaticAssets};
use ruleweave::inventory::Resolver;
use ruleweave::linter::{LintOptions, Linter};
use ruleweave::models::{Diagnostic, LintReport};
use ruleweave::output::{self, error_prefix, note_prefix};
use ruleweave::ruleset::function::FunctionRegistry;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Input {
    Stdin,
    File(PathBuf),
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ruleweave=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", error_prefix(), message);
    std::process::exit(2);
}

/// Expand glob patterns into a sorted, deduplicated input list.
fn expand_inputs(patterns: &[String]) -> Result<Vec<Input>, String> {
    let mut inputs = BTreeSet::new();
    for pattern in patterns {
        if pattern == "-" {
            inputs.insert(Input::Stdin);
            continue;
        }
        let entries = glob::glob(pattern).map_err(|e| format!("Invalid pattern {pattern}: {e}"))?;
        let mut matched = false;
        for entry in entries {
            let path = entry.map_err(|e| e.to_string())?;
            if path.is_file() {
                matched = true;
                inputs.insert(Input::File(path));
            }
        }
        if !matched {
            return Err(format!("No documents matched {pattern}"));
        }
    }
    Ok(inputs.into_iter().collect())
}

fn absolute(cwd: &Path, path: &Path) -> String {
    normalize(&cwd.join(path)).to_string_lossy().into_owned()
}

fn build_linter(eff: &Effective, cwd: &Path) -> Result<Linter, String> {
    let mut assets = StaticAssets::new();
    for (uri, file) in &eff.assets {
        assets.insert_file(uri.clone(), file).map_err(|e| e.to_string())?;
    }
    let fetcher = HttpAndFileFetcher::new(assets, eff.http.clone());
    let mut linter = Linter::new(Resolver::new(Arc::new(fetcher)));

    let Some(ruleset) = eff.ruleset.as_deref() else {
        return Err("Ruleset is not configured. Pass --ruleset or add ruleweave.toml.".to_string());
    };
    let uri = if is_http(ruleset) || ruleset.starts_with("file://") {
        ruleset.to_string()
    } else {
        absolute(cwd, Path::new(ruleset))
    };
    linter
        .load_ruleset(&uri, FunctionRegistry::new())
        .map_err(|e| e.to_string())?;
    Ok(linter)
}

fn read_input(input: &Input, cwd: &Path) -> Result<SourceDocument, String> {
    match input {
        Input::Stdin => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("Could not read stdin: {e}"))?;
            Ok(SourceDocument::from_source(text, Some(STDIN.to_string())))
        }
        Input::File(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Could not read {}: {e}", path.display()))?;
            Ok(SourceDocument::from_source(text, Some(absolute(cwd, path))))
        }
    }
}

fn run_lint(eff: &Effective, documents: &[String]) -> Result<LintReport, String> {
    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    let inputs = expand_inputs(documents)?;
    let linter = build_linter(eff, &cwd)?;
    let options = LintOptions {
        ignore_unknown_format: eff.ignore_unknown_format,
    };
    tracing::debug!(documents = inputs.len(), "linting");

    let results: Vec<Result<Vec<Diagnostic>, String>> = inputs
        .par_iter()
        .map(|input| {
            let document = read_input(input, &cwd)?;
            linter
                .lint(Arc::new(document), options)
                .map(|outcome| outcome.diagnostics)
                .map_err(|e| e.to_string())
        })
        .collect();
    let mut diagnostics = Vec::new();
    for result in results {
        diagnostics.extend(result?);
    }
    Ok(LintReport::new(diagnostics, inputs.len()))
}

fn main() {
    let cli = Cli::parse();
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Lint {
            documents,
            repo_root,
            ruleset,
            output,
            fail_severity,
            ignore_unknown_format,
            verbose,
        } => {
            init_logging(verbose);
            let eff = config::resolve_effective(
                repo_root.as_deref(),
                ruleset.as_deref(),
                output.as_deref(),
                fail_severity.as_deref(),
                if ignore_unknown_format { Some(true) } else { None },
            );
            if ruleset.is_none() && config::load_config(&eff.repo_root).is_none() {
                eprintln!("{} No ruleweave.toml found; using defaults.", note_prefix());
            }
            let report = match run_lint(&eff, &documents) {
                Ok(report) => report,
                Err(e) => fail(e),
            };
            let cwd = std::env::current_dir().unwrap_or_else(|_| eff.repo_root.clone());
            output::print_lint(&report, &eff.output, &cwd);
            if report.fails_at(eff.fail_severity) {
                std::process::exit(1);
            }
        }
    }
}
