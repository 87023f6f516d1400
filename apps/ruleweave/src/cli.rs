//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ruleweave",
    version,
    about = "Ruleweave: structural linter for JSON/YAML documents",
    long_about = "Ruleweave lints JSON and YAML documents (OpenAPI, AsyncAPI, JSON Schema, ...) against a ruleset.\n\nConfiguration precedence: CLI > ruleweave.toml > defaults.",
    after_help = "Examples:\n  ruleweave lint openapi.yaml --ruleset .ruleweave.yaml\n  ruleweave lint 'specs/**/*.yaml' --output json --fail-severity warn",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
/// Supported subcommands.
pub enum Commands {
    /// Show version
    #[command(
        about = "Show version",
        long_about = "Print the current ruleweave version."
    )]
    Version,
    /// Lint documents against a ruleset
    #[command(
        about = "Lint documents",
        long_about = "Resolve $refs in every matched document, run the ruleset and print diagnostics. Exits 1 when a diagnostic reaches the fail severity, 2 on fatal errors.",
        after_help = "Examples:\n  ruleweave lint api.yaml --ruleset rules.yaml\n  ruleweave lint 'apis/*.json' --output json\n  cat api.yaml | ruleweave lint - --ruleset rules.yaml"
    )]
    Lint {
        #[arg(required = true, help = "Documents or glob patterns to lint (`-` reads stdin)")]
        documents: Vec<String>,
        #[arg(long, help = "Repository root (default: current dir)")]
        repo_root: Option<String>,
        #[arg(long, short = 'r', help = "Ruleset path or URL")]
        ruleset: Option<String>,
        #[arg(long, short = 'o', help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, short = 'F', help = "Lowest severity that fails the run: error|warn|info|hint (default: error)")]
        fail_severity: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Do not warn about documents matching no known format")]
        ignore_unknown_format: bool,
        #[arg(long, short = 'v', action = clap::ArgAction::SetTrue, help = "Log debug output to stderr")]
        verbose: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lint_arguments() {
        let cli = Cli::try_parse_from([
            "ruleweave",
            "lint",
            "a.yaml",
            "specs/*.json",
            "--ruleset",
            "rules.yaml",
            "-F",
            "warn",
            "--ignore-unknown-format",
        ])
        .unwrap();
        match cli.cmd {
            Commands::Lint {
                documents,
                ruleset,
                fail_severity,
                ignore_unknown_format,
                verbose,
                ..
            } => {
                assert_eq!(documents, vec!["a.yaml", "specs/*.json"]);
                assert_eq!(ruleset.as_deref(), Some("rules.yaml"));
                assert_eq!(fail_severity.as_deref(), Some("warn"));
                assert!(ignore_unknown_format);
                assert!(!verbose);
            }
            Commands::Version => panic!("expected lint"),
        }
    }

    #[test]
    fn test_lint_requires_documents() {
        assert!(Cli::try_parse_from(["ruleweave", "lint"]).is_err());
    }
}
