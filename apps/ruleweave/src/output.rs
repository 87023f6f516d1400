//! Output rendering for the lint command.
//!
//! Supports `human` (default) and `json` outputs. The JSON form includes
//! every diagnostic and a top-level summary.

use crate::document::pointer::{print_path, PrintStyle};
use crate::models::{Diagnostic, LintReport, Severity};
use owo_colors::OwoColorize;
use serde_json::Value as JsonVal;
use std::path::Path;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

/// Prefix for fatal messages printed to stderr.
pub fn error_prefix() -> String {
    if use_colors("human") {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

/// Prefix for informational notes printed to stderr.
pub fn note_prefix() -> String {
    if use_colors("human") {
        "note:".blue().bold().to_string()
    } else {
        "note:".to_string()
    }
}

/// Source shown to humans: relative to `base` when possible.
pub fn display_source(source: Option<&str>, base: &Path) -> String {
    match source {
        None => "<input>".to_string(),
        Some(s) => {
            let path = Path::new(s);
            if path.is_absolute() {
                pathdiff::diff_paths(path, base)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| s.to_string())
            } else {
                s.to_string()
            }
        }
    }
}

fn severity_label(severity: Severity, color: bool) -> String {
    let (label, icon) = match severity {
        Severity::Error => ("⟦error⟧", "✖"),
        Severity::Warning => ("⟦warn⟧", "▲"),
        Severity::Information => ("⟦info⟧", "◆"),
        Severity::Hint => ("⟦hint⟧", "·"),
    };
    if !color {
        return format!("{icon} {label}");
    }
    match severity {
        Severity::Error => format!("{} {}", icon.red(), label.red().bold()),
        Severity::Warning => format!("{} {}", icon.yellow(), label.yellow().bold()),
        Severity::Information => format!("{} {}", icon.blue(), label.blue().bold()),
        Severity::Hint => format!("{} {}", icon.bright_black(), label.bright_black()),
    }
}

/// One human-readable line for a diagnostic.
pub fn format_diagnostic(d: &Diagnostic, base: &Path, color: bool) -> String {
    let location = format!("{}:{}", display_source(d.source.as_deref(), base), d.range);
    let location = if color {
        location.bold().to_string()
    } else {
        location
    };
    let path = print_path(&d.path, PrintStyle::Dot);
    let path = if path.is_empty() {
        String::new()
    } else {
        format!(" ({path})")
    };
    format!(
        "{} {} ❲{}❳ — {}{}",
        severity_label(d.severity, color),
        location,
        d.code,
        d.message,
        path
    )
}

/// Print lint results in the requested format.
pub fn print_lint(res: &LintReport, output: &str, base: &Path) {
    match output {
        "json" => match serde_json::to_string_pretty(&compose_lint_json(res)) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("{} {}", error_prefix(), e),
        },
        _ => {
            let color = use_colors(output);
            for d in &res.diagnostics {
                println!("{}", format_diagnostic(d, base, color));
            }
            let summary = format!(
                "— Summary — errors={} warnings={} infos={} hints={} files={}",
                res.summary.errors,
                res.summary.warnings,
                res.summary.infos,
                res.summary.hints,
                res.summary.files
            );
            if color {
                println!("{}", summary.bold());
            } else {
                println!("{}", summary);
            }
        }
    }
}

/// Compose lint JSON object (pure) for testing/snapshot purposes.
pub fn compose_lint_json(res: &LintReport) -> JsonVal {
    serde_json::to_value(res).unwrap_or(JsonVal::Null)
}
