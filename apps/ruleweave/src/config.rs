//! Configuration discovery and effective settings resolution.
//!
//! Ruleweave reads `ruleweave.toml|yaml|yml` from the repository root (or
//! closest ancestor) and merges it with CLI flags to produce an `Effective`
//! config. Defaults:
//! - `ruleset`: none (must come from the CLI or the file)
//! - `output`: `human`
//! - `fail_severity`: `error`
//! - `ignore_unknown_format`: false
//! - `http.timeout_secs`, `http.proxy`: unset
//! - `assets`: empty
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::fetch::{is_http, HttpOptions};
use crate::models::Severity;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILES: [&str; 3] = ["ruleweave.toml", "ruleweave.yaml", "ruleweave.yml"];

#[derive(Debug, Default, Deserialize, Clone)]
/// Remote fetch settings under `[http]`.
pub struct HttpCfg {
    pub timeout_secs: Option<u64>,
    pub proxy: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `ruleweave.toml|yaml`.
pub struct RuleweaveConfig {
    pub ruleset: Option<String>,
    pub output: Option<String>,
    pub fail_severity: Option<String>,
    pub ignore_unknown_format: Option<bool>,
    #[serde(default)]
    pub http: Option<HttpCfg>,
    /// URI -> local file served in place of fetching the URI.
    #[serde(default)]
    pub assets: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    /// Ruleset URI; local paths are made absolute against `repo_root`.
    pub ruleset: Option<String>,
    pub output: String,
    pub fail_severity: Severity,
    pub ignore_unknown_format: bool,
    pub http: HttpOptions,
    /// URI -> absolute path of the file holding its content.
    pub assets: BTreeMap<String, PathBuf>,
}

/// Walk upward from `start` to detect the repository root.
///
/// Stops when a `ruleweave.toml|yaml|yml` or a `.git` directory is found.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if CONFIG_FILES.iter().any(|name| cur.join(name).exists()) {
            return cur.to_path_buf();
        }
        if cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load `RuleweaveConfig` from `ruleweave.toml` or `ruleweave.yaml|yml` if present.
pub fn load_config(root: &Path) -> Option<RuleweaveConfig> {
    let toml_path = root.join("ruleweave.toml");
    if toml_path.exists() {
        let s = fs::read_to_string(&toml_path).ok()?;
        return match toml::from_str(&s) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                tracing::warn!(path = %toml_path.display(), %err, "ignoring unreadable config");
                None
            }
        };
    }
    for yml in ["ruleweave.yaml", "ruleweave.yml"] {
        let p = root.join(yml);
        if p.exists() {
            let s = fs::read_to_string(&p).ok()?;
            return match serde_yaml::from_str(&s) {
                Ok(cfg) => Some(cfg),
                Err(err) => {
                    tracing::warn!(path = %p.display(), %err, "ignoring unreadable config");
                    None
                }
            };
        }
    }
    None
}

fn absolutize(root: &Path, reference: &str) -> String {
    if is_http(reference) || Path::new(reference).is_absolute() {
        reference.to_string()
    } else {
        root.join(reference).to_string_lossy().to_string()
    }
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(
    cli_repo_root: Option<&str>,
    cli_ruleset: Option<&str>,
    cli_output: Option<&str>,
    cli_fail_severity: Option<&str>,
    cli_ignore_unknown_format: Option<bool>,
) -> Effective {
    let start = PathBuf::from(cli_repo_root.unwrap_or("."));
    let repo_root = detect_repo_root(&start);
    let cfg = load_config(&repo_root).unwrap_or_default();

    // CLI paths are relative to the working directory, config paths to the root.
    let ruleset = match cli_ruleset {
        Some(r) => Some(r.to_string()),
        None => cfg.ruleset.as_deref().map(|r| absolutize(&repo_root, r)),
    };

    let output = cli_output
        .map(|s| s.to_string())
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());

    let fail_token = cli_fail_severity
        .map(|s| s.to_string())
        .or(cfg.fail_severity)
        .unwrap_or_else(|| "error".to_string());
    let fail_severity = Severity::parse_threshold(&fail_token).unwrap_or_else(|| {
        tracing::warn!(token = %fail_token, "unknown fail severity; using error");
        Severity::Error
    });

    let ignore_unknown_format = cli_ignore_unknown_format
        .or(cfg.ignore_unknown_format)
        .unwrap_or(false);

    let http = cfg
        .http
        .map(|h| HttpOptions {
            timeout: h.timeout_secs.map(Duration::from_secs),
            proxy: h.proxy,
        })
        .unwrap_or_default();

    let assets = cfg
        .assets
        .unwrap_or_default()
        .into_iter()
        .map(|(uri, file)| {
            let path = PathBuf::from(&file);
            let path = if path.is_absolute() { path } else { repo_root.join(path) };
            (uri, path)
        })
        .collect();

    Effective {
        repo_root,
        ruleset,
        output,
        fail_severity,
        ignore_unknown_format,
        http,
        assets,
    }
}
