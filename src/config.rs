//! Configuration discovery and effective settings resolution.
//!
//! `dsf-linter.toml|yaml|yml` is read from the project directory (or its
//! closest ancestor holding a config file or `.git`) and merged with CLI
//! flags into an `Effective` config. Defaults:
//! - `report.dir`: `report`
//! - `report.html`: false
//! - `lint.fail_on_errors`: false
//! - `lint.output`: `human`
//! - `maven.build`: false, goals `clean package dependency:copy-dependencies`
//! - `maven.timeout_secs`: 600
//! - `leftover.ignore`: empty
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::error::{LintError, Result};
use crate::linter::LintOptions;
use crate::maven::{BuildOptions, DEFAULT_TIMEOUT_SECS};
use crate::report::DEFAULT_REPORT_DIR;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILES: [&str; 3] = ["dsf-linter.toml", "dsf-linter.yaml", "dsf-linter.yml"];

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Report settings under `[report]`.
pub struct ReportCfg {
    pub dir: Option<String>,
    pub html: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LintCfg {
    pub fail_on_errors: Option<bool>,
    pub output: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Optional build step under `[maven]`.
pub struct MavenCfg {
    pub build: Option<bool>,
    pub executable: Option<String>,
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LeftoverCfg {
    /// Globs over resource-relative paths never reported as leftovers.
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Root configuration loaded from `dsf-linter.toml|yaml`.
pub struct DsfLinterConfig {
    pub report: Option<ReportCfg>,
    pub lint: Option<LintCfg>,
    pub maven: Option<MavenCfg>,
    pub leftover: Option<LeftoverCfg>,
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub report_dir: Option<String>,
    pub html: Option<bool>,
    pub fail_on_errors: Option<bool>,
    pub output: Option<String>,
    pub build: Option<bool>,
    pub mvn_add: Vec<String>,
    pub mvn_remove: Vec<String>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration after applying precedence.
pub struct Effective {
    pub config_root: PathBuf,
    pub config_file: Option<PathBuf>,
    pub report_dir: PathBuf,
    pub html: bool,
    pub fail_on_errors: bool,
    pub output: String,
    pub build: Option<BuildOptions>,
    pub leftover_ignore: Vec<String>,
}

impl Effective {
    pub fn lint_options(&self) -> LintOptions {
        LintOptions {
            report_dir: self.report_dir.clone(),
            html: self.html,
            fail_on_errors: self.fail_on_errors,
            build: self.build.clone(),
            leftover_ignore: self.leftover_ignore.clone(),
        }
    }
}

/// Walk upward from `start` to the directory holding the config.
///
/// Stops at a `dsf-linter.toml|yaml|yml` or a `.git` directory; falls back
/// to `start`.
pub fn detect_config_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if CONFIG_FILES.iter().any(|f| cur.join(f).is_file()) || cur.join(".git").exists() {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load the first config file present in `root`, TOML before YAML.
pub fn load_config(root: &Path) -> Result<Option<(PathBuf, DsfLinterConfig)>> {
    for name in CONFIG_FILES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let text = fs::read_to_string(&path).map_err(|e| LintError::io(&path, e))?;
        let cfg: DsfLinterConfig = if name.ends_with(".toml") {
            toml::from_str(&text)
                .map_err(|e| LintError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            serde_yaml::from_str(&text)
                .map_err(|e| LintError::Config(format!("{}: {}", path.display(), e)))?
        };
        return Ok(Some((path, cfg)));
    }
    Ok(None)
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(start: &Path, cli: &CliOverrides) -> Result<Effective> {
    let config_root = detect_config_root(start);
    let (config_file, cfg) = match load_config(&config_root)? {
        Some((path, cfg)) => (Some(path), cfg),
        None => (None, DsfLinterConfig::default()),
    };
    let report = cfg.report.unwrap_or_default();
    let lint = cfg.lint.unwrap_or_default();
    let maven = cfg.maven.unwrap_or_default();
    let leftover = cfg.leftover.unwrap_or_default();

    let report_dir = cli
        .report_dir
        .clone()
        .or(report.dir)
        .unwrap_or_else(|| DEFAULT_REPORT_DIR.to_string());
    let html = cli.html.or(report.html).unwrap_or(false);
    let fail_on_errors = cli.fail_on_errors.or(lint.fail_on_errors).unwrap_or(false);
    let output = cli
        .output
        .clone()
        .or(lint.output)
        .unwrap_or_else(|| "human".to_string());
    if output != "human" && output != "json" {
        return Err(LintError::Config(format!(
            "unknown output '{}'; expected human or json",
            output
        )));
    }

    let build = if cli.build.or(maven.build).unwrap_or(false) {
        let mut add = maven.add;
        add.extend(cli.mvn_add.iter().cloned());
        let mut remove = maven.remove;
        remove.extend(cli.mvn_remove.iter().cloned());
        Some(BuildOptions {
            executable: maven.executable,
            add_goals: add,
            remove_goals: remove,
            timeout: Duration::from_secs(maven.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    } else {
        None
    };

    Ok(Effective {
        config_root,
        config_file,
        report_dir: PathBuf::from(report_dir),
        html,
        fail_on_errors,
        output,
        build,
        leftover_ignore: leftover.ignore,
    })
}
