//! Rule-based validation of plugin resources.
//!
//! Rules are stateless and order-independent. A service runs its rule set
//! over every file of one plugin (files in parallel) and returns the
//! findings sorted, so parallelism never shows in the output.

pub mod bpmn;
pub mod fhir;
pub mod plugin;

use crate::classpath::ClassPath;
use crate::models::{sort_items, LintItem};
use crate::plugin::ApiVersion;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub use bpmn::{BpmnRule, BpmnValidationService};
pub use fhir::{FhirRule, FhirValidationService};
pub use plugin::PluginValidationService;

/// Per-plugin state consulted by version-sensitive checks.
///
/// Passed explicitly down the call chain; nothing is stored between runs.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub api_version: ApiVersion,
    pub classpath: &'a ClassPath,
    pub project_root: &'a Path,
    pub resources_dir: &'a Path,
}

impl<'a> ValidationContext<'a> {
    /// Label for a file in findings: relative to the resources directory
    /// when possible, the full path otherwise.
    pub fn display_path(&self, path: &Path) -> String {
        match pathdiff::diff_paths(path, self.resources_dir) {
            Some(rel) if !rel.starts_with("..") => rel.to_string_lossy().replace('\\', "/"),
            _ => path.display().to_string(),
        }
    }
}

/// Apply `check` to every file in parallel and return the sorted union.
pub(crate) fn validate_files<F>(files: &BTreeSet<PathBuf>, check: F) -> Vec<LintItem>
where
    F: Fn(&Path) -> Vec<LintItem> + Sync + Send,
{
    let files: Vec<&PathBuf> = files.iter().collect();
    let mut items: Vec<LintItem> = files
        .par_iter()
        .flat_map_iter(|p| check(p.as_path()))
        .collect();
    sort_items(&mut items);
    items
}
