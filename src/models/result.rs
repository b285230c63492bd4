//! Per-plugin and overall lint results.

use super::discovery::LeftoverAnalysisResult;
use super::{sort_items, LintItem, Summary};
use crate::plugin::adapter::ApiVersion;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
/// Outcome of one plugin's orchestration pass. Immutable once built.
pub struct PluginResult {
    pub plugin_name: String,
    pub plugin_class_name: String,
    pub api_version: ApiVersion,
    pub items: Vec<LintItem>,
    pub summary: Summary,
    pub report_path: Option<PathBuf>,
}

impl PluginResult {
    /// Build a result from unsorted items; sorting and counting happen here.
    pub fn new(
        plugin_name: impl Into<String>,
        plugin_class_name: impl Into<String>,
        api_version: ApiVersion,
        mut items: Vec<LintItem>,
    ) -> Self {
        sort_items(&mut items);
        let summary = Summary::from_items(&items);
        Self {
            plugin_name: plugin_name.into(),
            plugin_class_name: plugin_class_name.into(),
            api_version,
            items,
            summary,
            report_path: None,
        }
    }

    pub fn with_report_path(mut self, path: PathBuf) -> Self {
        self.report_path = Some(path);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
/// Aggregate of a whole run across every discovered plugin.
pub struct OverallResult {
    pub plugin_results: IndexMap<String, PluginResult>,
    pub leftover_analysis: LeftoverAnalysisResult,
    pub master_report_path: Option<PathBuf>,
    pub execution_time_ms: u128,
    pub success: bool,
    pub summary: Summary,
    /// Non-leftover errors plus the leftover count. Reporting only.
    pub total_errors: usize,
}

impl OverallResult {
    /// Successful result for a run that found nothing to check.
    pub fn empty(execution_time_ms: u128) -> Self {
        Self {
            execution_time_ms,
            success: true,
            ..Default::default()
        }
    }

    /// Aggregate plugin results and apply the success gate.
    ///
    /// Leftovers are advisory: they enter `total_errors` once (from the
    /// project-wide analysis, not from per-plugin sums) and never flip
    /// `success`.
    pub fn aggregate(
        plugin_results: IndexMap<String, PluginResult>,
        leftover_analysis: LeftoverAnalysisResult,
        fail_on_errors: bool,
        execution_time_ms: u128,
    ) -> Self {
        let mut summary = Summary::default();
        for r in plugin_results.values() {
            summary.add(&r.summary);
        }
        let plugin_errors = summary.errors;
        let success = !fail_on_errors || plugin_errors == 0;
        let total_errors = plugin_errors + leftover_analysis.count();
        Self {
            plugin_results,
            leftover_analysis,
            master_report_path: None,
            execution_time_ms,
            success,
            summary,
            total_errors,
        }
    }

    pub fn plugin_count(&self) -> usize {
        self.plugin_results.len()
    }
}
