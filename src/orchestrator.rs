//! Per-plugin lint pass.
//!
//! Plugins are processed one at a time in discovery order. Within a plugin
//! the steps run in a fixed sequence: BPMN, FHIR, service registration,
//! declared references, leftover attribution, then result and report.

use crate::classpath::ClassPath;
use crate::error::Result;
use crate::leftover::LeftoverResourceDetector;
use crate::models::discovery::{DiscoveryResult, LeftoverAnalysisResult, PluginDiscovery};
use crate::models::result::PluginResult;
use crate::report::ReportGenerator;
use crate::validation::{
    BpmnValidationService, FhirValidationService, PluginValidationService, ValidationContext,
};
use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, info, info_span};

pub struct PluginOrchestrator<'a> {
    pub project_root: &'a Path,
    pub classpath: &'a ClassPath,
    pub bpmn: &'a BpmnValidationService,
    pub fhir: &'a FhirValidationService,
    pub reports: &'a ReportGenerator,
}

impl<'a> PluginOrchestrator<'a> {
    /// Lint every plugin of `discovery`, stopping at the first fatal error.
    pub fn run_all(
        &self,
        discovery: &DiscoveryResult,
        leftovers: &LeftoverAnalysisResult,
    ) -> Result<IndexMap<String, PluginResult>> {
        let total = discovery.len();
        let mut results = IndexMap::new();
        for (i, (key, plugin)) in discovery.plugins.iter().enumerate() {
            let is_last = i + 1 == total;
            let result = self.lint_plugin(key, plugin, leftovers, is_last, total == 1)?;
            results.insert(key.clone(), result);
        }
        Ok(results)
    }

    /// Lint one plugin and write its report.
    pub fn lint_plugin(
        &self,
        plugin_key: &str,
        plugin: &PluginDiscovery,
        leftovers: &LeftoverAnalysisResult,
        is_last_plugin: bool,
        is_single_plugin_project: bool,
    ) -> Result<PluginResult> {
        let span = info_span!("plugin", key = %plugin_key);
        let _guard = span.enter();
        let ctx = ValidationContext {
            api_version: plugin.api_version,
            classpath: self.classpath,
            project_root: self.project_root,
            resources_dir: &plugin.resources_dir,
        };

        let mut items = self.bpmn.validate(&plugin.bpmn_files, &ctx);
        debug!(items = items.len(), "BPMN validated");
        items.extend(self.fhir.validate(&plugin.fhir_files, &ctx));
        items.extend(PluginValidationService::validate(
            self.project_root,
            plugin_key,
            plugin,
        )?);
        items.extend(PluginValidationService::reference_items(plugin_key, plugin));
        items.extend(LeftoverResourceDetector::items_for_plugin(
            leftovers,
            plugin_key,
            plugin,
            is_last_plugin,
            is_single_plugin_project,
        ));

        let result = PluginResult::new(
            plugin_key,
            plugin.adapter.source_identity(),
            plugin.api_version,
            items,
        );
        let path = self
            .reports
            .write_plugin_report(plugin_key, &result, plugin)?;
        info!(
            errors = result.summary.errors,
            warnings = result.summary.warnings,
            "plugin linted"
        );
        Ok(result.with_report_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::testing::write_service;
    use crate::error::LintError;
    use crate::models::{Severity, LEFTOVER_RULE};
    use crate::plugin::adapter::V2_CONTRACT;
    use crate::plugin::{ApiVersion, PluginAdapter, PluginCapabilities};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn plugin(name: &str, class: &str, root: &Path) -> PluginDiscovery {
        let caps = PluginCapabilities {
            name: name.into(),
            ..Default::default()
        };
        PluginDiscovery {
            adapter: PluginAdapter::new(ApiVersion::V2, class, caps).unwrap(),
            api_version: ApiVersion::V2,
            bpmn_files: BTreeSet::new(),
            fhir_files: BTreeSet::new(),
            referenced_paths: BTreeSet::new(),
            missing_bpmn_refs: BTreeSet::new(),
            missing_fhir_refs: BTreeSet::new(),
            resources_dir: root.to_path_buf(),
        }
    }

    #[test]
    fn test_leftovers_go_to_last_plugin_only() {
        let dir = tempdir().unwrap();
        write_service(dir.path(), V2_CONTRACT, &["a.Ping", "a.Pong"]);
        let mut discovery = DiscoveryResult::default();
        discovery.insert_unique("ping".into(), plugin("ping", "a.Ping", dir.path()));
        discovery.insert_unique("pong".into(), plugin("pong", "a.Pong", dir.path()));
        let mut leftovers = LeftoverAnalysisResult::default();
        leftovers.leftover_bpmn_paths.insert("bpe/old.bpmn".into());

        let cp = ClassPath::default();
        let bpmn = BpmnValidationService::default();
        let fhir = FhirValidationService::default();
        let reports = ReportGenerator::new(dir.path().join("report"), false).unwrap();
        let orch = PluginOrchestrator {
            project_root: dir.path(),
            classpath: &cp,
            bpmn: &bpmn,
            fhir: &fhir,
            reports: &reports,
        };
        let results = orch.run_all(&discovery, &leftovers).unwrap();
        let keys: Vec<&String> = results.keys().collect();
        assert_eq!(keys, vec!["ping", "pong"]);
        assert!(!results["ping"].items.iter().any(|i| i.is_leftover()));
        let left: Vec<_> = results["pong"]
            .items
            .iter()
            .filter(|i| i.rule == LEFTOVER_RULE)
            .collect();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].severity, Severity::Warn);
        assert!(results["pong"].report_path.as_ref().unwrap().is_file());
    }

    #[test]
    fn test_missing_registration_aborts() {
        let dir = tempdir().unwrap();
        let mut discovery = DiscoveryResult::default();
        discovery.insert_unique("ping".into(), plugin("ping", "a.Ping", dir.path()));
        let cp = ClassPath::default();
        let bpmn = BpmnValidationService::default();
        let fhir = FhirValidationService::default();
        let reports = ReportGenerator::new(dir.path().join("report"), false).unwrap();
        let orch = PluginOrchestrator {
            project_root: dir.path(),
            classpath: &cp,
            bpmn: &bpmn,
            fhir: &fhir,
            reports: &reports,
        };
        let err = orch
            .run_all(&discovery, &LeftoverAnalysisResult::default())
            .unwrap_err();
        assert!(matches!(err, LintError::MissingServiceRegistration { .. }));
        assert!(!dir.path().join("report/ping").exists());
    }
}
