//! Leftover detection: resource files on disk that no plugin references.
//!
//! The analysis runs once per lint run over the union of every plugin's
//! references, so a file used by any plugin is never a leftover.
//!
//! Display attribution is a reporting decision, not part of the analysis:
//! the whole leftover list is shown under exactly one plugin (the sole
//! plugin, or the last one processed). Summing per-plugin counts therefore
//! counts each leftover once. The project-wide set is also carried on the
//! overall result so reports can show it as its own section.

use crate::error::{LintError, Result};
use crate::models::discovery::{
    is_bpmn_path, is_fhir_path, LeftoverAnalysisResult, PluginDiscovery,
};
use crate::models::{ItemKind, LintItem, Severity, LEFTOVER_RULE};
use crate::resource::{FileSystemResources, ResourceProvider};
use crate::resource_discovery::{BPMN_DIR, FHIR_DIR};
use glob::Pattern;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct LeftoverResourceDetector {
    ignore: Vec<Pattern>,
}

impl LeftoverResourceDetector {
    /// Build a detector with glob ignore patterns matched against
    /// resource-relative paths (`bpe/drafts/*.bpmn`).
    pub fn new(ignore: &[String]) -> Result<Self> {
        let ignore = ignore
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| {
                        LintError::Config(format!("invalid leftover ignore '{}': {}", p, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ignore })
    }

    /// List every BPMN file under `bpe/` and every FHIR file under `fhir/`
    /// of the shared resources directory and subtract the referenced sets.
    ///
    /// A relative `shared_resources_dir` is resolved against `project_dir`.
    pub fn analyze(
        &self,
        project_dir: &Path,
        shared_resources_dir: &Path,
        all_referenced_bpmn: &BTreeSet<String>,
        all_referenced_fhir: &BTreeSet<String>,
    ) -> LeftoverAnalysisResult {
        let root = if shared_resources_dir.is_absolute() {
            shared_resources_dir.to_path_buf()
        } else {
            project_dir.join(shared_resources_dir)
        };
        let provider = FileSystemResources::new(root);
        let leftover_bpmn_paths =
            self.unreferenced(&provider, BPMN_DIR, &is_bpmn_path, all_referenced_bpmn);
        let leftover_fhir_paths =
            self.unreferenced(&provider, FHIR_DIR, &is_fhir_path, all_referenced_fhir);
        let result = LeftoverAnalysisResult {
            leftover_bpmn_paths,
            leftover_fhir_paths,
        };
        info!(
            bpmn = result.leftover_bpmn_paths.len(),
            fhir = result.leftover_fhir_paths.len(),
            "leftover analysis finished"
        );
        result
    }

    fn unreferenced(
        &self,
        provider: &dyn ResourceProvider,
        subdir: &str,
        accept: &dyn Fn(&str) -> bool,
        referenced: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        provider
            .list(subdir, accept)
            .into_iter()
            .map(|e| e.relative)
            .filter(|rel| !referenced.contains(rel))
            .filter(|rel| {
                let ignored = self.ignore.iter().any(|p| p.matches(rel));
                if ignored {
                    debug!(path = %rel, "leftover ignored by pattern");
                }
                !ignored
            })
            .collect()
    }

    /// Leftover items to display under one plugin's report.
    ///
    /// Only the recipient (sole plugin, or last processed) gets items: a
    /// WARN per leftover file, or a single SUCCESS when there are none.
    /// Every other plugin gets nothing, keeping summed counts honest.
    pub fn items_for_plugin(
        result: &LeftoverAnalysisResult,
        plugin_name: &str,
        discovery: &PluginDiscovery,
        is_last_plugin: bool,
        is_single_plugin_project: bool,
    ) -> Vec<LintItem> {
        if !(is_last_plugin || is_single_plugin_project) {
            return Vec::new();
        }
        if result.is_empty() {
            return vec![LintItem::plugin(
                Severity::Success,
                LEFTOVER_RULE,
                discovery.resources_dir.display().to_string(),
                "every BPMN and FHIR file is referenced by a plugin",
            )
            .on(plugin_name)];
        }
        let bpmn = result
            .leftover_bpmn_paths
            .iter()
            .map(|p| (ItemKind::Bpmn, p, "BPMN file is not referenced by any plugin"));
        let fhir = result
            .leftover_fhir_paths
            .iter()
            .map(|p| (ItemKind::Fhir, p, "FHIR resource is not referenced by any plugin"));
        bpmn.chain(fhir)
            .map(|(kind, path, msg)| {
                LintItem::new(kind, Severity::Warn, LEFTOVER_RULE, path.as_str(), msg)
                    .at(path.as_str())
                    .on(plugin_name)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::discovery::DiscoveryResult;
    use crate::plugin::{ApiVersion, PluginAdapter, PluginCapabilities};
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, "<x/>").unwrap();
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn discovery(name: &str, dir: &Path, refs: &[&str]) -> PluginDiscovery {
        let caps = PluginCapabilities {
            name: name.to_string(),
            ..Default::default()
        };
        PluginDiscovery {
            adapter: PluginAdapter::new(ApiVersion::V1, format!("a.{}", name), caps).unwrap(),
            api_version: ApiVersion::V1,
            bpmn_files: BTreeSet::new(),
            fhir_files: BTreeSet::new(),
            referenced_paths: set(refs),
            missing_bpmn_refs: BTreeSet::new(),
            missing_fhir_refs: BTreeSet::new(),
            resources_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_union_of_references_is_never_leftover() {
        let dir = tempdir().unwrap();
        let files = [
            "bpe/a.bpmn",
            "bpe/b.bpmn",
            "bpe/extra.bpmn",
            "fhir/a.xml",
            "fhir/b.json",
            "fhir/extra.xml",
            "fhir/readme.md",
        ];
        for f in files {
            touch(dir.path(), f);
        }
        let mut result = DiscoveryResult::default();
        let one = discovery("one", dir.path(), &["bpe/a.bpmn", "fhir/a.xml"]);
        let two = discovery("two", dir.path(), &["bpe/b.bpmn", "fhir/b.json"]);
        result.insert_unique("one".into(), one);
        result.insert_unique("two".into(), two);
        let detector = LeftoverResourceDetector::default();
        let analysis = detector.analyze(
            dir.path(),
            dir.path(),
            &result.all_referenced_bpmn(),
            &result.all_referenced_fhir(),
        );
        assert_eq!(analysis.leftover_bpmn_paths, set(&["bpe/extra.bpmn"]));
        assert_eq!(analysis.leftover_fhir_paths, set(&["fhir/extra.xml"]));
        assert_eq!(analysis.count(), 2);

        let again = detector.analyze(
            dir.path(),
            dir.path(),
            &result.all_referenced_bpmn(),
            &result.all_referenced_fhir(),
        );
        assert_eq!(analysis, again);
    }

    #[test]
    fn test_relative_resources_dir_and_ignore_patterns() {
        let dir = tempdir().unwrap();
        let res = dir.path().join("src/main/resources");
        touch(&res, "bpe/drafts/wip.bpmn");
        touch(&res, "bpe/old.bpmn");
        let detector = LeftoverResourceDetector::new(&["bpe/drafts/*".to_string()]).unwrap();
        let analysis = detector.analyze(
            dir.path(),
            Path::new("src/main/resources"),
            &BTreeSet::new(),
            &BTreeSet::new(),
        );
        assert_eq!(analysis.leftover_bpmn_paths, set(&["bpe/old.bpmn"]));
        assert!(LeftoverResourceDetector::new(&["[".to_string()]).is_err());
    }

    #[test]
    fn test_single_attribution() {
        let dir = tempdir().unwrap();
        let analysis = LeftoverAnalysisResult {
            leftover_bpmn_paths: set(&["bpe/x.bpmn"]),
            leftover_fhir_paths: set(&["fhir/y.xml"]),
        };
        let d = discovery("p", dir.path(), &[]);
        let items = LeftoverResourceDetector::items_for_plugin(&analysis, "p", &d, false, false);
        assert!(items.is_empty());
        let last = LeftoverResourceDetector::items_for_plugin(&analysis, "p", &d, true, false);
        assert_eq!(last.len(), 2);
        assert!(last.iter().all(|i| i.is_leftover() && i.severity == Severity::Warn));
        let sole = LeftoverResourceDetector::items_for_plugin(&analysis, "p", &d, false, true);
        assert_eq!(sole, last);
    }

    #[test]
    fn test_no_leftovers_yields_one_success() {
        let dir = tempdir().unwrap();
        let d = discovery("p", dir.path(), &[]);
        let items = LeftoverResourceDetector::items_for_plugin(
            &LeftoverAnalysisResult::default(),
            "p",
            &d,
            true,
            true,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].severity, Severity::Success);
    }
}
