//! Plugin-level checks: service registration and declared references.

use crate::classpath::{parse_service_file, SERVICES_DIR};
use crate::error::{LintError, Result};
use crate::models::discovery::PluginDiscovery;
use crate::models::{LintItem, Severity};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};
use walkdir::{DirEntry, WalkDir};

pub const REGISTRATION_RULE: &str = "plugin-service-registration";
pub const MISSING_REFERENCE_RULE: &str = "missing-reference";

/// Directories, relative to a module root, that may hold the services
/// folder. Checked in this order.
pub const REGISTRATION_LOCATIONS: [&str; 6] = [
    "META-INF/services",
    "src/main/resources/META-INF/services",
    "target/classes/META-INF/services",
    "build/resources/main/META-INF/services",
    "build/classes/java/main/META-INF/services",
    "out/production/resources/META-INF/services",
];

/// Directories never entered by the fallback walk.
pub const SKIPPED_DIRS: [&str; 8] = [
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    ".gradle",
    ".mvn",
    "node_modules",
];

pub const MAX_WALK_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationSearch {
    pub found: Option<PathBuf>,
    /// Number of well-known locations checked before any fallback walk.
    pub searched: usize,
}

pub struct PluginValidationService;

impl PluginValidationService {
    /// Module roots to search: the project root, then each immediate
    /// sub-directory (multi-module layouts), sorted by name.
    pub fn module_roots(project_root: &Path) -> Vec<PathBuf> {
        let mut subdirs: Vec<PathBuf> = fs::read_dir(project_root)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|e| !is_skipped_name(&e.file_name().to_string_lossy()))
            .map(|e| e.path())
            .collect();
        subdirs.sort();
        let mut roots = vec![project_root.to_path_buf()];
        roots.extend(subdirs);
        roots
    }

    /// Locate `META-INF/services/<contract>` under `project_root`.
    pub fn find_registration(project_root: &Path, contract: &str) -> RegistrationSearch {
        let mut searched = 0usize;
        for module in Self::module_roots(project_root) {
            for loc in REGISTRATION_LOCATIONS {
                searched += 1;
                let candidate = module.join(loc).join(contract);
                if candidate.is_file() {
                    return RegistrationSearch {
                        found: Some(candidate),
                        searched,
                    };
                }
            }
        }
        debug!(contract, searched, "no registration in standard locations; walking project");
        let suffix = Path::new(SERVICES_DIR).join(contract);
        let found = WalkDir::new(project_root)
            .max_depth(MAX_WALK_DEPTH)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped(e))
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.path().ends_with(&suffix))
            .map(DirEntry::into_path);
        RegistrationSearch { found, searched }
    }

    /// Check that the plugin is registered for its API contract.
    ///
    /// A missing registration is returned as an error: it aborts the run,
    /// since an unregistered plugin is invisible to the DSF at runtime.
    pub fn validate(
        project_root: &Path,
        plugin_key: &str,
        discovery: &PluginDiscovery,
    ) -> Result<Vec<LintItem>> {
        let class = discovery.adapter.source_identity();
        let Some(contract) = discovery.api_version.contract() else {
            return Ok(vec![LintItem::plugin(
                Severity::Warn,
                REGISTRATION_RULE,
                class,
                "plugin API version unknown; registration not checked",
            )
            .on(plugin_key)]);
        };
        let search = Self::find_registration(project_root, contract);
        let Some(path) = search.found else {
            let err = LintError::MissingServiceRegistration {
                plugin: plugin_key.to_string(),
                class: class.to_string(),
                contract: contract.to_string(),
                searched: search.searched,
            };
            error!(plugin = %plugin_key, error = %err, "service registration missing");
            return Err(err);
        };
        let file = pathdiff::diff_paths(&path, project_root)
            .unwrap_or_else(|| path.clone())
            .to_string_lossy()
            .replace('\\', "/");
        let content = fs::read_to_string(&path).map_err(|e| LintError::io(&path, e))?;
        let listed = parse_service_file(&content).iter().any(|c| c == class);
        let item = if listed {
            LintItem::plugin(
                Severity::Success,
                REGISTRATION_RULE,
                &file,
                format!("{} is registered for {}", class, contract),
            )
        } else {
            LintItem::plugin(
                Severity::Warn,
                REGISTRATION_RULE,
                &file,
                format!("registration file for {} does not list {}", contract, class),
            )
        };
        Ok(vec![item.at(contract).on(plugin_key)])
    }

    /// One ERROR per declared resource that does not exist.
    pub fn reference_items(plugin_key: &str, discovery: &PluginDiscovery) -> Vec<LintItem> {
        let class = discovery.adapter.source_identity();
        let bpmn = discovery.missing_bpmn_refs.iter().map(|r| (r, "process model"));
        let fhir = discovery.missing_fhir_refs.iter().map(|r| (r, "FHIR resource"));
        bpmn.chain(fhir)
            .map(|(r, what)| {
                LintItem::plugin(
                    Severity::Error,
                    MISSING_REFERENCE_RULE,
                    r.as_str(),
                    format!("{} '{}' declared by {} does not exist", what, r, class),
                )
                .at(r.as_str())
                .on(plugin_key)
            })
            .collect()
    }
}

fn is_skipped_name(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && is_skipped_name(&entry.file_name().to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::adapter::{V1_CONTRACT, V2_CONTRACT};
    use crate::plugin::{ApiVersion, PluginAdapter, PluginCapabilities};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, content).unwrap();
    }

    fn discovery(version: ApiVersion, class: &str, root: &Path) -> PluginDiscovery {
        let caps = PluginCapabilities {
            name: "ping".into(),
            ..Default::default()
        };
        PluginDiscovery {
            adapter: PluginAdapter::new(version, class, caps).unwrap(),
            api_version: version,
            bpmn_files: BTreeSet::new(),
            fhir_files: BTreeSet::new(),
            referenced_paths: BTreeSet::new(),
            missing_bpmn_refs: ["bpe/gone.bpmn".to_string()].into_iter().collect(),
            missing_fhir_refs: BTreeSet::new(),
            resources_dir: root.to_path_buf(),
        }
    }

    #[test]
    fn test_standard_location_priority() {
        let dir = tempdir().unwrap();
        let built = format!("target/classes/META-INF/services/{}", V2_CONTRACT);
        let source = format!("src/main/resources/META-INF/services/{}", V2_CONTRACT);
        write(dir.path(), &built, "a.Other\n");
        write(dir.path(), &source, "a.Ping\n");
        let search = PluginValidationService::find_registration(dir.path(), V2_CONTRACT);
        let found = search.found.unwrap();
        assert!(found.starts_with(dir.path().join("src/main/resources")));
        assert_eq!(search.searched, 2);
    }

    #[test]
    fn test_submodule_and_walk_fallback() {
        let dir = tempdir().unwrap();
        let module = format!("plugin-a/src/main/resources/META-INF/services/{}", V1_CONTRACT);
        write(dir.path(), &module, "a.Ping");
        let search = PluginValidationService::find_registration(dir.path(), V1_CONTRACT);
        assert!(search.found.unwrap().starts_with(dir.path().join("plugin-a")));

        let deep = tempdir().unwrap();
        write(deep.path(), &format!("x/y/z/META-INF/services/{}", V1_CONTRACT), "a.Ping");
        write(deep.path(), &format!(".git/META-INF/services/{}", V2_CONTRACT), "a.Ping");
        assert!(PluginValidationService::find_registration(deep.path(), V1_CONTRACT)
            .found
            .is_some());
        assert!(PluginValidationService::find_registration(deep.path(), V2_CONTRACT)
            .found
            .is_none());
    }

    #[test]
    fn test_missing_registration_is_an_error() {
        let dir = tempdir().unwrap();
        let d = discovery(ApiVersion::V2, "a.Ping", dir.path());
        let err = PluginValidationService::validate(dir.path(), "ping", &d).unwrap_err();
        assert!(matches!(err, LintError::MissingServiceRegistration { .. }));
    }

    #[test]
    fn test_registration_listing() {
        let dir = tempdir().unwrap();
        write(dir.path(), &format!("META-INF/services/{}", V2_CONTRACT), "# header\na.Ping\n");
        let ping = discovery(ApiVersion::V2, "a.Ping", dir.path());
        let ok = PluginValidationService::validate(dir.path(), "ping", &ping).unwrap();
        assert_eq!(ok[0].severity, Severity::Success);
        assert_eq!(ok[0].file, format!("META-INF/services/{}", V2_CONTRACT));
        let pong = discovery(ApiVersion::V2, "a.Pong", dir.path());
        let other = PluginValidationService::validate(dir.path(), "pong", &pong).unwrap();
        assert_eq!(other[0].severity, Severity::Warn);
    }

    #[test]
    fn test_reference_items() {
        let dir = tempdir().unwrap();
        let ping = discovery(ApiVersion::V1, "a.Ping", dir.path());
        let items = PluginValidationService::reference_items("ping", &ping);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].rule, MISSING_REFERENCE_RULE);
        assert_eq!(items[0].severity, Severity::Error);
    }
}
