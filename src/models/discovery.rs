//! Discovery aggregates: per-plugin resource correlation and leftovers.

use crate::plugin::adapter::{ApiVersion, PluginAdapter};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

/// True when a normalized resource reference names a BPMN file.
pub fn is_bpmn_path(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".bpmn")
}

/// True when a normalized resource reference names a FHIR resource file.
pub fn is_fhir_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".json")
}

#[derive(Debug, Clone)]
/// Resources one plugin declares, correlated against the file system.
pub struct PluginDiscovery {
    pub adapter: PluginAdapter,
    pub api_version: ApiVersion,
    /// Referenced `.bpmn` files that exist on disk.
    pub bpmn_files: BTreeSet<PathBuf>,
    /// Referenced FHIR files that exist on disk.
    pub fhir_files: BTreeSet<PathBuf>,
    /// Every path the declared resources resolve to, existing or not.
    pub referenced_paths: BTreeSet<String>,
    pub missing_bpmn_refs: BTreeSet<String>,
    pub missing_fhir_refs: BTreeSet<String>,
    pub resources_dir: PathBuf,
}

impl PluginDiscovery {
    pub fn referenced_bpmn(&self) -> impl Iterator<Item = &String> {
        self.referenced_paths.iter().filter(|p| is_bpmn_path(p))
    }

    pub fn referenced_fhir(&self) -> impl Iterator<Item = &String> {
        self.referenced_paths.iter().filter(|p| !is_bpmn_path(p))
    }

    pub fn missing_count(&self) -> usize {
        self.missing_bpmn_refs.len() + self.missing_fhir_refs.len()
    }
}

#[derive(Debug, Clone, Default)]
/// All plugins found in one run, keyed by report key in discovery order.
pub struct DiscoveryResult {
    pub plugins: IndexMap<String, PluginDiscovery>,
}

impl DiscoveryResult {
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Insert under `key`, appending `_2`, `_3`, ... when the key is taken.
    ///
    /// Returns the key actually used. Never overwrites an existing plugin.
    pub fn insert_unique(&mut self, key: String, discovery: PluginDiscovery) -> String {
        let mut candidate = key.clone();
        let mut n = 2usize;
        while self.plugins.contains_key(&candidate) {
            candidate = format!("{}_{}", key, n);
            n += 1;
        }
        if candidate != key {
            warn!(
                plugin = %discovery.adapter.name(),
                class = %discovery.adapter.source_identity(),
                key = %candidate,
                "plugin key '{}' already in use; disambiguated",
                key
            );
        }
        self.plugins.insert(candidate.clone(), discovery);
        candidate
    }

    /// Union of referenced BPMN paths across all plugins.
    pub fn all_referenced_bpmn(&self) -> BTreeSet<String> {
        self.plugins
            .values()
            .flat_map(|p| p.referenced_bpmn().cloned())
            .collect()
    }

    /// Union of referenced FHIR paths across all plugins.
    pub fn all_referenced_fhir(&self) -> BTreeSet<String> {
        self.plugins
            .values()
            .flat_map(|p| p.referenced_fhir().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Files on disk that no plugin references. Computed once per run.
pub struct LeftoverAnalysisResult {
    pub leftover_bpmn_paths: BTreeSet<String>,
    pub leftover_fhir_paths: BTreeSet<String>,
}

impl LeftoverAnalysisResult {
    pub fn count(&self) -> usize {
        self.leftover_bpmn_paths.len() + self.leftover_fhir_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}
