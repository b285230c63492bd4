//! Correlate each discovered plugin definition with the files on disk.

use crate::models::discovery::{is_bpmn_path, DiscoveryResult, PluginDiscovery};
use crate::plugin::{PluginAdapter, PluginDefinitionDiscovery};
use crate::project::ProjectContext;
use crate::resource::{normalize_reference, FileSystemResources, ResourceProvider};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub const BPMN_DIR: &str = "bpe";
pub const FHIR_DIR: &str = "fhir";

pub struct ResourceDiscoveryService;

impl ResourceDiscoveryService {
    /// Discover plugin definitions on the project classpath and resolve
    /// their declared resources against the project's resources directory.
    pub fn discover(ctx: &ProjectContext) -> DiscoveryResult {
        let adapters = PluginDefinitionDiscovery::new(&ctx.classpath).discover();
        let provider = FileSystemResources::new(&ctx.resources_dir);
        Self::correlate_all(adapters, &provider)
    }

    pub fn correlate_all(
        adapters: Vec<PluginAdapter>,
        provider: &dyn ResourceProvider,
    ) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();
        for adapter in adapters {
            let key = sanitize_plugin_key(adapter.name());
            let discovery = Self::correlate(adapter, provider);
            let key = result.insert_unique(key, discovery);
            if let Some(d) = result.plugins.get(&key) {
                info!(
                    plugin = %key,
                    api = %d.api_version,
                    bpmn = d.bpmn_files.len(),
                    fhir = d.fhir_files.len(),
                    missing = d.missing_count(),
                    "plugin resources resolved"
                );
            }
        }
        result
    }

    /// Resolve one adapter's declarations.
    ///
    /// Process models are BPMN references; FHIR map values are resource
    /// references. Every declared path lands in `referenced_paths`; the
    /// ones without a file are split into the missing sets by extension.
    pub fn correlate(adapter: PluginAdapter, provider: &dyn ResourceProvider) -> PluginDiscovery {
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for model in adapter.process_model_ids() {
            referenced.insert(bpmn_reference(model));
        }
        for resources in adapter.fhir_resources_by_process_id().values() {
            for r in resources {
                let r = normalize_reference(r);
                if !r.is_empty() {
                    referenced.insert(r);
                }
            }
        }

        let mut bpmn_files = BTreeSet::new();
        let mut fhir_files = BTreeSet::new();
        let mut missing_bpmn_refs = BTreeSet::new();
        let mut missing_fhir_refs = BTreeSet::new();
        for r in &referenced {
            let exists = provider.exists(r);
            match (is_bpmn_path(r), exists) {
                (true, true) => {
                    bpmn_files.insert(provider.resolve(r));
                }
                (false, true) => {
                    fhir_files.insert(provider.resolve(r));
                }
                (true, false) => {
                    missing_bpmn_refs.insert(r.clone());
                }
                (false, false) => {
                    missing_fhir_refs.insert(r.clone());
                }
            }
        }
        if !missing_bpmn_refs.is_empty() || !missing_fhir_refs.is_empty() {
            warn!(
                plugin = %adapter.name(),
                bpmn = ?missing_bpmn_refs,
                fhir = ?missing_fhir_refs,
                "declared resources not found"
            );
        }
        debug!(plugin = %adapter.name(), referenced = referenced.len(), "references resolved");

        PluginDiscovery {
            api_version: adapter.api_version(),
            adapter,
            bpmn_files,
            fhir_files,
            referenced_paths: referenced,
            missing_bpmn_refs,
            missing_fhir_refs,
            resources_dir: provider.root().to_path_buf(),
        }
    }
}

/// Process-model ids name BPMN files; an id without the extension gets it.
fn bpmn_reference(model: &str) -> String {
    let r = normalize_reference(model);
    if is_bpmn_path(&r) {
        r
    } else {
        format!("{}.bpmn", r)
    }
}

/// Report key for a plugin name: lowercase, every character outside
/// `[a-z0-9]` replaced by `_`, `plugin` when nothing remains.
pub fn sanitize_plugin_key(name: &str) -> String {
    let key: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();
    if key.is_empty() {
        "plugin".to_string()
    } else {
        key
    }
}
