//! Report files written after linting.
//!
//! Layout under the report root:
//!
//! ```text
//! <root>/aggregated.json
//! <root>/report.html            (html only)
//! <root>/<plugin_key>/<plugin_key>.json
//! <root>/<plugin_key>/<plugin_key>.html   (html only)
//! ```
//!
//! The JSON documents are composed by pure functions so they can be tested
//! without touching the file system. The HTML pages render those same
//! documents through handlebars templates, which escape every value.

use crate::error::{LintError, Result};
use crate::models::discovery::{DiscoveryResult, LeftoverAnalysisResult, PluginDiscovery};
use crate::models::result::{OverallResult, PluginResult};
use crate::models::{LintItem, Summary};
use handlebars::Handlebars;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MASTER_JSON: &str = "aggregated.json";
pub const MASTER_HTML: &str = "report.html";
pub const DEFAULT_REPORT_DIR: &str = "report";

const PLUGIN_TEMPLATE: &str = "plugin";
const MASTER_TEMPLATE: &str = "master";

/// Handlebars registry holding the report pages and their partials.
fn templates() -> Result<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    hb.register_partial("style", include_str!("../templates/style.css.hbs"))?;
    hb.register_partial("summary", include_str!("../templates/summary.html.hbs"))?;
    hb.register_template_string(PLUGIN_TEMPLATE, include_str!("../templates/plugin.html.hbs"))?;
    hb.register_template_string(MASTER_TEMPLATE, include_str!("../templates/master.html.hbs"))?;
    Ok(hb)
}

pub struct ReportGenerator {
    root: PathBuf,
    html: bool,
    templates: Handlebars<'static>,
}

impl ReportGenerator {
    pub fn new(root: impl Into<PathBuf>, html: bool) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            html,
            templates: templates()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugin_dir(&self, plugin_key: &str) -> PathBuf {
        self.root.join(plugin_key)
    }

    /// Write `<key>/<key>.json` (and `.html`). Returns the JSON path.
    pub fn write_plugin_report(
        &self,
        plugin_key: &str,
        result: &PluginResult,
        discovery: &PluginDiscovery,
    ) -> Result<PathBuf> {
        let dir = self.plugin_dir(plugin_key);
        fs::create_dir_all(&dir).map_err(|e| LintError::io(&dir, e))?;
        let json_path = dir.join(format!("{}.json", plugin_key));
        let doc = compose_plugin_json(result, discovery);
        write_json(&json_path, &doc)?;
        if self.html {
            let html_path = dir.join(format!("{}.html", plugin_key));
            write_text(&html_path, &self.render_html(PLUGIN_TEMPLATE, &doc)?)?;
        }
        debug!(plugin = %plugin_key, path = %json_path.display(), "plugin report written");
        Ok(json_path)
    }

    /// Write `aggregated.json` (and `report.html`). Returns the JSON path.
    pub fn write_master_report(
        &self,
        overall: &OverallResult,
        discovery: &DiscoveryResult,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|e| LintError::io(&self.root, e))?;
        let json_path = self.root.join(MASTER_JSON);
        let doc = compose_master_json(overall, discovery);
        write_json(&json_path, &doc)?;
        if self.html {
            let html = self.render_html(MASTER_TEMPLATE, &doc)?;
            write_text(&self.root.join(MASTER_HTML), &html)?;
        }
        info!(path = %json_path.display(), "master report written");
        Ok(json_path)
    }

    /// Render a composed report document as an HTML page.
    pub fn render_html(&self, template: &str, doc: &JsonVal) -> Result<String> {
        Ok(self.templates.render(template, doc)?)
    }
}

fn write_json(path: &Path, value: &JsonVal) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    write_text(path, &text)
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).map_err(|e| LintError::io(path, e))
}

fn item_json(it: &LintItem) -> JsonVal {
    json!({
        "severity": it.severity,
        "kind": it.kind,
        "rule": it.rule,
        "file": it.file,
        "location": it.location,
        "subject": it.subject,
        "description": it.description,
    })
}

fn summary_json(s: &Summary) -> JsonVal {
    json!({
        "errors": s.errors,
        "warnings": s.warnings,
        "infos": s.infos,
        "successes": s.successes,
        "leftovers": s.leftovers,
    })
}

fn leftovers_json(l: &LeftoverAnalysisResult) -> JsonVal {
    json!({
        "bpmn": l.leftover_bpmn_paths,
        "fhir": l.leftover_fhir_paths,
        "count": l.count(),
    })
}

pub fn compose_plugin_json(result: &PluginResult, discovery: &PluginDiscovery) -> JsonVal {
    let files = |set: &std::collections::BTreeSet<PathBuf>| -> Vec<String> {
        set.iter()
            .map(|p| {
                pathdiff::diff_paths(p, &discovery.resources_dir)
                    .unwrap_or_else(|| p.clone())
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    };
    json!({
        "plugin": result.plugin_name,
        "class": result.plugin_class_name,
        "apiVersion": result.api_version.to_string(),
        "resources": {
            "bpmn": files(&discovery.bpmn_files),
            "fhir": files(&discovery.fhir_files),
            "missingBpmn": discovery.missing_bpmn_refs,
            "missingFhir": discovery.missing_fhir_refs,
        },
        "items": result.items.iter().map(item_json).collect::<Vec<_>>(),
        "summary": summary_json(&result.summary),
    })
}

pub fn compose_master_json(overall: &OverallResult, discovery: &DiscoveryResult) -> JsonVal {
    let plugins: Vec<JsonVal> = overall
        .plugin_results
        .iter()
        .map(|(key, r)| {
            let class = discovery
                .plugins
                .get(key)
                .map(|d| d.adapter.source_identity().to_string())
                .unwrap_or_else(|| r.plugin_class_name.clone());
            json!({
                "plugin": key,
                "class": class,
                "apiVersion": r.api_version.to_string(),
                "report": r.report_path.as_ref().map(|p| p.display().to_string()),
                "summary": summary_json(&r.summary),
            })
        })
        .collect();
    json!({
        "success": overall.success,
        "executionTimeMs": overall.execution_time_ms as u64,
        "pluginCount": overall.plugin_count(),
        "totalErrors": overall.total_errors,
        "summary": summary_json(&overall.summary),
        "leftovers": leftovers_json(&overall.leftover_analysis),
        "plugins": plugins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Severity, LEFTOVER_RULE};
    use crate::plugin::{ApiVersion, PluginAdapter, PluginCapabilities};
    use indexmap::IndexMap;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn discovery(root: &Path) -> PluginDiscovery {
        let caps = PluginCapabilities {
            name: "ping".into(),
            ..Default::default()
        };
        PluginDiscovery {
            adapter: PluginAdapter::new(ApiVersion::V2, "org.example.Ping", caps).unwrap(),
            api_version: ApiVersion::V2,
            bpmn_files: [root.join("bpe/ping.bpmn")].into_iter().collect(),
            fhir_files: BTreeSet::new(),
            referenced_paths: BTreeSet::new(),
            missing_bpmn_refs: BTreeSet::new(),
            missing_fhir_refs: ["fhir/Task/gone.xml".to_string()].into_iter().collect(),
            resources_dir: root.to_path_buf(),
        }
    }

    fn result() -> PluginResult {
        PluginResult::new(
            "ping",
            "org.example.Ping",
            ApiVersion::V2,
            vec![
                LintItem::bpmn(Severity::Error, "bpmn-x", "bpe/ping.bpmn", "a < b"),
                LintItem::fhir(Severity::Warn, LEFTOVER_RULE, "fhir/old.xml", "unused"),
            ],
        )
    }

    #[test]
    fn test_plugin_json_shape() {
        let dir = tempdir().unwrap();
        let v = compose_plugin_json(&result(), &discovery(dir.path()));
        assert_eq!(v["plugin"], "ping");
        assert_eq!(v["apiVersion"], "v2");
        assert_eq!(v["resources"]["bpmn"][0], "bpe/ping.bpmn");
        assert_eq!(v["resources"]["missingFhir"][0], "fhir/Task/gone.xml");
        assert_eq!(v["items"][0]["severity"], "ERROR");
        assert_eq!(v["summary"]["errors"], 1);
        assert_eq!(v["summary"]["leftovers"], 1);
    }

    #[test]
    fn test_writes_plugin_and_master_reports() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let reports = ReportGenerator::new(&out, true).unwrap();
        let d = discovery(dir.path());
        let path = reports.write_plugin_report("ping", &result(), &d).unwrap();
        assert_eq!(path, out.join("ping/ping.json"));
        let html = fs::read_to_string(out.join("ping/ping.html")).unwrap();
        assert!(html.contains("a &lt; b"));
        assert!(html.contains("<td class=\"ERROR\">ERROR</td>"));
        assert!(html.contains("<li>fhir/Task/gone.xml</li>"));

        let mut discovery_result = DiscoveryResult::default();
        discovery_result.plugins.insert("ping".into(), d);
        let mut map = IndexMap::new();
        map.insert("ping".to_string(), result().with_report_path(path));
        let overall = OverallResult::aggregate(map, Default::default(), true, 12);
        let master = reports.write_master_report(&overall, &discovery_result).unwrap();
        let v: JsonVal = serde_json::from_str(&fs::read_to_string(&master).unwrap()).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["pluginCount"], 1);
        assert_eq!(v["plugins"][0]["class"], "org.example.Ping");
        let page = fs::read_to_string(out.join(MASTER_HTML)).unwrap();
        assert!(page.contains("<p class=\"ERROR\">ERROR</p>"));
        assert!(page.contains("<a href=\"ping/ping.html\">details</a>"));
    }

    #[test]
    fn test_html_disabled_writes_json_only() {
        let dir = tempdir().unwrap();
        let reports = ReportGenerator::new(dir.path(), false).unwrap();
        reports.write_plugin_report("ping", &result(), &discovery(dir.path()))
            .unwrap();
        assert!(dir.path().join("ping/ping.json").is_file());
        assert!(!dir.path().join("ping/ping.html").exists());
    }

    #[test]
    fn test_html_escapes_item_text_and_lists_leftovers() {
        let dir = tempdir().unwrap();
        let reports = ReportGenerator::new(dir.path(), true).unwrap();
        let mut r = result();
        r.plugin_name = "<script>".into();
        r.items[0].description = "bad \"quote\" & <tag>".into();
        let page = reports
            .render_html(PLUGIN_TEMPLATE, &compose_plugin_json(&r, &discovery(dir.path())))
            .unwrap();
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("bad &quot;quote&quot; &amp; &lt;tag&gt;"));

        let mut leftovers = LeftoverAnalysisResult::default();
        leftovers.leftover_bpmn_paths.insert("bpe/old.bpmn".into());
        let mut map = IndexMap::new();
        map.insert("ping".to_string(), result());
        let overall = OverallResult::aggregate(map, leftovers, false, 3);
        let doc = compose_master_json(&overall, &DiscoveryResult::default());
        let master = reports.render_html(MASTER_TEMPLATE, &doc).unwrap();
        assert!(master.contains("<h2>Unreferenced resources</h2>"));
        assert!(master.contains("<li>bpe/old.bpmn</li>"));
        assert!(master.contains("<p class=\"SUCCESS\">SUCCESS</p>"));
    }
}
