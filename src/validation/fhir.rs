//! FHIR resource validation.
//!
//! XML and JSON resources share one rule set: JSON input is converted to
//! the equivalent FHIR XML document first.

use super::{validate_files, ValidationContext};
use crate::models::{LintItem, Severity, UNPARSABLE_RULE};
use regex::Regex;
use roxmltree::{Document, Node};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

pub const FHIR_NS: &str = "http://hl7.org/fhir";
pub const READ_ACCESS_TAG_SYSTEM: &str = "http://dsf.dev/fhir/CodeSystem/read-access-tag";
pub const BPMN_MESSAGE_SYSTEM: &str = "http://dsf.dev/fhir/CodeSystem/bpmn-message";

/// Placeholders the DSF replaces when a plugin is deployed.
pub const KNOWN_PLACEHOLDERS: [&str; 3] = ["version", "date", "organization"];

/// Resource types DSF plugins ship.
pub const PLUGIN_RESOURCE_TYPES: [&str; 10] = [
    "ActivityDefinition",
    "CodeSystem",
    "Library",
    "Measure",
    "NamingSystem",
    "Questionnaire",
    "StructureDefinition",
    "Subscription",
    "Task",
    "ValueSet",
];

/// A stateless check over one FHIR resource document.
pub trait FhirRule: Send + Sync {
    fn id(&self) -> &'static str;
    fn evaluate(&self, doc: &Document, file: &str, ctx: &ValidationContext) -> Vec<LintItem>;
}

pub struct FhirValidationService {
    rules: Vec<Box<dyn FhirRule>>,
}

impl Default for FhirValidationService {
    fn default() -> Self {
        Self::new(builtin_rules())
    }
}

impl FhirValidationService {
    pub fn new(rules: Vec<Box<dyn FhirRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    pub fn validate(&self, files: &BTreeSet<PathBuf>, ctx: &ValidationContext) -> Vec<LintItem> {
        validate_files(files, |path| self.validate_file(path, ctx))
    }

    pub fn validate_file(&self, path: &Path, ctx: &ValidationContext) -> Vec<LintItem> {
        let label = ctx.display_path(path);
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => return vec![unparsable(&label, &e.to_string())],
        };
        let is_json = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let xml = if is_json {
            match json_to_xml(&text) {
                Ok(x) => x,
                Err(e) => return vec![unparsable(&label, &e)],
            }
        } else {
            text
        };
        let doc = match Document::parse(&xml) {
            Ok(d) => d,
            Err(e) => return vec![unparsable(&label, &e.to_string())],
        };
        debug!(file = %label, json = is_json, "validating FHIR resource");
        self.rules
            .iter()
            .flat_map(|r| r.evaluate(&doc, &label, ctx))
            .collect()
    }
}

fn unparsable(file: &str, reason: &str) -> LintItem {
    LintItem::fhir(
        Severity::Error,
        UNPARSABLE_RULE,
        file,
        format!("FHIR resource could not be parsed: {}", reason),
    )
}

pub fn builtin_rules() -> Vec<Box<dyn FhirRule>> {
    vec![
        Box::new(ResourceTypeRule),
        Box::new(MetadataRule),
        Box::new(ReadAccessTagRule),
        Box::new(PlaceholderRule),
        Box::new(TaskRule),
    ]
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn children<'a, 'i>(node: Node<'a, 'i>, name: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// `value` attribute of the element at `path` below `node`.
fn value_at<'a>(node: Node<'a, '_>, path: &[&str]) -> Option<&'a str> {
    let mut cur = node;
    for p in path {
        cur = child(cur, p)?;
    }
    cur.attribute("value")
}

/// Resource id for findings: `id`, else `url`, else the resource type.
fn resource_subject(root: Node) -> String {
    value_at(root, &["id"])
        .or_else(|| value_at(root, &["url"]))
        .unwrap_or(root.tag_name().name())
        .to_string()
}

fn finding(
    severity: Severity,
    rule: &str,
    file: &str,
    root: Node,
    location: &str,
    msg: impl Into<String>,
) -> LintItem {
    LintItem::fhir(severity, rule, file, msg)
        .at(location)
        .on(resource_subject(root))
}

/// Root element is a FHIR resource of a type plugins ship.
pub struct ResourceTypeRule;

impl FhirRule for ResourceTypeRule {
    fn id(&self) -> &'static str {
        "fhir-resource-type"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let root = doc.root_element();
        let name = root.tag_name().name();
        let item = if root.tag_name().namespace() != Some(FHIR_NS) {
            finding(
                Severity::Error,
                self.id(),
                file,
                root,
                name,
                format!("root element '{}' is not in the FHIR namespace", name),
            )
        } else if !PLUGIN_RESOURCE_TYPES.contains(&name) {
            finding(
                Severity::Warn,
                self.id(),
                file,
                root,
                name,
                format!("unexpected resource type '{}' for a process plugin", name),
            )
        } else {
            finding(Severity::Success, self.id(), file, root, name, format!("{} resource", name))
        };
        vec![item]
    }
}

/// Canonical metadata uses the deployment placeholders.
pub struct MetadataRule;

impl FhirRule for MetadataRule {
    fn id(&self) -> &'static str {
        "fhir-metadata"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let root = doc.root_element();
        let kind = root.tag_name().name();
        if kind == "Task" || !PLUGIN_RESOURCE_TYPES.contains(&kind) {
            return Vec::new();
        }
        let mut out = Vec::new();
        // R4 NamingSystem has neither url nor version
        if kind != "NamingSystem" {
            if value_at(root, &["url"]).map_or(true, |u| u.trim().is_empty()) {
                out.push(finding(Severity::Error, self.id(), file, root, "url", "url is missing"));
            }
            let version = value_at(root, &["version"]);
            if version != Some("#{version}") {
                out.push(finding(
                    Severity::Error,
                    self.id(),
                    file,
                    root,
                    "version",
                    format!("version must be '#{{version}}', found '{}'", version.unwrap_or("")),
                ));
            }
        }
        let date = value_at(root, &["date"]);
        if date != Some("#{date}") {
            out.push(finding(
                Severity::Error,
                self.id(),
                file,
                root,
                "date",
                format!("date must be '#{{date}}', found '{}'", date.unwrap_or("")),
            ));
        }
        let status = value_at(root, &["status"]);
        if status != Some("unknown") {
            out.push(finding(
                Severity::Error,
                self.id(),
                file,
                root,
                "status",
                format!("status must be 'unknown', found '{}'", status.unwrap_or("")),
            ));
        }
        if out.is_empty() {
            out.push(finding(Severity::Success, self.id(), file, root, kind, "metadata is valid"));
        }
        out
    }
}

/// `meta.tag` carries a DSF read-access tag.
pub struct ReadAccessTagRule;

impl FhirRule for ReadAccessTagRule {
    fn id(&self) -> &'static str {
        "fhir-read-access-tag"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let root = doc.root_element();
        let codes: Vec<&str> = child(root, "meta")
            .into_iter()
            .flat_map(|m| children(m, "tag"))
            .filter(|t| value_at(*t, &["system"]) == Some(READ_ACCESS_TAG_SYSTEM))
            .filter_map(|t| value_at(t, &["code"]))
            .collect();
        if codes.is_empty() {
            return vec![finding(
                Severity::Error,
                self.id(),
                file,
                root,
                "meta.tag",
                "read-access tag is missing",
            )];
        }
        codes
            .into_iter()
            .map(|code| match code {
                "ALL" | "LOCAL" | "ORGANIZATION" | "ROLE" => finding(
                    Severity::Success,
                    self.id(),
                    file,
                    root,
                    "meta.tag",
                    format!("read-access tag {}", code),
                ),
                other => finding(
                    Severity::Error,
                    self.id(),
                    file,
                    root,
                    "meta.tag",
                    format!("unknown read-access tag code '{}'", other),
                ),
            })
            .collect()
    }
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\{([^}]*)\}").ok()).as_ref()
}

/// Every `#{...}` token names a placeholder the DSF substitutes.
pub struct PlaceholderRule;

impl FhirRule for PlaceholderRule {
    fn id(&self) -> &'static str {
        "fhir-placeholder"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let Some(re) = placeholder_pattern() else {
            return Vec::new();
        };
        let root = doc.root_element();
        let mut out = Vec::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            let Some(value) = node.attribute("value") else {
                continue;
            };
            for cap in re.captures_iter(value) {
                let name = cap.get(1).map_or("", |m| m.as_str());
                if !KNOWN_PLACEHOLDERS.contains(&name) {
                    out.push(finding(
                        Severity::Warn,
                        self.id(),
                        file,
                        root,
                        node.tag_name().name(),
                        format!("unknown placeholder '#{{{}}}'", name),
                    ));
                }
            }
        }
        out
    }
}

/// Draft Task resources used as process start templates.
pub struct TaskRule;

impl TaskRule {
    fn input_code<'a>(input: Node<'a, '_>) -> Option<&'a str> {
        let coding = child(child(input, "type")?, "coding")?;
        if value_at(coding, &["system"]) != Some(BPMN_MESSAGE_SYSTEM) {
            return None;
        }
        value_at(coding, &["code"])
    }
}

impl FhirRule for TaskRule {
    fn id(&self) -> &'static str {
        "fhir-task"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let root = doc.root_element();
        if root.tag_name().name() != "Task" {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut err = |location: &str, msg: String| {
            out.push(finding(Severity::Error, self.id(), file, root, location, msg));
        };
        if value_at(root, &["meta", "profile"]).map_or(true, |p| p.trim().is_empty()) {
            err("meta.profile", "Task has no meta.profile".into());
        }
        match value_at(root, &["instantiatesCanonical"]) {
            Some(c) if c.ends_with("|#{version}") => {}
            other => err(
                "instantiatesCanonical",
                format!(
                    "instantiatesCanonical must end with '|#{{version}}', found '{}'",
                    other.unwrap_or("")
                ),
            ),
        }
        let status = value_at(root, &["status"]);
        if status != Some("draft") {
            err("status", format!("status must be 'draft', found '{}'", status.unwrap_or("")));
        }
        let requester = value_at(root, &["requester", "identifier", "value"]);
        if requester != Some("#{organization}") {
            err(
                "requester",
                format!(
                    "requester identifier must be '#{{organization}}', found '{}'",
                    requester.unwrap_or("")
                ),
            );
        }

        let inputs: Vec<Node> = children(root, "input").collect();
        let count = |code: &str| {
            inputs
                .iter()
                .filter(|i| Self::input_code(**i) == Some(code))
                .count()
        };
        match count("message-name") {
            1 => {
                let has_value = inputs
                    .iter()
                    .filter(|i| Self::input_code(**i) == Some("message-name"))
                    .any(|i| value_at(*i, &["valueString"]).is_some_and(|v| !v.trim().is_empty()));
                if !has_value {
                    err("input.message-name", "message-name input has no valueString".into());
                }
            }
            n => err(
                "input.message-name",
                format!("expected exactly one message-name input, found {}", n),
            ),
        }
        for code in ["business-key", "correlation-key"] {
            let n = count(code);
            if n > 1 {
                err(
                    &format!("input.{}", code),
                    format!("at most one {} input allowed, found {}", code, n),
                );
            }
        }
        if out.is_empty() {
            out.push(finding(Severity::Success, self.id(), file, root, "Task", "Task is valid"));
        }
        out
    }
}

/// Convert a FHIR JSON resource to its XML representation.
///
/// Primitives become `<name value=".."/>`, arrays repeat the element,
/// nested resources (`contained`, `resource`) are wrapped in their type
/// element, and element `id`/extension `url` become attributes.
/// `_name` primitive extensions are dropped.
pub fn json_to_xml(text: &str) -> Result<String, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let obj = value
        .as_object()
        .ok_or_else(|| "root is not a JSON object".to_string())?;
    let resource_type = obj
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| "resourceType is missing".to_string())?;
    let mut out = String::new();
    write_resource(&mut out, resource_type, obj, true);
    Ok(out)
}

fn write_resource(out: &mut String, resource_type: &str, obj: &Map<String, Value>, root: bool) {
    out.push('<');
    out.push_str(resource_type);
    if root {
        out.push_str(" xmlns=\"");
        out.push_str(FHIR_NS);
        out.push('"');
    }
    out.push('>');
    for (k, v) in obj {
        if k == "resourceType" || k.starts_with('_') {
            continue;
        }
        write_element(out, k, v);
    }
    out.push_str("</");
    out.push_str(resource_type);
    out.push('>');
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for it in items {
                write_element(out, name, it);
            }
        }
        Value::Object(obj) => {
            if let Some(rt) = obj.get("resourceType").and_then(Value::as_str) {
                out.push_str(&format!("<{}>", name));
                write_resource(out, rt, obj, false);
                out.push_str(&format!("</{}>", name));
                return;
            }
            out.push('<');
            out.push_str(name);
            let is_extension = name == "extension" || name == "modifierExtension";
            for attr in ["id", "url"] {
                if attr == "url" && !is_extension {
                    continue;
                }
                if let Some(v) = obj.get(attr).and_then(Value::as_str) {
                    out.push_str(&format!(" {}=\"{}\"", attr, escape(v)));
                }
            }
            out.push('>');
            for (k, v) in obj {
                let as_attr = k == "id" || (k == "url" && is_extension);
                if as_attr || k.starts_with('_') {
                    continue;
                }
                write_element(out, k, v);
            }
            out.push_str(&format!("</{}>", name));
        }
        Value::String(s) => out.push_str(&format!("<{} value=\"{}\"/>", name, escape(s))),
        Value::Number(n) => out.push_str(&format!("<{} value=\"{}\"/>", name, n)),
        Value::Bool(b) => out.push_str(&format!("<{} value=\"{}\"/>", name, b)),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
