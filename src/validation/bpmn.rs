//! BPMN validation over Camunda-flavoured BPMN 2.0 process models.

use super::{validate_files, ValidationContext};
use crate::classpath::Assignability;
use crate::models::{LintItem, Severity, UNPARSABLE_RULE};
use crate::plugin::ApiVersion;
use regex::Regex;
use roxmltree::{Document, Node};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

pub const BPMN_NS: &str = "http://www.omg.org/spec/BPMN/20100524/MODEL";
pub const CAMUNDA_NS: &str = "http://camunda.org/schema/1.0/bpmn";

/// A stateless check over one parsed BPMN document.
pub trait BpmnRule: Send + Sync {
    fn id(&self) -> &'static str;
    fn evaluate(&self, doc: &Document, file: &str, ctx: &ValidationContext) -> Vec<LintItem>;
}

pub struct BpmnValidationService {
    rules: Vec<Box<dyn BpmnRule>>,
}

impl Default for BpmnValidationService {
    fn default() -> Self {
        Self::new(builtin_rules())
    }
}

impl BpmnValidationService {
    pub fn new(rules: Vec<Box<dyn BpmnRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Validate every file; unreadable or malformed files yield a single
    /// ERROR item each and do not stop the others.
    pub fn validate(&self, files: &BTreeSet<PathBuf>, ctx: &ValidationContext) -> Vec<LintItem> {
        validate_files(files, |path| self.validate_file(path, ctx))
    }

    pub fn validate_file(&self, path: &Path, ctx: &ValidationContext) -> Vec<LintItem> {
        let label = ctx.display_path(path);
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => return vec![unparsable(&label, &e.to_string())],
        };
        let doc = match Document::parse(&text) {
            Ok(d) => d,
            Err(e) => return vec![unparsable(&label, &e.to_string())],
        };
        debug!(file = %label, "validating BPMN");
        self.rules
            .iter()
            .flat_map(|r| r.evaluate(&doc, &label, ctx))
            .collect()
    }
}

fn unparsable(file: &str, reason: &str) -> LintItem {
    LintItem::bpmn(
        Severity::Error,
        UNPARSABLE_RULE,
        file,
        format!("BPMN file could not be parsed: {}", reason),
    )
}

pub fn builtin_rules() -> Vec<Box<dyn BpmnRule>> {
    vec![
        Box::new(ProcessDefinitionRule),
        Box::new(ServiceTaskImplementationRule),
        Box::new(ClassReferenceRule),
        Box::new(MessageNameRule),
        Box::new(TimerDefinitionRule),
    ]
}

fn is_bpmn(node: &Node, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(BPMN_NS)
}

fn camunda_attr<'a>(node: &Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attribute((CAMUNDA_NS, name))
}

fn element_id(node: &Node) -> String {
    node.attribute("id").unwrap_or("").to_string()
}

/// Id of the enclosing `process` element, or empty.
fn process_id(node: &Node) -> String {
    node.ancestors()
        .find(|n| is_bpmn(n, "process"))
        .and_then(|n| n.attribute("id"))
        .unwrap_or("")
        .to_string()
}

fn item(
    severity: Severity,
    rule: &str,
    file: &str,
    node: &Node,
    msg: impl Into<String>,
) -> LintItem {
    LintItem::bpmn(severity, rule, file, msg)
        .at(element_id(node))
        .on(process_id(node))
}

fn has_message_definition(node: &Node) -> bool {
    node.children().any(|c| is_bpmn(&c, "messageEventDefinition"))
}

fn is_valid_process_id(id: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9-]+_[a-zA-Z0-9-]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(id))
}

/// Process id `domain_name`, executable, and `#{version}` version tag.
pub struct ProcessDefinitionRule;

impl BpmnRule for ProcessDefinitionRule {
    fn id(&self) -> &'static str {
        "bpmn-process-definition"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let processes: Vec<Node> = doc.descendants().filter(|n| is_bpmn(n, "process")).collect();
        if processes.is_empty() {
            return vec![LintItem::bpmn(
                Severity::Error,
                self.id(),
                file,
                "no process element found",
            )];
        }
        let mut out = Vec::new();
        for p in processes {
            let id = p.attribute("id").unwrap_or("");
            let before = out.len();
            if !is_valid_process_id(id) {
                out.push(
                    LintItem::bpmn(
                        Severity::Error,
                        self.id(),
                        file,
                        format!("process id '{}' does not match 'domain_process'", id),
                    )
                    .at(id)
                    .on(id),
                );
            }
            if p.attribute("isExecutable") != Some("true") {
                out.push(
                    LintItem::bpmn(Severity::Error, self.id(), file, "process is not executable")
                        .at(id)
                        .on(id),
                );
            }
            match camunda_attr(&p, "versionTag") {
                Some("#{version}") => {}
                other => out.push(
                    LintItem::bpmn(
                        Severity::Warn,
                        self.id(),
                        file,
                        format!(
                            "camunda:versionTag should be '#{{version}}', found '{}'",
                            other.unwrap_or("")
                        ),
                    )
                    .at(id)
                    .on(id),
                ),
            }
            if out.len() == before {
                let valid = "process definition is valid";
                out.push(
                    LintItem::bpmn(Severity::Success, self.id(), file, valid)
                        .at(id)
                        .on(id),
                );
            }
        }
        out
    }
}

/// Service and send tasks must name an implementation.
pub struct ServiceTaskImplementationRule;

impl BpmnRule for ServiceTaskImplementationRule {
    fn id(&self) -> &'static str {
        "bpmn-service-task-implementation"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        doc.descendants()
            .filter(|n| is_bpmn(n, "serviceTask") || is_bpmn(n, "sendTask"))
            .filter(|n| {
                ["class", "delegateExpression", "expression"]
                    .iter()
                    .all(|a| camunda_attr(n, a).map_or(true, |v| v.trim().is_empty()))
            })
            .map(|n| {
                item(
                    Severity::Error,
                    self.id(),
                    file,
                    &n,
                    format!("{} has no camunda:class implementation", n.tag_name().name()),
                )
            })
            .collect()
    }
}

/// Where a `camunda:class` appears, which decides its expected base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRole {
    ServiceTask,
    MessageSend,
    ExecutionListener,
    TaskListener,
}

impl ClassRole {
    /// Accepted supertypes for the role under the given API version.
    pub fn base_types(self, version: ApiVersion) -> &'static [&'static str] {
        match (version, self) {
            (ApiVersion::V2, ClassRole::ServiceTask) => &["dev.dsf.bpe.v2.activity.ServiceTask"],
            (ApiVersion::V2, ClassRole::MessageSend) => &[
                "dev.dsf.bpe.v2.activity.MessageSendTask",
                "dev.dsf.bpe.v2.activity.MessageIntermediateThrowEvent",
                "dev.dsf.bpe.v2.activity.MessageEndEvent",
            ],
            (ApiVersion::V2, ClassRole::ExecutionListener) => {
                &["dev.dsf.bpe.v2.activity.ExecutionListener"]
            }
            (ApiVersion::V2, ClassRole::TaskListener) => &[
                "dev.dsf.bpe.v2.activity.UserTaskListener",
                "dev.dsf.bpe.v2.activity.DefaultUserTaskListener",
            ],
            (_, ClassRole::ServiceTask) | (_, ClassRole::MessageSend) => {
                &["org.camunda.bpm.engine.delegate.JavaDelegate"]
            }
            (_, ClassRole::ExecutionListener) => {
                &["org.camunda.bpm.engine.delegate.ExecutionListener"]
            }
            (_, ClassRole::TaskListener) => &["org.camunda.bpm.engine.delegate.TaskListener"],
        }
    }
}

fn class_role(node: &Node) -> Option<(ClassRole, &'static str)> {
    if node.tag_name().namespace() == Some(CAMUNDA_NS) {
        return match node.tag_name().name() {
            "executionListener" => Some((ClassRole::ExecutionListener, "class")),
            "taskListener" => Some((ClassRole::TaskListener, "class")),
            _ => None,
        };
    }
    if is_bpmn(node, "serviceTask") {
        return Some((ClassRole::ServiceTask, "camunda:class"));
    }
    if is_bpmn(node, "sendTask") {
        return Some((ClassRole::MessageSend, "camunda:class"));
    }
    if is_bpmn(node, "messageEventDefinition") {
        return Some((ClassRole::MessageSend, "camunda:class"));
    }
    None
}

/// Referenced classes exist and extend the version-specific base type.
pub struct ClassReferenceRule;

impl BpmnRule for ClassReferenceRule {
    fn id(&self) -> &'static str {
        "bpmn-class-reference"
    }

    fn evaluate(&self, doc: &Document, file: &str, ctx: &ValidationContext) -> Vec<LintItem> {
        let mut out = Vec::new();
        for node in doc.descendants().filter(|n| n.is_element()) {
            let Some((role, attr)) = class_role(&node) else {
                continue;
            };
            let class = if attr == "class" {
                node.attribute("class")
            } else {
                camunda_attr(&node, "class")
            };
            let Some(class) = class.map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            // listeners carry no id; report them at their owning element
            let anchor = if node.attribute("id").is_some() {
                node
            } else {
                node.ancestors()
                    .find(|a| a.attribute("id").is_some())
                    .unwrap_or(node)
            };
            if !ctx.classpath.contains_class(class) {
                out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &anchor,
                    format!("class '{}' not found on the plugin classpath", class),
                ));
                continue;
            }
            let bases = role.base_types(ctx.api_version);
            let verdicts: Vec<Assignability> = bases
                .iter()
                .map(|b| ctx.classpath.is_assignable(class, b))
                .collect();
            let (severity, msg) = if verdicts.contains(&Assignability::Yes) {
                (Severity::Success, format!("class '{}' resolved", class))
            } else if verdicts.contains(&Assignability::Unknown) {
                (
                    Severity::Info,
                    format!(
                        "class '{}' found, but its type hierarchy could not be fully resolved to check against {}",
                        class,
                        bases.join(" / ")
                    ),
                )
            } else {
                (
                    Severity::Error,
                    format!(
                        "class '{}' is not a {} for API {}",
                        class,
                        bases.join(" / "),
                        ctx.api_version
                    ),
                )
            };
            out.push(item(severity, self.id(), file, &anchor, msg));
        }
        out
    }
}

/// Message events reference named messages; send activities inject a
/// `messageName` field.
pub struct MessageNameRule;

impl MessageNameRule {
    fn is_throw(node: &Node) -> bool {
        is_bpmn(node, "sendTask")
            || is_bpmn(node, "intermediateThrowEvent")
            || is_bpmn(node, "endEvent")
    }

    fn injected_field(node: &Node, name: &str) -> Option<String> {
        node.descendants()
            .filter(|f| {
                f.tag_name().namespace() == Some(CAMUNDA_NS) && f.tag_name().name() == "field"
            })
            .find(|f| f.attribute("name") == Some(name))
            .and_then(|f| {
                f.attribute("stringValue").map(str::to_string).or_else(|| {
                    f.children()
                        .find(|c| c.tag_name().name() == "string")
                        .and_then(|c| c.text())
                        .map(|t| t.trim().to_string())
                })
            })
            .filter(|v| !v.is_empty())
    }
}

impl BpmnRule for MessageNameRule {
    fn id(&self) -> &'static str {
        "bpmn-message-name"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let messages: Vec<(String, String)> = doc
            .descendants()
            .filter(|n| is_bpmn(n, "message"))
            .map(|n| {
                (
                    n.attribute("id").unwrap_or("").to_string(),
                    n.attribute("name").unwrap_or("").trim().to_string(),
                )
            })
            .collect();
        let mut out = Vec::new();
        let events = doc.descendants().filter(|n| {
            is_bpmn(n, "receiveTask")
                || is_bpmn(n, "sendTask")
                || (n.is_element() && has_message_definition(n))
        });
        for node in events {
            if Self::is_throw(&node) {
                if Self::injected_field(&node, "messageName").is_none() {
                    out.push(item(
                        Severity::Error,
                        self.id(),
                        file,
                        &node,
                        "message send has no 'messageName' field injection",
                    ));
                }
                continue;
            }
            let message_ref = if is_bpmn(&node, "receiveTask") {
                node.attribute("messageRef")
            } else {
                node.children()
                    .find(|c| is_bpmn(c, "messageEventDefinition"))
                    .and_then(|m| m.attribute("messageRef"))
            };
            let Some(message_ref) = message_ref else {
                out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &node,
                    "message event has no messageRef",
                ));
                continue;
            };
            match messages.iter().find(|(id, _)| id == message_ref) {
                None => out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &node,
                    format!("messageRef '{}' does not name a message element", message_ref),
                )),
                Some((_, name)) if name.is_empty() => out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &node,
                    format!("message '{}' has no name", message_ref),
                )),
                Some(_) => {}
            }
        }
        out
    }
}

/// Timer events carry exactly one non-empty time expression.
pub struct TimerDefinitionRule;

impl BpmnRule for TimerDefinitionRule {
    fn id(&self) -> &'static str {
        "bpmn-timer-definition"
    }

    fn evaluate(&self, doc: &Document, file: &str, _ctx: &ValidationContext) -> Vec<LintItem> {
        let mut out = Vec::new();
        for timer in doc.descendants().filter(|n| is_bpmn(n, "timerEventDefinition")) {
            let event = timer.parent_element().unwrap_or(timer);
            let exprs: Vec<Node> = timer
                .children()
                .filter(|c| {
                    is_bpmn(c, "timeDate") || is_bpmn(c, "timeDuration") || is_bpmn(c, "timeCycle")
                })
                .collect();
            match exprs.as_slice() {
                [] => out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &event,
                    "timer has no timeDate, timeDuration or timeCycle",
                )),
                [one] if one.text().map_or(true, |t| t.trim().is_empty()) => out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &event,
                    format!("timer {} is empty", one.tag_name().name()),
                )),
                [_] => {}
                _ => out.push(item(
                    Severity::Error,
                    self.id(),
                    file,
                    &event,
                    "timer defines more than one time expression",
                )),
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classpath::classfile::testing::ClassBuilder;
    use crate::classpath::testing::write_class;
    use crate::classpath::{ClassPath, ClassPathRoot};
    use tempfile::tempdir;

    pub(crate) fn bpmn_doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="{}" xmlns:camunda="{}" id="d">{}</bpmn:definitions>"#,
            BPMN_NS, CAMUNDA_NS, body
        )
    }

    pub(crate) const VALID_PROCESS: &str = r##"<bpmn:process id="dsfdev_ping" isExecutable="true" camunda:versionTag="#{version}">
  <bpmn:startEvent id="start"><bpmn:messageEventDefinition messageRef="m1"/></bpmn:startEvent>
  <bpmn:serviceTask id="task" camunda:class="org.example.Ping"/>
</bpmn:process>
<bpmn:message id="m1" name="startPing"/>"##;

    fn ctx<'a>(cp: &'a ClassPath, version: ApiVersion) -> ValidationContext<'a> {
        ValidationContext {
            api_version: version,
            classpath: cp,
            project_root: Path::new("/"),
            resources_dir: Path::new("/"),
        }
    }

    fn eval(rule: &dyn BpmnRule, xml: &str, cp: &ClassPath) -> Vec<LintItem> {
        let doc = Document::parse(xml).unwrap();
        rule.evaluate(&doc, "bpe/t.bpmn", &ctx(cp, ApiVersion::V1))
    }

    fn severities(items: &[LintItem]) -> Vec<Severity> {
        items.iter().map(|i| i.severity).collect()
    }

    #[test]
    fn test_process_definition_rule() {
        let cp = ClassPath::default();
        let ok = eval(&ProcessDefinitionRule, &bpmn_doc(VALID_PROCESS), &cp);
        assert_eq!(severities(&ok), vec![Severity::Success]);

        let bad = bpmn_doc(r#"<bpmn:process id="ping" isExecutable="false"/>"#);
        let items = eval(&ProcessDefinitionRule, &bad, &cp);
        assert_eq!(
            severities(&items),
            vec![Severity::Error, Severity::Error, Severity::Warn]
        );
        assert!(items.iter().all(|i| i.subject == "ping"));
    }

    #[test]
    fn test_service_task_needs_implementation() {
        let cp = ClassPath::default();
        let xml = bpmn_doc(
            r#"<bpmn:process id="a_b"><bpmn:serviceTask id="t1"/><bpmn:serviceTask id="t2" camunda:delegateExpression="${x}"/></bpmn:process>"#,
        );
        let items = eval(&ServiceTaskImplementationRule, &xml, &cp);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].location, "t1");
        assert_eq!(items[0].subject, "a_b");
    }

    #[test]
    fn test_class_reference_resolution() {
        let dir = tempdir().unwrap();
        let delegate = "org.camunda.bpm.engine.delegate.JavaDelegate";
        write_class(dir.path(), delegate, &ClassBuilder::new(delegate).interface().build());
        write_class(
            dir.path(),
            "org.example.Ping",
            &ClassBuilder::new("org.example.Ping").implements(delegate).build(),
        );
        write_class(
            dir.path(),
            "org.example.Plain",
            &ClassBuilder::new("org.example.Plain").build(),
        );
        write_class(
            dir.path(),
            "org.example.Orphan",
            &ClassBuilder::new("org.example.Orphan").extends("org.lib.Missing").build(),
        );
        let cp = ClassPath::new(vec![ClassPathRoot::Directory(dir.path().to_path_buf())]);
        let xml = bpmn_doc(
            r#"<bpmn:process id="a_b">
  <bpmn:serviceTask id="ok" camunda:class="org.example.Ping"/>
  <bpmn:serviceTask id="wrong" camunda:class="org.example.Plain"/>
  <bpmn:serviceTask id="unknown" camunda:class="org.example.Orphan"/>
  <bpmn:serviceTask id="absent" camunda:class="org.example.Nope"/>
</bpmn:process>"#,
        );
        let items = eval(&ClassReferenceRule, &xml, &cp);
        let by_loc = |loc: &str| items.iter().find(|i| i.location == loc).unwrap().severity;
        assert_eq!(by_loc("ok"), Severity::Success);
        assert_eq!(by_loc("wrong"), Severity::Error);
        assert_eq!(by_loc("unknown"), Severity::Info);
        assert_eq!(by_loc("absent"), Severity::Error);

        // the same class is not a V2 service task
        let doc = Document::parse(&xml).unwrap();
        let v2 = ClassReferenceRule.evaluate(&doc, "f", &ctx(&cp, ApiVersion::V2));
        assert_ne!(
            v2.iter().find(|i| i.location == "ok").unwrap().severity,
            Severity::Success
        );
    }

    #[test]
    fn test_listener_reported_at_owner() {
        let cp = ClassPath::default();
        let xml = bpmn_doc(
            r#"<bpmn:process id="a_b"><bpmn:endEvent id="end"><bpmn:extensionElements><camunda:executionListener class="x.Gone" event="start"/></bpmn:extensionElements></bpmn:endEvent></bpmn:process>"#,
        );
        let items = eval(&ClassReferenceRule, &xml, &cp);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].location, "end");
    }

    #[test]
    fn test_message_rules() {
        let cp = ClassPath::default();
        let ok = eval(&MessageNameRule, &bpmn_doc(VALID_PROCESS), &cp);
        assert!(ok.is_empty());
        let xml = bpmn_doc(
            r#"<bpmn:process id="a_b">
  <bpmn:startEvent id="s"><bpmn:messageEventDefinition messageRef="nope"/></bpmn:startEvent>
  <bpmn:intermediateCatchEvent id="c"><bpmn:messageEventDefinition/></bpmn:intermediateCatchEvent>
  <bpmn:intermediateThrowEvent id="t"><bpmn:messageEventDefinition camunda:class="x.Send"/></bpmn:intermediateThrowEvent>
  <bpmn:sendTask id="send" camunda:class="x.Send"><bpmn:extensionElements><camunda:field name="messageName"><camunda:string>pong</camunda:string></camunda:field></bpmn:extensionElements></bpmn:sendTask>
</bpmn:process>"#,
        );
        let items = eval(&MessageNameRule, &xml, &cp);
        let locs: Vec<&str> = items.iter().map(|i| i.location.as_str()).collect();
        assert_eq!(locs, vec!["s", "c", "t"]);
    }

    #[test]
    fn test_timer_rule() {
        let cp = ClassPath::default();
        let xml = bpmn_doc(
            r#"<bpmn:process id="a_b">
  <bpmn:intermediateCatchEvent id="ok"><bpmn:timerEventDefinition><bpmn:timeDuration>PT5M</bpmn:timeDuration></bpmn:timerEventDefinition></bpmn:intermediateCatchEvent>
  <bpmn:intermediateCatchEvent id="none"><bpmn:timerEventDefinition/></bpmn:intermediateCatchEvent>
  <bpmn:intermediateCatchEvent id="blank"><bpmn:timerEventDefinition><bpmn:timeDate> </bpmn:timeDate></bpmn:timerEventDefinition></bpmn:intermediateCatchEvent>
</bpmn:process>"#,
        );
        let items = eval(&TimerDefinitionRule, &xml, &cp);
        let locs: Vec<&str> = items.iter().map(|i| i.location.as_str()).collect();
        assert_eq!(locs, vec!["none", "blank"]);
    }

    #[test]
    fn test_malformed_file_yields_single_unparsable_item() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.bpmn");
        let bad = dir.path().join("bad.bpmn");
        fs::write(&good, bpmn_doc(VALID_PROCESS)).unwrap();
        fs::write(&bad, "<bpmn:definitions><unclosed>").unwrap();
        let cp = ClassPath::default();
        let ctx = ValidationContext {
            api_version: ApiVersion::V1,
            classpath: &cp,
            project_root: dir.path(),
            resources_dir: dir.path(),
        };
        let files: BTreeSet<PathBuf> = [good, bad].into_iter().collect();
        let items = BpmnValidationService::default().validate(&files, &ctx);
        let bad_items: Vec<&LintItem> = items.iter().filter(|i| i.file == "bad.bpmn").collect();
        assert_eq!(bad_items.len(), 1);
        assert_eq!(bad_items[0].rule, UNPARSABLE_RULE);
        assert_eq!(bad_items[0].severity, Severity::Error);
        assert!(items
            .iter()
            .any(|i| i.file == "good.bpmn" && i.rule == "bpmn-process-definition"));
    }
}
