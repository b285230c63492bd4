//! Shared data models for lint items, discovery aggregates, and results.

pub mod discovery;
pub mod result;

use serde::Serialize;
use std::fmt;

/// Finding severity. Declaration order is the presentation rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warn,
    Info,
    Success,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource domain an item was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Bpmn,
    Fhir,
    Plugin,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemKind::Bpmn => "bpmn",
            ItemKind::Fhir => "fhir",
            ItemKind::Plugin => "plugin",
        })
    }
}

/// Rule id carried by leftover findings; such items never gate success.
pub const LEFTOVER_RULE: &str = "leftover-resource";
/// Rule id of the synthetic finding for a file that failed to parse.
pub const UNPARSABLE_RULE: &str = "unparsable-resource";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A single finding with severity and location.
pub struct LintItem {
    pub kind: ItemKind,
    pub severity: Severity,
    pub rule: String,
    /// Element id (BPMN) or resource reference (FHIR, plugin).
    pub location: String,
    pub file: String,
    /// Process id or FHIR resource id the finding belongs to.
    pub subject: String,
    pub description: String,
}

impl LintItem {
    pub fn new(
        kind: ItemKind,
        severity: Severity,
        rule: impl Into<String>,
        file: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            rule: rule.into(),
            location: String::new(),
            file: file.into(),
            subject: String::new(),
            description: description.into(),
        }
    }

    pub fn bpmn(
        severity: Severity,
        rule: impl Into<String>,
        file: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(ItemKind::Bpmn, severity, rule, file, description)
    }

    pub fn fhir(
        severity: Severity,
        rule: impl Into<String>,
        file: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(ItemKind::Fhir, severity, rule, file, description)
    }

    pub fn plugin(
        severity: Severity,
        rule: impl Into<String>,
        file: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(ItemKind::Plugin, severity, rule, file, description)
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn on(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn is_leftover(&self) -> bool {
        self.rule == LEFTOVER_RULE
    }
}

impl fmt::Display for LintItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} {} {}: {}",
            self.severity, self.kind, self.file, self.subject, self.location, self.rule,
            self.description
        )
    }
}

/// Sort items by severity rank, then by their string form.
///
/// The sort is stable, so items with identical rank and text keep their
/// relative order, and the result is deterministic for identical input.
pub fn sort_items(items: &mut [LintItem]) {
    items.sort_by_cached_key(|it| (it.severity, it.to_string()));
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
/// Aggregated counts used by printers and the success gate.
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub successes: usize,
    /// Leftover findings; already included in `warnings`, never in `errors`.
    pub leftovers: usize,
}

impl Summary {
    pub fn from_items(items: &[LintItem]) -> Self {
        let mut s = Summary::default();
        for it in items {
            if it.is_leftover() && it.severity != Severity::Success {
                s.leftovers += 1;
            }
            match it.severity {
                Severity::Error if !it.is_leftover() => s.errors += 1,
                Severity::Error | Severity::Warn => s.warnings += 1,
                Severity::Info => s.infos += 1,
                Severity::Success => s.successes += 1,
            }
        }
        s
    }

    pub fn add(&mut self, other: &Summary) {
        self.errors += other.errors;
        self.warnings += other.warnings;
        self.infos += other.infos;
        self.successes += other.successes;
        self.leftovers += other.leftovers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_items_orders_by_severity_then_text() {
        let mut items = vec![
            LintItem::bpmn(Severity::Success, "r", "b.bpmn", "ok"),
            LintItem::fhir(Severity::Info, "r", "a.xml", "note"),
            LintItem::bpmn(Severity::Error, "r", "z.bpmn", "broken"),
            LintItem::plugin(Severity::Warn, "r", "p", "careful"),
            LintItem::bpmn(Severity::Error, "r", "a.bpmn", "broken"),
        ];
        sort_items(&mut items);
        let sev: Vec<Severity> = items.iter().map(|i| i.severity).collect();
        assert_eq!(
            sev,
            vec![
                Severity::Error,
                Severity::Error,
                Severity::Warn,
                Severity::Info,
                Severity::Success
            ]
        );
        assert_eq!(items[0].file, "a.bpmn");
        assert_eq!(items[1].file, "z.bpmn");
    }

    #[test]
    fn test_sort_is_deterministic_across_input_orders() {
        let a = LintItem::fhir(Severity::Warn, "x", "f1.xml", "one");
        let b = LintItem::fhir(Severity::Warn, "x", "f2.xml", "two");
        let c = LintItem::bpmn(Severity::Error, "y", "p.bpmn", "three");
        let mut first = vec![a.clone(), b.clone(), c.clone()];
        let mut second = vec![b, c, a];
        sort_items(&mut first);
        sort_items(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_excludes_leftovers_from_errors() {
        let items = vec![
            LintItem::bpmn(Severity::Error, "bpmn-x", "a.bpmn", "bad"),
            LintItem::bpmn(Severity::Warn, LEFTOVER_RULE, "left.bpmn", "unused"),
            LintItem::fhir(Severity::Warn, LEFTOVER_RULE, "left.xml", "unused"),
            LintItem::plugin(Severity::Success, "ok", "p", "fine"),
        ];
        let s = Summary::from_items(&items);
        assert_eq!(s.errors, 1);
        assert_eq!(s.warnings, 2);
        assert_eq!(s.leftovers, 2);
        assert_eq!(s.successes, 1);
    }
}
