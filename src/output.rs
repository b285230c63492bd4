//! Console rendering of a finished lint run.
//!
//! Supports `human` (default) and `json` outputs. The JSON form carries a
//! per-plugin breakdown, the leftover list and a top-level summary.

use crate::models::result::OverallResult;
use crate::models::{LintItem, Severity};
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

fn stderr_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// `error:` label for messages on stderr.
pub fn error_prefix() -> String {
    if stderr_colors() {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

/// `note:` label for messages on stderr.
pub fn note_prefix() -> String {
    if stderr_colors() {
        "note:".cyan().bold().to_string()
    } else {
        "note:".to_string()
    }
}

fn severity_label(sev: Severity, color: bool) -> String {
    let text = match sev {
        Severity::Error => "⟦error⟧",
        Severity::Warn => "⟦warn⟧",
        Severity::Info => "⟦info⟧",
        Severity::Success => "⟦ok⟧",
    };
    if !color {
        return text.to_string();
    }
    match sev {
        Severity::Error => text.red().bold().to_string(),
        Severity::Warn => text.yellow().bold().to_string(),
        Severity::Info => text.blue().bold().to_string(),
        Severity::Success => text.green().bold().to_string(),
    }
}

fn severity_icon(sev: Severity, color: bool) -> String {
    let icon = match sev {
        Severity::Error => "✖",
        Severity::Warn => "▲",
        Severity::Info => "◆",
        Severity::Success => "✔",
    };
    if !color {
        return icon.to_string();
    }
    match sev {
        Severity::Error => icon.red().to_string(),
        Severity::Warn => icon.yellow().to_string(),
        Severity::Info => icon.blue().to_string(),
        Severity::Success => icon.green().to_string(),
    }
}

/// One human-readable line per item.
pub fn format_item(it: &LintItem, color: bool) -> String {
    let file = if color {
        it.file.bold().to_string()
    } else {
        it.file.clone()
    };
    let location = if it.location.is_empty() || it.location == it.file {
        String::new()
    } else {
        format!(" @{}", it.location)
    };
    format!(
        "{} {} {}{} ❲{}❳ — {}",
        severity_icon(it.severity, color),
        severity_label(it.severity, color),
        file,
        location,
        it.rule,
        it.description
    )
}

/// Print the run summary. SUCCESS items are listed only when `verbose`.
pub fn print_summary(overall: &OverallResult, output: &str, verbose: bool) {
    if output == "json" {
        match serde_json::to_string_pretty(&compose_summary_json(overall)) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("{} {}", error_prefix(), e),
        }
        return;
    }
    let color = use_colors(output);
    if overall.plugin_count() == 0 {
        println!("No DSF process plugin definitions found; nothing to check.");
        return;
    }
    for (key, r) in &overall.plugin_results {
        let header = format!(
            "▸ {} ({}, {}) errors={} warnings={}",
            key, r.plugin_class_name, r.api_version, r.summary.errors, r.summary.warnings
        );
        if color {
            println!("{}", header.bold());
        } else {
            println!("{}", header);
        }
        for it in r
            .items
            .iter()
            .filter(|i| verbose || i.severity != Severity::Success)
        {
            println!("  {}", format_item(it, color));
        }
    }
    let s = &overall.summary;
    let summary = format!(
        "— Summary — plugins={} errors={} warnings={} infos={} leftovers={} total_errors={} time={}ms",
        overall.plugin_count(),
        s.errors,
        s.warnings,
        s.infos,
        overall.leftover_analysis.count(),
        overall.total_errors,
        overall.execution_time_ms
    );
    if color {
        println!("{}", summary.bold());
    } else {
        println!("{}", summary);
    }
    if let Some(path) = &overall.master_report_path {
        println!("Report: {}", path.display());
    }
    let status = if overall.success { "PASSED" } else { "FAILED" };
    match (color, overall.success) {
        (true, true) => println!("{}", status.green().bold()),
        (true, false) => println!("{}", status.red().bold()),
        _ => println!("{}", status),
    }
}

/// Compose the JSON summary object (pure) for testing.
pub fn compose_summary_json(overall: &OverallResult) -> JsonVal {
    let plugins: Vec<JsonVal> = overall
        .plugin_results
        .iter()
        .map(|(key, r)| {
            json!({
                "plugin": key,
                "class": r.plugin_class_name,
                "apiVersion": r.api_version.to_string(),
                "report": r.report_path.as_ref().map(|p| p.display().to_string()),
                "items": r.items,
                "summary": r.summary,
            })
        })
        .collect();
    json!({
        "success": overall.success,
        "plugins": plugins,
        "leftovers": overall.leftover_analysis,
        "summary": {
            "plugins": overall.plugin_count(),
            "errors": overall.summary.errors,
            "warnings": overall.summary.warnings,
            "infos": overall.summary.infos,
            "leftovers": overall.leftover_analysis.count(),
            "totalErrors": overall.total_errors,
            "executionTimeMs": overall.execution_time_ms as u64,
        },
        "report": overall.master_report_path.as_ref().map(|p| p.display().to_string()),
    })
}
