//! Output rendering for pipeline, classification, and coverage results.
//!
//! Supports `human` (default) and `json` outputs. The JSON forms are built
//! by pure `compose_*` functions so their shape can be tested.

use crate::classify::{ClassifiedLine, Classification, LogSummary};
use crate::coverage::{GateResult, UncoveredLine};
use crate::models::{PipelineReport, StepStatus};
use crate::project::ProjectDescriptor;
use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;
use std::path::Path;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

fn paint(text: &str, color: bool, f: impl Fn(&str) -> String) -> String {
    if color {
        f(text)
    } else {
        text.to_string()
    }
}

pub fn error_prefix() -> String {
    paint("error:", use_colors("human"), |s| s.red().bold().to_string())
}

pub fn note_prefix() -> String {
    paint("note:", use_colors("human"), |s| s.cyan().bold().to_string())
}

fn print_json(v: &JsonVal) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("{} {}", error_prefix(), e),
    }
}

fn display_path(p: &Path, base: &Path) -> String {
    pathdiff::diff_paths(p, base)
        .filter(|rel| !rel.starts_with(".."))
        .unwrap_or_else(|| p.to_path_buf())
        .to_string_lossy()
        .to_string()
}

pub fn print_project(pd: &ProjectDescriptor, output: &str) {
    match output {
        "json" => print_json(&compose_project_json(pd)),
        _ => {
            println!("project:    {}", pd.project_name);
            println!("root:       {}", pd.root_dir.display());
            println!("descriptor: {}", pd.descriptor_path.display());
        }
    }
}

pub fn compose_project_json(pd: &ProjectDescriptor) -> JsonVal {
    json!({
        "project_name": pd.project_name,
        "root_dir": pd.root_dir,
        "descriptor_path": pd.descriptor_path,
    })
}

fn issue_line(l: &ClassifiedLine, color: bool) -> String {
    let (icon, tag) = match l.classification {
        Classification::Error => (
            paint("✖", color, |s| s.red().to_string()),
            paint("⟦error⟧", color, |s| s.red().bold().to_string()),
        ),
        Classification::Warning => (
            paint("▲", color, |s| s.yellow().to_string()),
            paint("⟦warn⟧", color, |s| s.yellow().bold().to_string()),
        ),
        Classification::Ignored => (" ".to_string(), "⟦ok⟧".to_string()),
    };
    format!("{} {} {:>6}: {}", icon, tag, l.line_number, l.text.trim())
}

fn summary_line(s: &LogSummary, color: bool) -> String {
    let text = format!(
        "— Log — errors={} warnings={} ignored={}",
        s.errors, s.warnings, s.ignored
    );
    paint(&text, color, |t| t.bold().to_string())
}

/// Print issues found in a classified log and its summary.
pub fn print_classification(lines: &[ClassifiedLine], summary: &LogSummary, output: &str) {
    match output {
        "json" => print_json(&compose_classification_json(lines, summary)),
        _ => {
            let color = use_colors(output);
            for l in lines
                .iter()
                .filter(|l| l.classification != Classification::Ignored)
            {
                println!("{}", issue_line(l, color));
            }
            println!("{}", summary_line(summary, color));
        }
    }
}

pub fn compose_classification_json(lines: &[ClassifiedLine], summary: &LogSummary) -> JsonVal {
    let issues: Vec<&ClassifiedLine> = lines
        .iter()
        .filter(|l| l.classification != Classification::Ignored)
        .collect();
    json!({ "issues": issues, "summary": summary })
}

fn uncovered_block(uncovered: &[UncoveredLine], base: &Path, color: bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Option<&str> = None;
    for u in uncovered {
        if current != Some(u.original_file_ref.as_str()) {
            current = Some(u.original_file_ref.as_str());
            let header = match u.resolved_path.as_ref() {
                Some(p) => display_path(p, base),
                None => format!("{} (unresolved)", u.original_file_ref),
            };
            out.push(paint(&header, color, |s| s.bold().to_string()));
        }
        out.push(format!("  {:>6} | {}", u.line_number, u.line_text));
    }
    out
}

/// Print a coverage gate result. `base` shortens resolved paths.
pub fn print_gate(res: &GateResult, base: &Path, output: &str) {
    match output {
        "json" => print_json(&compose_gate_json(res)),
        _ => {
            let color = use_colors(output);
            for l in gate_lines(res, base, color) {
                println!("{}", l);
            }
        }
    }
}

fn gate_lines(res: &GateResult, base: &Path, color: bool) -> Vec<String> {
    match res {
        GateResult::Pass { coverage_pct } => vec![paint(
            &format!("✔ coverage {:.2}%", coverage_pct),
            color,
            |s| s.green().bold().to_string(),
        )],
        GateResult::Skipped => vec![paint(
            "⏭️  coverage skipped (no report)",
            color,
            |s| s.bright_black().to_string(),
        )],
        GateResult::Fail {
            coverage_pct,
            threshold,
            uncovered,
        } => {
            let mut out = vec![paint(
                &format!(
                    "✖ coverage {:.2}% is below threshold {:.2}%; uncovered lines:",
                    coverage_pct, threshold
                ),
                color,
                |s| s.red().bold().to_string(),
            )];
            out.extend(uncovered_block(uncovered, base, color));
            out
        }
    }
}

pub fn compose_gate_json(res: &GateResult) -> JsonVal {
    serde_json::to_value(res).unwrap_or(JsonVal::Null)
}

/// Print every executed step with its details, then a one-line summary.
pub fn print_pipeline(report: &PipelineReport, base: &Path, output: &str) {
    match output {
        "json" => print_json(&compose_pipeline_json(report)),
        _ => {
            let color = use_colors(output);
            for s in &report.steps {
                let status = match s.status {
                    StepStatus::Passed => paint("✔ passed", color, |t| t.green().bold().to_string()),
                    StepStatus::Failed => paint("✖ failed", color, |t| t.red().bold().to_string()),
                };
                let name = paint(&s.step, color, |t| t.bold().to_string());
                println!("{} {} ({} ms)", status, name, s.duration_ms);
                if let Some(d) = s.detail.as_ref() {
                    println!("    {}", d);
                }
                if let Some(log) = s.log_path.as_ref() {
                    if s.status == StepStatus::Failed {
                        println!("    log: {}", display_path(log, base));
                    }
                }
                for l in &s.issues {
                    println!("    {}", issue_line(l, color));
                }
                if let Some(g) = s.coverage.as_ref() {
                    for l in gate_lines(g, base, color) {
                        println!("    {}", l);
                    }
                }
            }
            let passed = report
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Passed)
                .count();
            let summary = format!(
                "— Summary — steps={} passed={} failed={}",
                report.steps.len(),
                passed,
                report.steps.len() - passed
            );
            println!("{}", paint(&summary, color, |t| t.bold().to_string()));
        }
    }
}

pub fn compose_pipeline_json(report: &PipelineReport) -> JsonVal {
    let passed = report
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Passed)
        .count();
    json!({
        "steps": report.steps,
        "summary": {
            "steps": report.steps.len(),
            "passed": passed,
            "failed": report.steps.len() - passed,
            "ok": report.passed(),
        }
    })
}
