//! Build log classification.
//!
//! Toolchains often exit with 0 while downgrading real problems to warnings.
//! The classifier is the second gate applied after a zero exit code: any
//! `ERROR:` line, or any `WARNING:` line that is not known noise, fails the
//! step.
//!
//! Rules, first match wins:
//! 1. `^\s*ERROR:` is an error.
//! 2. `^\s*WARNING:` is a warning unless it is the success summary
//!    (`Success - N error(s), N warning(s)`), the compiler "preferred version"
//!    advisory, or matches a configured ignore pattern.
//! 3. Everything else is ignored.

use crate::error::{GateError, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Error,
    Warning,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
/// A single log line with its 1-based position and classification.
pub struct ClassifiedLine {
    pub line_number: usize,
    pub text: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Counts per classification.
pub struct LogSummary {
    pub errors: usize,
    pub warnings: usize,
    pub ignored: usize,
    pub has_issues: bool,
}

/// Compiled rule set.
pub struct Classifier {
    error: Regex,
    warning: Regex,
    benign: Vec<Regex>,
}

impl Classifier {
    /// Build a classifier with the built-in noise filters plus `extra_ignore`
    /// regexes applied to `WARNING:` lines.
    pub fn new(extra_ignore: &[String]) -> Result<Self> {
        let mut benign = vec![
            compile(r"Success - \d+ error\(s\), \d+ warning\(s\)")?,
            compile(r"(?i)\bpreferred version\b")?,
        ];
        for pat in extra_ignore {
            benign.push(compile(pat)?);
        }
        Ok(Classifier {
            error: compile(r"^\s*ERROR:")?,
            warning: compile(r"^\s*WARNING:")?,
            benign,
        })
    }

    pub fn classify_line(&self, line: &str) -> Classification {
        if self.error.is_match(line) {
            Classification::Error
        } else if self.warning.is_match(line) && !self.benign.iter().any(|r| r.is_match(line)) {
            Classification::Warning
        } else {
            Classification::Ignored
        }
    }

    pub fn classify<I, S>(&self, lines: I) -> Vec<ClassifiedLine>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        lines
            .into_iter()
            .enumerate()
            .map(|(i, l)| {
                let text = l.as_ref();
                ClassifiedLine {
                    line_number: i + 1,
                    classification: self.classify_line(text),
                    text: text.to_string(),
                }
            })
            .collect()
    }

    /// Classify a captured log file. Invalid UTF-8 is replaced, not rejected.
    pub fn classify_file(&self, path: &Path) -> Result<Vec<ClassifiedLine>> {
        let bytes = fs::read(path).map_err(|e| GateError::io(path, e))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(self.classify(text.lines()))
    }
}

fn compile(pat: &str) -> Result<Regex> {
    Regex::new(pat)
        .map_err(|e| GateError::Configuration(format!("invalid log pattern '{}': {}", pat, e)))
}

pub fn summarize(lines: &[ClassifiedLine]) -> LogSummary {
    let mut s = LogSummary::default();
    for l in lines {
        match l.classification {
            Classification::Error => s.errors += 1,
            Classification::Warning => s.warnings += 1,
            Classification::Ignored => s.ignored += 1,
        }
    }
    s.has_issues = s.errors + s.warnings > 0;
    s
}

/// Lines that count against the gate, in log order.
pub fn issues(lines: &[ClassifiedLine]) -> impl Iterator<Item = &ClassifiedLine> {
    lines
        .iter()
        .filter(|l| l.classification != Classification::Ignored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn classifier() -> Classifier {
        Classifier::new(&[]).unwrap()
    }

    #[test]
    fn test_error_lines_win_regardless_of_content() {
        let c = classifier();
        for line in [
            "ERROR: missing symbol",
            "   ERROR: Success - 0 error(s), 0 warning(s)",
            "\tERROR:",
            "ERROR: preferred version",
        ] {
            assert_eq!(c.classify_line(line), Classification::Error, "{line}");
        }
    }

    #[test]
    fn test_success_summary_warning_is_ignored() {
        let c = classifier();
        assert_eq!(
            c.classify_line("WARNING: Success - 0 error(s), 0 warning(s)"),
            Classification::Ignored
        );
        assert_eq!(
            c.classify_line("  WARNING: Success - 12 error(s), 345 warning(s)"),
            Classification::Ignored
        );
    }

    #[test]
    fn test_preferred_version_advisory_is_ignored() {
        let c = classifier();
        let line = "WARNING: Visual Studio 2022 compiler version 14.39.33523 is not a preferred version. Please use the latest preferred version 14.38.33130";
        assert_eq!(c.classify_line(line), Classification::Ignored);
    }

    #[test]
    fn test_real_warning_and_other_text() {
        let c = classifier();
        assert_eq!(
            c.classify_line("WARNING: Plugin 'Foo' failed to load"),
            Classification::Warning
        );
        // Not anchored at line start
        assert_eq!(
            c.classify_line("LogTemp: ERROR: something"),
            Classification::Ignored
        );
        assert_eq!(c.classify_line("warning: lowercase"), Classification::Ignored);
        assert_eq!(c.classify_line(""), Classification::Ignored);
    }

    #[test]
    fn test_scenario_error_plus_benign_summary() {
        let c = classifier();
        let out = c.classify([
            "ERROR: missing symbol",
            "WARNING: Success - 0 error(s), 0 warning(s)",
        ]);
        let s = summarize(&out);
        assert_eq!(s.errors, 1);
        assert_eq!(s.warnings, 0);
        assert_eq!(s.ignored, 1);
        assert!(s.has_issues);
        assert_eq!(issues(&out).count(), 1);
        assert_eq!(out[1].line_number, 2);
    }

    #[test]
    fn test_clean_log_has_no_issues() {
        let c = classifier();
        let out = c.classify(["Building 3 actions", "Total time 1.2s"]);
        assert!(!summarize(&out).has_issues);
    }

    #[test]
    fn test_extra_ignore_patterns() {
        let c = Classifier::new(&["DerivedDataCache".to_string()]).unwrap();
        assert_eq!(
            c.classify_line("WARNING: DerivedDataCache is slow"),
            Classification::Ignored
        );
        assert!(matches!(
            Classifier::new(&["(".to_string()]),
            Err(GateError::Configuration(_))
        ));
    }

    #[test]
    fn test_classify_file_lossy() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("build.log");
        fs::write(&p, b"ok\nWARNING: bad \xff byte\n").unwrap();
        let out = classifier().classify_file(&p).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].classification, Classification::Warning);
    }
}
