//! Coverage gate over Cobertura-style XML reports.
//!
//! Expected shape:
//!
//! ```xml
//! <coverage line-rate="0.95">
//!   <packages><package><classes>
//!     <class filename="Source/Game/Player.cpp">
//!       <methods>...</methods>
//!       <lines><line number="12" hits="0"/></lines>
//!     </class>
//!   </classes></package></packages>
//! </coverage>
//! ```
//!
//! `<line>` entries under `<methods>` repeat the class lines and are skipped.
//! A missing report skips the gate; absence of coverage tooling is not a
//! failure.

use crate::error::{GateError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Text reported for lines whose source file cannot be read.
pub const SOURCE_NOT_AVAILABLE: &str = "(source code not available)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineHit {
    pub number: u32,
    pub hits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Parsed report. `overall_rate` and `per_file` always come from one parse.
pub struct CoverageReport {
    pub overall_rate: f64,
    pub per_file: BTreeMap<String, Vec<LineHit>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UncoveredLine {
    pub original_file_ref: String,
    pub resolved_path: Option<PathBuf>,
    pub line_number: u32,
    pub line_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GateResult {
    Pass {
        coverage_pct: f64,
    },
    Fail {
        coverage_pct: f64,
        threshold: f64,
        uncovered: Vec<UncoveredLine>,
    },
    /// No report was produced.
    Skipped,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        !matches!(self, GateResult::Fail { .. })
    }
}

/// Maps file references from a report to files on disk.
///
/// Strategies, first hit wins:
/// 1. the reference itself, relative to `work_dir`;
/// 2. the reference with `repo_url_prefix` stripped, under `project_root`;
/// 3. the reference under `project_root`;
/// 4. the tail starting at `plugin_marker`, under `project_root`.
#[derive(Debug, Clone)]
pub struct SourceResolver {
    pub work_dir: PathBuf,
    pub project_root: PathBuf,
    pub repo_url_prefix: Option<String>,
    pub plugin_marker: String,
}

impl SourceResolver {
    pub fn new(work_dir: PathBuf, project_root: PathBuf) -> Self {
        SourceResolver {
            work_dir,
            project_root,
            repo_url_prefix: None,
            plugin_marker: "Plugins/".to_string(),
        }
    }

    pub fn resolve(&self, file_ref: &str) -> Option<PathBuf> {
        let verbatim = self.work_dir.join(file_ref);
        if verbatim.is_file() {
            return Some(verbatim);
        }
        let norm = file_ref.replace('\\', "/");
        let candidates = [
            self.strip_repo_prefix(&norm)
                .map(|rest| self.project_root.join(rest)),
            Some(self.project_root.join(norm.trim_start_matches('/'))),
            self.plugin_tail(&norm)
                .map(|tail| self.project_root.join(tail)),
        ];
        let found = candidates.into_iter().flatten().find(|p| p.is_file());
        if found.is_none() {
            tracing::debug!(file_ref, "no source file for coverage reference");
        }
        found
    }

    fn strip_repo_prefix<'a>(&self, norm: &'a str) -> Option<&'a str> {
        let prefix = self.repo_url_prefix.as_deref()?.replace('\\', "/");
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return None;
        }
        norm.strip_prefix(prefix)
            .filter(|r| r.is_empty() || r.starts_with('/'))
            .map(|r| r.trim_start_matches('/'))
    }

    fn plugin_tail<'a>(&self, norm: &'a str) -> Option<&'a str> {
        if self.plugin_marker.is_empty() {
            return None;
        }
        norm.find(&self.plugin_marker).map(|idx| &norm[idx..])
    }
}

/// Rate in [0, 1] to a percentage rounded to two decimals.
pub fn coverage_percent(rate: f64) -> f64 {
    (rate * 10_000.0).round() / 100.0
}

/// Load a report, returning `None` when no file exists at `path`.
pub fn load_report(path: &Path) -> Result<Option<CoverageReport>> {
    if !path.exists() {
        return Ok(None);
    }
    let xml = fs::read_to_string(path).map_err(|e| GateError::io(path, e))?;
    parse_report(&xml)
        .map(Some)
        .map_err(|reason| GateError::CoverageParse {
            path: path.to_path_buf(),
            reason,
        })
}

/// Parse Cobertura XML into a [`CoverageReport`].
pub fn parse_report(xml: &str) -> std::result::Result<CoverageReport, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut overall_rate: Option<f64> = None;
    let mut current_file: Option<String> = None;
    let mut method_depth = 0usize;
    let mut files: BTreeMap<String, BTreeMap<u32, u64>> = BTreeMap::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at byte {}: {}", reader.buffer_position(), e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"coverage" => {
                        let raw = attr(e, b"line-rate")?
                            .ok_or("<coverage> has no line-rate attribute")?;
                        let rate: f64 = raw
                            .trim()
                            .parse()
                            .map_err(|_| format!("invalid line-rate '{}'", raw))?;
                        if !(0.0..=1.0).contains(&rate) {
                            return Err(format!("line-rate {} outside [0, 1]", rate));
                        }
                        overall_rate = Some(rate);
                    }
                    b"class" => {
                        let file = attr(e, b"filename")?.ok_or("<class> has no filename")?;
                        files.entry(file.clone()).or_default();
                        if !is_empty {
                            current_file = Some(file);
                        }
                    }
                    b"method" if !is_empty => method_depth += 1,
                    b"line" if method_depth == 0 => {
                        if let Some(file) = current_file.as_ref() {
                            let number = parse_num::<u32>(e, b"number")?;
                            let hits = parse_num::<u64>(e, b"hits")?;
                            let slot = files.entry(file.clone()).or_default().entry(number).or_insert(0);
                            *slot = (*slot).max(hits);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"class" => current_file = None,
                b"method" => method_depth = method_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let overall_rate = overall_rate.ok_or("no <coverage> root element")?;
    let per_file = files
        .into_iter()
        .map(|(f, lines)| {
            let hits = lines
                .into_iter()
                .map(|(number, hits)| LineHit { number, hits })
                .collect();
            (f, hits)
        })
        .collect();
    Ok(CoverageReport {
        overall_rate,
        per_file,
    })
}

fn attr(e: &BytesStart, name: &[u8]) -> std::result::Result<Option<String>, String> {
    for a in e.attributes() {
        let a = a.map_err(|err| format!("bad attribute: {}", err))?;
        if a.key.local_name().as_ref() == name {
            let v = a
                .unescape_value()
                .map_err(|err| format!("bad attribute value: {}", err))?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

fn parse_num<T: std::str::FromStr>(
    e: &BytesStart,
    name: &[u8],
) -> std::result::Result<T, String> {
    let key = String::from_utf8_lossy(name).to_string();
    let raw = attr(e, name)?.ok_or_else(|| format!("<line> has no {} attribute", key))?;
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid {} '{}' on <line>", key, raw))
}

/// Compare the report with `threshold` (a percentage) and, on failure,
/// resolve every uncovered line back to its source text.
pub fn evaluate(report: &CoverageReport, threshold: f64, resolver: &SourceResolver) -> GateResult {
    let coverage_pct = coverage_percent(report.overall_rate);
    if coverage_pct >= threshold {
        return GateResult::Pass { coverage_pct };
    }
    let mut uncovered = Vec::new();
    // per_file is keyed by file in order; lines are sorted here
    for (file_ref, lines) in &report.per_file {
        let mut missed: Vec<u32> = lines
            .iter()
            .filter(|l| l.hits == 0)
            .map(|l| l.number)
            .collect();
        missed.sort_unstable();
        missed.dedup();
        if missed.is_empty() {
            continue;
        }
        let resolved_path = resolver.resolve(file_ref);
        let source: Option<Vec<String>> = resolved_path.as_ref().and_then(|p| {
            fs::read(p).ok().map(|b| {
                String::from_utf8_lossy(&b)
                    .lines()
                    .map(|l| l.trim_end().to_string())
                    .collect()
            })
        });
        for n in missed {
            let line_text = source
                .as_ref()
                .and_then(|src| src.get((n as usize).checked_sub(1)?))
                .cloned()
                .unwrap_or_else(|| SOURCE_NOT_AVAILABLE.to_string());
            uncovered.push(UncoveredLine {
                original_file_ref: file_ref.clone(),
                resolved_path: resolved_path.clone(),
                line_number: n,
                line_text,
            });
        }
    }
    GateResult::Fail {
        coverage_pct,
        threshold,
        uncovered,
    }
}

/// Load and evaluate in one go; a missing report yields [`GateResult::Skipped`].
pub fn evaluate_path(path: &Path, threshold: f64, resolver: &SourceResolver) -> Result<GateResult> {
    match load_report(path)? {
        Some(report) => Ok(evaluate(&report, threshold, resolver)),
        None => {
            tracing::info!(report = %path.display(), "no coverage report; gate skipped");
            Ok(GateResult::Skipped)
        }
    }
}
