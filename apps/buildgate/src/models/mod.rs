//! Shared data models for pipeline results and printers.

use crate::classify::{ClassifiedLine, LogSummary};
use crate::coverage::GateResult;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
/// Result of one pipeline step, filled in as the step progresses.
pub struct StepOutcome {
    pub step: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub log_path: Option<PathBuf>,
    pub log_summary: Option<LogSummary>,
    /// Error and warning lines that failed the log gate
    pub issues: Vec<ClassifiedLine>,
    pub coverage: Option<GateResult>,
    pub detail: Option<String>,
}

impl StepOutcome {
    pub fn new(step: &str) -> Self {
        StepOutcome {
            step: step.to_string(),
            status: StepStatus::Passed,
            duration_ms: 0,
            exit_code: None,
            log_path: None,
            log_summary: None,
            issues: Vec::new(),
            coverage: None,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
/// Outcomes in execution order. Steps after the first failure are absent.
pub struct PipelineReport {
    pub steps: Vec<StepOutcome>,
}

impl PipelineReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Passed)
    }
}
