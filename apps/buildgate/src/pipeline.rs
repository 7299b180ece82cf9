//! Linear pipeline of typed steps.
//!
//! Steps run one at a time and the pipeline stops at the first failure. A
//! tool step fails in two stages: a non-zero exit code fails fast, then the
//! log classifier rejects any remaining error or warning lines. The test step
//! adds the coverage gate on top.

use crate::classify::{self, Classifier};
use crate::config::Effective;
use crate::coverage::{self, GateResult};
use crate::error::{GateError, Result};
use crate::models::{PipelineReport, StepOutcome, StepStatus};
use crate::runner::{ToolInvocation, ToolRunner};
use crate::toolchain::BuildConfig;
use glob::{glob, Pattern};
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Build {
        target: String,
        configuration: BuildConfig,
        /// Step name prefix, `editor` or `game`
        kind: &'static str,
    },
    Package {
        configuration: BuildConfig,
    },
    Test,
    Clean,
}

impl Step {
    /// Stable name used for log files and reports.
    pub fn name(&self) -> String {
        match self {
            Step::Build {
                kind, configuration, ..
            } => format!("{}-{}", kind, configuration.as_str().to_lowercase()),
            Step::Package { configuration } => {
                format!("package-{}", configuration.as_str().to_lowercase())
            }
            Step::Test => "test".to_string(),
            Step::Clean => "clean".to_string(),
        }
    }
}

/// Editor Debug/Development, then game Debug/Development/Shipping.
pub fn build_plan(eff: &Effective) -> Vec<Step> {
    let editor = [BuildConfig::Debug, BuildConfig::Development]
        .into_iter()
        .map(|c| Step::Build {
            target: eff.editor_target.clone(),
            configuration: c,
            kind: "editor",
        });
    let game = [
        BuildConfig::Debug,
        BuildConfig::Development,
        BuildConfig::Shipping,
    ]
    .into_iter()
    .map(|c| Step::Build {
        target: eff.game_target.clone(),
        configuration: c,
        kind: "game",
    });
    editor.chain(game).collect()
}

pub fn package_plan(eff: &Effective) -> Vec<Step> {
    eff.package_configs
        .iter()
        .map(|&configuration| Step::Package { configuration })
        .collect()
}

/// Build, package, then test.
pub fn ci_plan(eff: &Effective) -> Vec<Step> {
    let mut steps = build_plan(eff);
    steps.extend(package_plan(eff));
    steps.push(Step::Test);
    steps
}

pub struct Pipeline<'a, R: ToolRunner> {
    eff: &'a Effective,
    runner: &'a R,
    classifier: Classifier,
}

impl<'a, R: ToolRunner> Pipeline<'a, R> {
    pub fn new(eff: &'a Effective, runner: &'a R) -> Result<Self> {
        let classifier = Classifier::new(&eff.ignore_patterns)?;
        Ok(Pipeline {
            eff,
            runner,
            classifier,
        })
    }

    /// Run `steps` in order, stopping at the first failure. The report holds
    /// every step that ran, including the failing one.
    pub fn run(&self, steps: &[Step]) -> (PipelineReport, Result<()>) {
        let mut report = PipelineReport::default();
        for step in steps {
            let name = step.name();
            tracing::info!(step = %name, "step started");
            let started = Instant::now();
            let mut outcome = StepOutcome::new(&name);
            let res = self.execute(step, &mut outcome);
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            match res {
                Ok(()) => {
                    tracing::info!(step = %name, ms = outcome.duration_ms, "step passed");
                    report.steps.push(outcome);
                }
                Err(e) => {
                    tracing::warn!(step = %name, error = %e, "step failed");
                    outcome.status = StepStatus::Failed;
                    outcome.detail = Some(e.to_string());
                    report.steps.push(outcome);
                    return (report, Err(e));
                }
            }
        }
        (report, Ok(()))
    }

    fn execute(&self, step: &Step, outcome: &mut StepOutcome) -> Result<()> {
        match step {
            Step::Build {
                target,
                configuration,
                ..
            } => {
                let inv = self.build_invocation(target, *configuration)?;
                self.run_tool(&inv, outcome)
            }
            Step::Package { configuration } => {
                let inv = self.package_invocation(*configuration)?;
                let res = self.run_tool(&inv, outcome);
                if matches!(res, Err(GateError::ProcessFailure { .. })) {
                    // Drop the partial archive for this configuration
                    let partial = self.eff.archive_dir.join(configuration.as_str());
                    if partial.exists() {
                        let _ = fs::remove_dir_all(&partial);
                    }
                }
                res
            }
            Step::Test => self.run_tests(outcome),
            Step::Clean => self.clean(outcome),
        }
    }

    fn run_tool(&self, inv: &ToolInvocation, outcome: &mut StepOutcome) -> Result<()> {
        let log_path = self.eff.log_path(&outcome.step);
        outcome.log_path = Some(log_path.clone());
        let out = self.runner.run(inv, &log_path)?;
        outcome.exit_code = Some(out.exit_code);
        if out.exit_code != 0 {
            return Err(GateError::ProcessFailure {
                step: outcome.step.clone(),
                code: out.exit_code,
            });
        }
        self.gate_log(&out.lines, outcome)
    }

    fn gate_log<S: AsRef<str>>(&self, lines: &[S], outcome: &mut StepOutcome) -> Result<()> {
        let classified = self.classifier.classify(lines.iter().map(|l| l.as_ref()));
        let summary = classify::summarize(&classified);
        outcome.issues = classify::issues(&classified).cloned().collect();
        let has_issues = summary.has_issues;
        let reason = format!(
            "{} error(s), {} warning(s) in log",
            summary.errors, summary.warnings
        );
        outcome.log_summary = Some(summary);
        if has_issues {
            return Err(GateError::QualityGate {
                step: outcome.step.clone(),
                reason,
            });
        }
        Ok(())
    }

    fn descriptor_arg(&self) -> String {
        self.eff.project.descriptor_path.to_string_lossy().to_string()
    }

    pub fn build_invocation(&self, target: &str, config: BuildConfig) -> Result<ToolInvocation> {
        let tools = self.eff.require_tools()?;
        let mut args = vec![
            target.to_string(),
            self.eff.platform.clone(),
            config.as_str().to_string(),
            format!("-Project={}", self.descriptor_arg()),
            "-WaitMutex".to_string(),
            "-NoHotReloadFromIDE".to_string(),
        ];
        args.extend(self.eff.build_extra.iter().cloned());
        Ok(ToolInvocation {
            tool: "build tool".into(),
            program: tools.build.clone(),
            args,
            cwd: self.eff.project.root_dir.clone(),
        })
    }

    pub fn package_invocation(&self, config: BuildConfig) -> Result<ToolInvocation> {
        let tools = self.eff.require_tools()?;
        let archive = self.eff.archive_dir.join(config.as_str());
        let mut args = vec![
            "BuildCookRun".to_string(),
            format!("-project={}", self.descriptor_arg()),
            format!("-platform={}", self.eff.platform),
            format!("-clientconfig={}", config.as_str()),
            "-build".to_string(),
            "-cook".to_string(),
            "-stage".to_string(),
            "-pak".to_string(),
            "-archive".to_string(),
            format!("-archivedirectory={}", archive.to_string_lossy()),
            "-noP4".to_string(),
            "-utf8output".to_string(),
        ];
        args.extend(self.eff.package_extra.iter().cloned());
        Ok(ToolInvocation {
            tool: "packaging tool".into(),
            program: tools.package.clone(),
            args,
            cwd: self.eff.project.root_dir.clone(),
        })
    }

    /// Test runner command line, wrapped by the coverage tool when enabled.
    pub fn test_invocation(&self) -> Result<ToolInvocation> {
        let tools = self.eff.require_tools()?;
        let engine_log = self.eff.log_path("test-engine");
        let mut test_args = vec![self.descriptor_arg()];
        if let Some(map) = self.eff.test_map.as_ref() {
            test_args.push(map.clone());
        }
        test_args.extend([
            format!(
                "-ExecCmds=Automation RunTests {}; Quit",
                self.eff.test_filter
            ),
            "-unattended".to_string(),
            "-nopause".to_string(),
            "-NullRHI".to_string(),
            "-nosplash".to_string(),
            "-log".to_string(),
            format!("-abslog={}", engine_log.to_string_lossy()),
        ]);
        test_args.extend(self.eff.test_extra.iter().cloned());

        match tools.coverage.as_ref().filter(|_| self.eff.coverage_enabled) {
            Some(cov) => {
                let mut args = vec![
                    "--export_type".to_string(),
                    format!("cobertura:{}", self.eff.coverage_report.to_string_lossy()),
                    "--sources".to_string(),
                    self.eff
                        .project
                        .root_dir
                        .join("Source")
                        .to_string_lossy()
                        .to_string(),
                    "--".to_string(),
                    tools.test.to_string_lossy().to_string(),
                ];
                args.extend(test_args);
                Ok(ToolInvocation {
                    tool: "coverage tool".into(),
                    program: cov.clone(),
                    args,
                    cwd: self.eff.project.root_dir.clone(),
                })
            }
            None => Ok(ToolInvocation {
                tool: "test runner".into(),
                program: tools.test.clone(),
                args: test_args,
                cwd: self.eff.project.root_dir.clone(),
            }),
        }
    }

    fn run_tests(&self, outcome: &mut StepOutcome) -> Result<()> {
        let report = &self.eff.coverage_report;
        // A stale report would let an old run pass the gate
        if report.exists() {
            fs::remove_file(report).map_err(|e| GateError::io(report, e))?;
        }
        let engine_log = self.eff.log_path("test-engine");
        if engine_log.exists() {
            fs::remove_file(&engine_log).map_err(|e| GateError::io(&engine_log, e))?;
        }

        let inv = self.test_invocation()?;
        let log_path = self.eff.log_path(&outcome.step);
        outcome.log_path = Some(log_path.clone());
        let out = self.runner.run(&inv, &log_path)?;
        outcome.exit_code = Some(out.exit_code);
        if out.exit_code != 0 {
            if report.exists() {
                let _ = fs::remove_file(report);
            }
            return Err(GateError::ProcessFailure {
                step: outcome.step.clone(),
                code: out.exit_code,
            });
        }

        // Prefer the runner's own log; fall back to captured console output
        if engine_log.is_file() {
            let classified = self.classifier.classify_file(&engine_log)?;
            let texts: Vec<&str> = classified.iter().map(|c| c.text.as_str()).collect();
            outcome.log_path = Some(engine_log.clone());
            self.gate_log(&texts, outcome)?;
        } else {
            self.gate_log(&out.lines, outcome)?;
        }

        let resolver = self.eff.source_resolver();
        let gate = coverage::evaluate_path(report, self.eff.threshold, &resolver)?;
        let failed = match &gate {
            GateResult::Fail {
                coverage_pct,
                threshold,
                uncovered,
            } => Some(format!(
                "coverage {:.2}% below threshold {:.2}% ({} uncovered line(s))",
                coverage_pct,
                threshold,
                uncovered.len()
            )),
            _ => None,
        };
        outcome.coverage = Some(gate);
        if let Some(reason) = failed {
            return Err(GateError::QualityGate {
                step: outcome.step.clone(),
                reason,
            });
        }
        Ok(())
    }

    fn clean(&self, outcome: &mut StepOutcome) -> Result<()> {
        let root = &self.eff.project.root_dir;
        let canonical_root = fs::canonicalize(root).map_err(|e| GateError::io(root, e))?;
        let escaped_root = Pattern::escape(&root.to_string_lossy());
        let mut removed = 0usize;
        for pat in &self.eff.clean_patterns {
            let full = Path::new(&escaped_root).join(pat);
            let entries = glob(&full.to_string_lossy()).map_err(|e| {
                GateError::Configuration(format!("invalid clean pattern '{}': {}", pat, e))
            })?;
            for path in entries.filter_map(|p| p.ok()) {
                let inside = fs::canonicalize(&path)
                    .is_ok_and(|c| c.starts_with(&canonical_root) && c != canonical_root);
                if !inside {
                    tracing::warn!(
                        path = %path.display(),
                        "skipping clean match outside the project"
                    );
                    continue;
                }
                remove_path(&path)?;
                tracing::debug!(path = %path.display(), "removed");
                removed += 1;
            }
        }
        outcome.detail = Some(format!("removed {} path(s)", removed));
        Ok(())
    }
}

fn remove_path(path: &Path) -> Result<()> {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    res.map_err(|e| GateError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{merge, CliOverrides, GateConfig};
    use crate::project;
    use crate::runner::ToolOutput;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    /// Replays scripted outputs and records every invocation.
    struct FakeRunner {
        script: RefCell<VecDeque<(i32, Vec<&'static str>)>>,
        calls: RefCell<Vec<ToolInvocation>>,
        /// Written to the coverage report path on the next test invocation
        coverage_xml: Option<String>,
        report_path: PathBuf,
    }

    impl FakeRunner {
        fn new(script: Vec<(i32, Vec<&'static str>)>) -> Self {
            FakeRunner {
                script: RefCell::new(script.into()),
                calls: RefCell::new(Vec::new()),
                coverage_xml: None,
                report_path: PathBuf::new(),
            }
        }
    }

    impl ToolRunner for FakeRunner {
        fn run(&self, inv: &ToolInvocation, log_path: &Path) -> Result<ToolOutput> {
            self.calls.borrow_mut().push(inv.clone());
            let (exit_code, lines) = self.script.borrow_mut().pop_front().unwrap_or((0, vec![]));
            fs::create_dir_all(log_path.parent().unwrap()).unwrap();
            fs::write(log_path, lines.join("\n")).unwrap();
            if let Some(xml) = self.coverage_xml.as_ref() {
                fs::create_dir_all(self.report_path.parent().unwrap()).unwrap();
                fs::write(&self.report_path, xml).unwrap();
            }
            Ok(ToolOutput {
                exit_code,
                lines: lines.into_iter().map(String::from).collect(),
            })
        }
    }

    fn setup(cli: CliOverrides) -> (TempDir, Effective) {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Arena.uproject"), "{}").unwrap();
        fs::create_dir_all(root.join("engine")).unwrap();
        let pd = project::locate(root).unwrap();
        let cli = CliOverrides {
            engine_root: Some("engine".into()),
            platform: Some("Linux".into()),
            ..cli
        };
        let eff = merge(&cli, GateConfig::default(), pd, root.to_path_buf()).unwrap();
        (dir, eff)
    }

    #[test]
    fn test_plans_follow_build_order() {
        let (_d, eff) = setup(CliOverrides::default());
        let names: Vec<String> = ci_plan(&eff).iter().map(Step::name).collect();
        assert_eq!(
            names,
            vec![
                "editor-debug",
                "editor-development",
                "game-debug",
                "game-development",
                "game-shipping",
                "package-development",
                "package-shipping",
                "test",
            ]
        );
    }

    #[test]
    fn test_build_invocation_shape() {
        let (_d, eff) = setup(CliOverrides::default());
        let runner = FakeRunner::new(vec![]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let inv = p.build_invocation("ArenaEditor", BuildConfig::Development).unwrap();
        assert_eq!(&inv.args[..3], &["ArenaEditor", "Linux", "Development"]);
        assert!(inv.args[3].starts_with("-Project="));
        assert!(inv.args[3].ends_with("Arena.uproject"));
        assert_eq!(inv.cwd, eff.project.root_dir);
    }

    #[test]
    fn test_short_circuits_on_first_failure() {
        let (_d, eff) = setup(CliOverrides::default());
        let runner = FakeRunner::new(vec![(0, vec!["ok"]), (6, vec!["ERROR: link"])]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (report, res) = p.run(&build_plan(&eff));
        assert!(matches!(
            res,
            Err(GateError::ProcessFailure { code: 6, .. })
        ));
        assert_eq!(runner.calls.borrow().len(), 2);
        assert_eq!(report.steps.len(), 2);
        assert_eq!(report.steps[1].status, StepStatus::Failed);
        assert!(!report.passed());
    }

    #[test]
    fn test_zero_exit_with_warning_fails_gate() {
        let (_d, eff) = setup(CliOverrides::default());
        let runner = FakeRunner::new(vec![(
            0,
            vec![
                "WARNING: Success - 0 error(s), 0 warning(s)",
                "WARNING: deprecated API used",
            ],
        )]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (report, res) = p.run(&[Step::Package {
            configuration: BuildConfig::Shipping,
        }]);
        assert!(matches!(res, Err(GateError::QualityGate { .. })));
        let step = &report.steps[0];
        assert_eq!(step.log_summary.as_ref().unwrap().warnings, 1);
        assert_eq!(step.issues.len(), 1);
        assert_eq!(step.issues[0].text, "WARNING: deprecated API used");
    }

    #[test]
    fn test_package_failure_removes_partial_archive() {
        let (_d, eff) = setup(CliOverrides::default());
        let partial = eff.archive_dir.join("Shipping");
        fs::create_dir_all(&partial).unwrap();
        let runner = FakeRunner::new(vec![(1, vec![])]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (_r, res) = p.run(&[Step::Package {
            configuration: BuildConfig::Shipping,
        }]);
        assert!(res.is_err());
        assert!(!partial.exists());
    }

    #[test]
    fn test_missing_engine_root_is_configuration_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Arena.uproject"), "{}").unwrap();
        let pd = project::locate(dir.path()).unwrap();
        let eff = merge(
            &CliOverrides::default(),
            GateConfig::default(),
            pd,
            dir.path().to_path_buf(),
        )
        .unwrap();
        let runner = FakeRunner::new(vec![]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (_r, res) = p.run(&[Step::Test]);
        assert!(matches!(res, Err(GateError::Configuration(_))));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_tests_without_report_skip_coverage() {
        let (_d, eff) = setup(CliOverrides::default());
        let runner = FakeRunner::new(vec![(0, vec!["Automation test passed"])]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (report, res) = p.run(&[Step::Test]);
        assert!(res.is_ok());
        assert_eq!(report.steps[0].coverage, Some(GateResult::Skipped));
    }

    #[test]
    fn test_stale_report_is_removed_before_tests() {
        let (_d, eff) = setup(CliOverrides::default());
        fs::create_dir_all(&eff.coverage_dir).unwrap();
        fs::write(&eff.coverage_report, r#"<coverage line-rate="0.1"/>"#).unwrap();
        let runner = FakeRunner::new(vec![(0, vec![])]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (_r, res) = p.run(&[Step::Test]);
        assert!(res.is_ok());
        assert!(!eff.coverage_report.exists());
    }

    #[test]
    fn test_coverage_below_threshold_fails_with_details() {
        let (dir, mut eff) = setup(CliOverrides {
            threshold: Some(90.0),
            ..Default::default()
        });
        fs::create_dir_all(dir.path().join("Source")).unwrap();
        fs::write(dir.path().join("Source/Hero.cpp"), "a\nb\n").unwrap();
        eff.coverage_enabled = true;
        eff.tools.as_mut().unwrap().coverage = Some(PathBuf::from("/opt/cov"));

        let mut runner = FakeRunner::new(vec![(0, vec![])]);
        runner.report_path = eff.coverage_report.clone();
        runner.coverage_xml = Some(
            r#"<coverage line-rate="0.5"><class filename="Source/Hero.cpp"><lines><line number="1" hits="1"/><line number="2" hits="0"/></lines></class></coverage>"#
                .to_string(),
        );
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (report, res) = p.run(&[Step::Test]);
        assert!(matches!(res, Err(GateError::QualityGate { .. })));

        let call = &runner.calls.borrow()[0];
        assert_eq!(call.program, PathBuf::from("/opt/cov"));
        assert!(call.args.iter().any(|a| a.starts_with("cobertura:")));

        match report.steps[0].coverage.as_ref().unwrap() {
            GateResult::Fail {
                coverage_pct,
                uncovered,
                ..
            } => {
                assert_eq!(*coverage_pct, 50.0);
                assert_eq!(uncovered.len(), 1);
                assert_eq!(uncovered[0].line_text, "b");
            }
            other => panic!("expected fail, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_removes_matching_paths_only() {
        let (dir, eff) = setup(CliOverrides::default());
        let root = dir.path();
        for d in ["Binaries/Linux", "Intermediate", "Plugins/Inv/Binaries", "Content"] {
            fs::create_dir_all(root.join(d)).unwrap();
        }
        fs::create_dir_all(&eff.log_dir).unwrap();
        let runner = FakeRunner::new(vec![]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (report, res) = p.run(&[Step::Clean]);
        assert!(res.is_ok());
        assert!(!root.join("Binaries").exists());
        assert!(!root.join("Intermediate").exists());
        assert!(!root.join("Plugins/Inv/Binaries").exists());
        assert!(!eff.log_dir.exists());
        assert!(root.join("Content").exists());
        assert!(root.join("Arena.uproject").exists());
        assert_eq!(report.steps[0].detail.as_deref(), Some("removed 4 path(s)"));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_clean_never_leaves_the_project_root() {
        let (dir, mut eff) = setup(CliOverrides::default());
        let root = dir.path();
        let sibling = tempdir().unwrap();
        let precious = sibling.path().join("precious");
        fs::create_dir_all(&precious).unwrap();
        let rel = pathdiff::diff_paths(&precious, root).unwrap();
        eff.clean_patterns = vec![rel.to_string_lossy().to_string()];
        let runner = FakeRunner::new(vec![]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (report, res) = p.run(&[Step::Clean]);
        assert!(res.is_ok());
        assert!(precious.exists());
        assert_eq!(report.steps[0].detail.as_deref(), Some("removed 0 path(s)"));
    }

    #[test]
    fn test_clean_root_with_glob_characters() {
        let dir = tempfile::Builder::new().prefix("proj[1]-").tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("Arena.uproject"), "{}").unwrap();
        fs::create_dir_all(root.join("Binaries/Linux")).unwrap();
        let pd = project::locate(root).unwrap();
        let eff = merge(&CliOverrides::default(), GateConfig::default(), pd, root.to_path_buf())
            .unwrap();
        let runner = FakeRunner::new(vec![]);
        let p = Pipeline::new(&eff, &runner).unwrap();
        let (_, res) = p.run(&[Step::Clean]);
        assert!(res.is_ok());
        assert!(!root.join("Binaries").exists());
        assert!(root.join("Arena.uproject").exists());
    }
}
