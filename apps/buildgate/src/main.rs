//! buildgate CLI binary entry point.
//! Resolves configuration once, dispatches to the library, and maps errors
//! to exit codes (2 for setup problems, 1 for failed steps or gates).

use buildgate::classify::{self, Classifier};
use buildgate::cli::{Cli, Commands, EngineArgs, GlobalArgs};
use buildgate::config::{self, CliOverrides, Effective};
use buildgate::coverage::{self, SourceResolver};
use buildgate::error::{GateError, Result};
use buildgate::pipeline::{self, Pipeline, Step};
use buildgate::runner::ProcessRunner;
use buildgate::{output, project};
use clap::Parser;
use std::path::PathBuf;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.global.quiet, cli.global.verbose) {
        eprintln!("{} {}", output::error_prefix(), e);
        std::process::exit(e.exit_code());
    }
    if let Err(e) = run(cli) {
        eprintln!("{} {}", output::error_prefix(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("BUILDGATE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| GateError::Configuration(format!("failed to initialize logging: {}", e)))
}

fn overrides(
    global: &GlobalArgs,
    engine: Option<&EngineArgs>,
    threshold: Option<f64>,
    coverage: bool,
) -> CliOverrides {
    CliOverrides {
        project_dir: global.project_dir.clone(),
        engine_root: engine.and_then(|e| e.engine_root.clone()),
        platform: engine.and_then(|e| e.platform.clone()),
        output: global.output.clone(),
        threshold,
        coverage: if coverage { Some(true) } else { None },
    }
}

fn cwd() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| GateError::io(".", e))
}

/// Run a plan with real processes, print the report, and surface the first error.
fn run_plan(eff: &Effective, plan: impl Fn(&Effective) -> Vec<Step>) -> Result<()> {
    // Echo tool output only in human mode so JSON stays parseable
    let runner = ProcessRunner::new(eff.output != "json");
    let pipeline = Pipeline::new(eff, &runner)?;
    let (report, res) = pipeline.run(&plan(eff));
    output::print_pipeline(&report, &eff.project.root_dir, &eff.output);
    res
}

fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    let plain_output = global.output.clone().unwrap_or_else(|| "human".to_string());
    if plain_output != "human" && plain_output != "json" {
        return Err(GateError::Configuration(format!(
            "unknown output mode '{}' (expected human|json)",
            plain_output
        )));
    }
    match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Locate => {
            let start = match global.project_dir.as_deref() {
                Some(p) => cwd()?.join(p),
                None => cwd()?,
            };
            let pd = project::locate(&start)?;
            output::print_project(&pd, &plain_output);
            Ok(())
        }
        Commands::Build { engine } => {
            let eff = config::resolve_effective(&overrides(&global, Some(&engine), None, false))?;
            run_plan(&eff, pipeline::build_plan)
        }
        Commands::Package { engine } => {
            let eff = config::resolve_effective(&overrides(&global, Some(&engine), None, false))?;
            run_plan(&eff, pipeline::package_plan)
        }
        Commands::Test {
            engine,
            threshold,
            coverage,
        } => {
            let eff = config::resolve_effective(&overrides(
                &global,
                Some(&engine),
                threshold,
                coverage,
            ))?;
            run_plan(&eff, |_| vec![Step::Test])
        }
        Commands::Ci {
            engine,
            threshold,
            coverage,
        } => {
            let eff = config::resolve_effective(&overrides(
                &global,
                Some(&engine),
                threshold,
                coverage,
            ))?;
            run_plan(&eff, pipeline::ci_plan)
        }
        Commands::Clean => {
            let eff = config::resolve_effective(&overrides(&global, None, None, false))?;
            run_plan(&eff, |_| vec![Step::Clean])
        }
        Commands::Classify { log } => {
            // Extra ignore patterns apply when run inside a configured project
            let ignore = match config::resolve_effective(&overrides(&global, None, None, false)) {
                Ok(eff) => eff.ignore_patterns,
                Err(GateError::NotFound { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            let classifier = Classifier::new(&ignore)?;
            let path = cwd()?.join(&log);
            let lines = classifier.classify_file(&path)?;
            let summary = classify::summarize(&lines);
            output::print_classification(&lines, &summary, &plain_output);
            if summary.has_issues {
                return Err(GateError::QualityGate {
                    step: "classify".into(),
                    reason: format!(
                        "{} error(s), {} warning(s) in {}",
                        summary.errors, summary.warnings, log
                    ),
                });
            }
            Ok(())
        }
        Commands::Coverage { report, threshold } => {
            let work_dir = cwd()?;
            let cli_overrides = overrides(&global, None, threshold, false);
            let (resolver, threshold) = match config::resolve_effective(&cli_overrides) {
                Ok(eff) => (eff.source_resolver(), eff.threshold),
                Err(GateError::NotFound { .. }) => {
                    eprintln!(
                        "{} no project descriptor found; resolving sources from the current directory",
                        output::note_prefix()
                    );
                    (
                        SourceResolver::new(work_dir.clone(), work_dir.clone()),
                        config::validate_threshold(threshold.unwrap_or(100.0))?,
                    )
                }
                Err(e) => return Err(e),
            };
            let res = coverage::evaluate_path(&work_dir.join(&report), threshold, &resolver)?;
            output::print_gate(&res, &resolver.project_root, &plain_output);
            if let coverage::GateResult::Fail { coverage_pct, .. } = res {
                return Err(GateError::QualityGate {
                    step: "coverage".into(),
                    reason: format!(
                        "coverage {:.2}% below threshold {:.2}%",
                        coverage_pct, threshold
                    ),
                });
            }
            Ok(())
        }
    }
}
