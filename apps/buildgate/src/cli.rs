//! CLI argument parsing via `clap`.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "buildgate",
    version,
    about = "Build, test, package, and clean a game project with strict quality gates",
    long_about = "buildgate drives the engine build tool and test runner, tees their output to per-step logs, fails on error/warning lines even when the tool exits 0, and gates test runs on line coverage.\n\nConfiguration precedence: CLI > buildgate.toml > defaults.",
    after_help = "Examples:\n  buildgate build --engine-root /opt/UE_5.4\n  buildgate test --threshold 85\n  buildgate ci --output json\n  buildgate classify Saved/BuildGate/Logs/game-shipping.log\n  buildgate coverage Saved/BuildGate/Coverage/coverage.xml --threshold 90",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Directory to start project discovery from (default: current dir)")]
    pub project_dir: Option<String>,
    #[arg(long, global = true, help = "Output mode: human|json (default: human)")]
    pub output: Option<String>,
    #[arg(short, long, global = true, action = clap::ArgAction::SetTrue, help = "Enable debug logging")]
    pub verbose: bool,
    #[arg(short, long, global = true, action = clap::ArgAction::SetTrue, help = "Only log errors")]
    pub quiet: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    #[arg(long, help = "Engine installation root")]
    pub engine_root: Option<String>,
    #[arg(long, help = "Target platform (default: host platform)")]
    pub platform: Option<String>,
}

#[derive(Subcommand)]
/// Supported subcommands.
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current buildgate version.")]
    Version,
    /// Print the discovered project
    #[command(
        about = "Locate the project",
        long_about = "Walk up from the start directory to the closest *.uproject and print it."
    )]
    Locate,
    #[command(
        about = "Build editor and game targets",
        long_about = "Build editor Debug/Development and game Debug/Development/Shipping in order, stopping at the first failure."
    )]
    Build {
        #[command(flatten)]
        engine: EngineArgs,
    },
    #[command(
        about = "Package the game",
        long_about = "Cook, stage, pak, and archive the game once per configured package configuration."
    )]
    Package {
        #[command(flatten)]
        engine: EngineArgs,
    },
    #[command(
        about = "Run automation tests",
        long_about = "Run the test runner, gate its log, then gate line coverage when a report is produced.",
        after_help = "Examples:\n  buildgate test --coverage --threshold 80"
    )]
    Test {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, help = "Minimum line coverage in percent (default: 100)")]
        threshold: Option<f64>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Wrap the test runner with the coverage tool")]
        coverage: bool,
    },
    #[command(
        about = "Build, package, and test",
        long_about = "Run the full pipeline: build, package, then test. Stops at the first failure."
    )]
    Ci {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, help = "Minimum line coverage in percent (default: 100)")]
        threshold: Option<f64>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Wrap the test runner with the coverage tool")]
        coverage: bool,
    },
    #[command(
        about = "Remove build artifacts",
        long_about = "Delete build outputs matched by [clean].patterns plus the log and coverage directories."
    )]
    Clean,
    #[command(
        about = "Classify a captured log",
        long_about = "Classify each line of a log as error, warning, or ignored. Exits 1 when issues are found."
    )]
    Classify {
        #[arg(help = "Path to the log file")]
        log: String,
    },
    #[command(
        about = "Evaluate a coverage report",
        long_about = "Compare a Cobertura XML report with a threshold and list uncovered source lines on failure. A missing report passes."
    )]
    Coverage {
        #[arg(help = "Path to the coverage XML report")]
        report: String,
        #[arg(long, help = "Minimum line coverage in percent (default: 100)")]
        threshold: Option<f64>,
    },
}
