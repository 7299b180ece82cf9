//! Configuration discovery and effective settings resolution.
//!
//! buildgate reads `buildgate.toml|yaml|yml` from the project root (the
//! directory holding the `*.uproject` descriptor) and merges it with CLI
//! flags into an [`Effective`] config. Resolution happens once, at the CLI
//! boundary; pipeline steps never consult the environment.
//!
//! Defaults:
//! - `platform`: host platform (`Linux`, `Mac`, `Win64`)
//! - `output`: `human`
//! - `build.editor_target`: `<Project>Editor`, `build.game_target`: `<Project>`
//! - `package.configurations`: `["Development", "Shipping"]`
//! - `test.filter`: `Project`, `test.threshold`: 100.0
//! - `paths.logs`: `Saved/BuildGate/Logs`
//! - `paths.coverage`: `Saved/BuildGate/Coverage`
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::coverage::SourceResolver;
use crate::error::{GateError, Result};
use crate::project::{self, ProjectDescriptor};
use crate::toolchain::{self, BuildConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Default, Deserialize, Clone)]
/// Tool path overrides under `[tools]`, relative to `engine_root` unless absolute.
pub struct ToolsCfg {
    pub build: Option<String>,
    pub package: Option<String>,
    pub test: Option<String>,
    pub coverage: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct BuildCfg {
    pub editor_target: Option<String>,
    pub game_target: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct PackageCfg {
    pub configurations: Option<Vec<String>>,
    pub archive_dir: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct TestCfg {
    pub map: Option<String>,
    pub filter: Option<String>,
    pub threshold: Option<f64>,
    /// Wrap the test runner with the coverage tool
    pub coverage: Option<bool>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CoverageCfg {
    /// Report path relative to the project root
    pub report: Option<String>,
    /// Source-repository URL prefix stripped from report file references
    pub repo_url_prefix: Option<String>,
    pub plugin_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ClassifyCfg {
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CleanCfg {
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct PathsCfg {
    pub logs: Option<String>,
    pub coverage: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
/// Root configuration loaded from `buildgate.toml|yaml`.
pub struct GateConfig {
    pub engine_root: Option<String>,
    pub platform: Option<String>,
    pub output: Option<String>,
    pub tools: Option<ToolsCfg>,
    pub build: Option<BuildCfg>,
    pub package: Option<PackageCfg>,
    pub test: Option<TestCfg>,
    pub coverage: Option<CoverageCfg>,
    pub classify: Option<ClassifyCfg>,
    pub clean: Option<CleanCfg>,
    pub paths: Option<PathsCfg>,
}

#[derive(Debug, Default, Clone)]
/// Values supplied on the command line.
pub struct CliOverrides {
    pub project_dir: Option<String>,
    pub engine_root: Option<String>,
    pub platform: Option<String>,
    pub output: Option<String>,
    pub threshold: Option<f64>,
    pub coverage: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub build: PathBuf,
    pub package: PathBuf,
    pub test: PathBuf,
    pub coverage: Option<PathBuf>,
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub project: ProjectDescriptor,
    pub work_dir: PathBuf,
    pub engine_root: Option<PathBuf>,
    pub tools: Option<ToolPaths>,
    pub platform: String,
    pub output: String,
    pub editor_target: String,
    pub game_target: String,
    pub build_extra: Vec<String>,
    pub package_configs: Vec<BuildConfig>,
    pub archive_dir: PathBuf,
    pub package_extra: Vec<String>,
    pub test_map: Option<String>,
    pub test_filter: String,
    pub test_extra: Vec<String>,
    pub threshold: f64,
    pub coverage_enabled: bool,
    pub coverage_report: PathBuf,
    pub coverage_dir: PathBuf,
    pub repo_url_prefix: Option<String>,
    pub plugin_marker: String,
    pub ignore_patterns: Vec<String>,
    pub clean_patterns: Vec<String>,
    pub log_dir: PathBuf,
}

impl Effective {
    /// Tool paths, or a configuration error when no engine root is set.
    pub fn require_tools(&self) -> Result<&ToolPaths> {
        self.tools.as_ref().ok_or_else(|| {
            GateError::Configuration(
                "engine_root is not configured. Pass --engine-root or set it in buildgate.toml."
                    .to_string(),
            )
        })
    }

    /// Resolver for coverage file references within this project.
    pub fn source_resolver(&self) -> SourceResolver {
        let mut r = SourceResolver::new(self.work_dir.clone(), self.project.root_dir.clone());
        r.repo_url_prefix = self.repo_url_prefix.clone();
        r.plugin_marker = self.plugin_marker.clone();
        r
    }

    pub fn log_path(&self, step: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", step))
    }
}

/// Load `GateConfig` from `buildgate.toml` or `buildgate.yaml|yml` if present.
///
/// A file that exists but does not parse is a configuration error.
pub fn load_config(root: &Path) -> Result<Option<GateConfig>> {
    let toml_path = root.join("buildgate.toml");
    if toml_path.exists() {
        let s = fs::read_to_string(&toml_path).map_err(|e| GateError::io(&toml_path, e))?;
        let cfg: GateConfig = toml::from_str(&s).map_err(|e| {
            GateError::Configuration(format!("{}: {}", toml_path.display(), e))
        })?;
        return Ok(Some(cfg));
    }
    for yml in ["buildgate.yaml", "buildgate.yml"] {
        let p = root.join(yml);
        if p.exists() {
            let s = fs::read_to_string(&p).map_err(|e| GateError::io(&p, e))?;
            let cfg: GateConfig = serde_yaml::from_str(&s)
                .map_err(|e| GateError::Configuration(format!("{}: {}", p.display(), e)))?;
            return Ok(Some(cfg));
        }
    }
    Ok(None)
}

const DEFAULT_CLEAN: [&str; 4] = [
    "Binaries",
    "Intermediate",
    "Plugins/*/Binaries",
    "Plugins/*/Intermediate",
];

/// Resolve `Effective` by locating the project and merging CLI flags,
/// discovered config, and defaults.
/// Reject thresholds outside `0..=100`, NaN included.
pub fn validate_threshold(threshold: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&threshold) {
        return Err(GateError::Configuration(format!(
            "coverage threshold {} outside 0..=100",
            threshold
        )));
    }
    Ok(threshold)
}

/// Clean patterns must stay relative to the project root.
fn validate_clean_pattern(pat: &str) -> Result<()> {
    let path = Path::new(pat);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if pat.trim().is_empty() || escapes {
        return Err(GateError::Configuration(format!(
            "clean pattern '{}' must be a relative path inside the project",
            pat
        )));
    }
    Ok(())
}

pub fn resolve_effective(cli: &CliOverrides) -> Result<Effective> {
    let work_dir = std::env::current_dir().map_err(|e| GateError::io(".", e))?;
    let start = cli
        .project_dir
        .as_deref()
        .map(|p| work_dir.join(p))
        .unwrap_or_else(|| work_dir.clone());
    let project = project::locate(&start)?;
    let cfg = load_config(&project.root_dir)?.unwrap_or_default();
    merge(cli, cfg, project, work_dir)
}

/// Pure merge step of [`resolve_effective`].
pub fn merge(
    cli: &CliOverrides,
    cfg: GateConfig,
    project: ProjectDescriptor,
    work_dir: PathBuf,
) -> Result<Effective> {
    let root = project.root_dir.clone();

    let output = cli
        .output
        .clone()
        .or(cfg.output)
        .unwrap_or_else(|| "human".to_string());
    if output != "human" && output != "json" {
        return Err(GateError::Configuration(format!(
            "unknown output mode '{}' (expected human|json)",
            output
        )));
    }

    let platform = cli
        .platform
        .clone()
        .or(cfg.platform)
        .unwrap_or_else(|| toolchain::host_platform().to_string());

    let engine_root = cli
        .engine_root
        .clone()
        .or(cfg.engine_root)
        .map(|p| work_dir.join(p));
    if let Some(er) = engine_root.as_ref() {
        if !er.is_dir() {
            return Err(GateError::Configuration(format!(
                "engine_root does not exist: {}",
                er.display()
            )));
        }
    }
    let tools_cfg = cfg.tools.unwrap_or_default();
    let tools = engine_root.as_ref().map(|er| ToolPaths {
        build: tools_cfg
            .build
            .as_deref()
            .map(|t| toolchain::resolve_tool(er, t))
            .unwrap_or_else(|| toolchain::default_build_tool(er)),
        package: tools_cfg
            .package
            .as_deref()
            .map(|t| toolchain::resolve_tool(er, t))
            .unwrap_or_else(|| toolchain::default_package_tool(er)),
        test: tools_cfg
            .test
            .as_deref()
            .map(|t| toolchain::resolve_tool(er, t))
            .unwrap_or_else(|| toolchain::default_test_tool(er)),
        coverage: tools_cfg
            .coverage
            .as_deref()
            .map(|t| toolchain::resolve_tool(er, t)),
    });

    let build = cfg.build.unwrap_or_default();
    let editor_target = build
        .editor_target
        .unwrap_or_else(|| format!("{}Editor", project.project_name));
    let game_target = build
        .game_target
        .unwrap_or_else(|| project.project_name.clone());

    let package = cfg.package.unwrap_or_default();
    let package_configs = match package.configurations {
        Some(names) => names
            .iter()
            .map(|n| {
                BuildConfig::parse(n).ok_or_else(|| {
                    GateError::Configuration(format!("unknown package configuration '{}'", n))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => vec![BuildConfig::Development, BuildConfig::Shipping],
    };
    let archive_dir = root.join(package.archive_dir.as_deref().unwrap_or("Saved/Archive"));

    let test = cfg.test.unwrap_or_default();
    let threshold = validate_threshold(cli.threshold.or(test.threshold).unwrap_or(100.0))?;
    let coverage_enabled = cli.coverage.or(test.coverage).unwrap_or(false);
    if coverage_enabled && tools.as_ref().is_some_and(|t| t.coverage.is_none()) {
        return Err(GateError::Configuration(
            "test coverage is enabled but [tools].coverage is not set".to_string(),
        ));
    }

    let paths = cfg.paths.unwrap_or_default();
    let log_dir = root.join(paths.logs.as_deref().unwrap_or("Saved/BuildGate/Logs"));
    let coverage_dir = root.join(
        paths
            .coverage
            .as_deref()
            .unwrap_or("Saved/BuildGate/Coverage"),
    );

    let cov = cfg.coverage.unwrap_or_default();
    let coverage_report = match cov.report.as_deref() {
        Some(r) => root.join(r),
        None => coverage_dir.join("coverage.xml"),
    };

    let mut clean_patterns: Vec<String> = cfg
        .clean
        .and_then(|c| c.patterns)
        .unwrap_or_else(|| DEFAULT_CLEAN.iter().map(|s| s.to_string()).collect());
    for pat in &clean_patterns {
        validate_clean_pattern(pat)?;
    }
    for dir in [&log_dir, &coverage_dir] {
        if let Some(rel) = pathdiff::diff_paths(dir, &root) {
            let rel = rel.to_string_lossy().replace('\\', "/");
            if !rel.starts_with("..") && !clean_patterns.contains(&rel) {
                clean_patterns.push(rel);
            }
        }
    }

    Ok(Effective {
        project,
        work_dir,
        engine_root,
        tools,
        platform,
        output,
        editor_target,
        game_target,
        build_extra: build.extra_args,
        package_configs,
        archive_dir,
        package_extra: package.extra_args,
        test_map: test.map,
        test_filter: test.filter.unwrap_or_else(|| "Project".to_string()),
        test_extra: test.extra_args,
        threshold,
        coverage_enabled,
        coverage_report,
        coverage_dir,
        repo_url_prefix: cov.repo_url_prefix,
        plugin_marker: cov.plugin_marker.unwrap_or_else(|| "Plugins/".to_string()),
        ignore_patterns: cfg.classify.map(|c| c.ignore).unwrap_or_default(),
        clean_patterns,
        log_dir,
    })
}
