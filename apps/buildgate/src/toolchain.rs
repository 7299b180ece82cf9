//! Engine toolchain layout: build configurations, host platform name, and
//! default tool locations relative to an engine root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Build configuration passed to the build and packaging tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildConfig {
    Debug,
    DebugGame,
    #[default]
    Development,
    Test,
    Shipping,
}

impl BuildConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildConfig::Debug => "Debug",
            BuildConfig::DebugGame => "DebugGame",
            BuildConfig::Development => "Development",
            BuildConfig::Test => "Test",
            BuildConfig::Shipping => "Shipping",
        }
    }

    /// Case-insensitive parse of a configuration name.
    pub fn parse(s: &str) -> Option<BuildConfig> {
        BuildConfig::all()
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }

    pub fn all() -> &'static [BuildConfig] {
        &[
            BuildConfig::Debug,
            BuildConfig::DebugGame,
            BuildConfig::Development,
            BuildConfig::Test,
            BuildConfig::Shipping,
        ]
    }
}

impl std::fmt::Display for BuildConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform name of the host as the build tool spells it.
pub fn host_platform() -> &'static str {
    if cfg!(windows) {
        "Win64"
    } else if cfg!(target_os = "macos") {
        "Mac"
    } else {
        "Linux"
    }
}

fn batch_files(engine_root: &Path) -> PathBuf {
    engine_root.join("Engine").join("Build").join("BatchFiles")
}

/// Default build script under the engine root.
pub fn default_build_tool(engine_root: &Path) -> PathBuf {
    batch_files(engine_root).join(if cfg!(windows) {
        "Build.bat"
    } else if cfg!(target_os = "macos") {
        "Mac/Build.sh"
    } else {
        "Linux/Build.sh"
    })
}

/// Default automation tool used for cook/stage/package.
pub fn default_package_tool(engine_root: &Path) -> PathBuf {
    batch_files(engine_root).join(if cfg!(windows) {
        "RunUAT.bat"
    } else {
        "RunUAT.sh"
    })
}

/// Default headless editor binary used to run automation tests.
pub fn default_test_tool(engine_root: &Path) -> PathBuf {
    let bin = engine_root.join("Engine").join("Binaries").join(host_platform());
    if cfg!(windows) {
        bin.join("UnrealEditor-Cmd.exe")
    } else if cfg!(target_os = "macos") {
        bin.join("UnrealEditor.app")
            .join("Contents")
            .join("MacOS")
            .join("UnrealEditor")
    } else {
        bin.join("UnrealEditor")
    }
}

/// Resolve a configured tool path: absolute paths are kept, relative ones
/// are taken from the engine root.
pub fn resolve_tool(engine_root: &Path, configured: &str) -> PathBuf {
    let p = Path::new(configured);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        engine_root.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_config_case_insensitive() {
        assert_eq!(BuildConfig::parse("shipping"), Some(BuildConfig::Shipping));
        assert_eq!(BuildConfig::parse(" DebugGame "), Some(BuildConfig::DebugGame));
        assert_eq!(BuildConfig::parse("Release"), None);
        assert_eq!(BuildConfig::default().to_string(), "Development");
    }

    #[test]
    fn test_tool_paths_live_under_engine_root() {
        let root = Path::new("/opt/UE_5.4");
        assert!(default_build_tool(root).starts_with("/opt/UE_5.4/Engine/Build/BatchFiles"));
        assert!(default_package_tool(root).starts_with("/opt/UE_5.4/Engine/Build/BatchFiles"));
        assert!(default_test_tool(root).starts_with("/opt/UE_5.4/Engine/Binaries"));
        assert_eq!(
            resolve_tool(root, "Tools/cov"),
            PathBuf::from("/opt/UE_5.4/Tools/cov")
        );
    }
}
