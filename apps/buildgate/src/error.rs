//! Error taxonomy shared by every pipeline step.
//!
//! Nothing is retried. Each variant maps to a process exit code through
//! [`GateError::exit_code`]: configuration-style problems exit with 2,
//! failures of the toolchain or of a quality gate exit with 1.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating, configuring, running, or gating a step.
#[derive(Debug, Error)]
pub enum GateError {
    /// Required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An expected external binary does not exist at its configured path.
    #[error("{tool} not found at {}", .path.display())]
    ToolNotFound { tool: String, path: PathBuf },

    /// An external process exited with a non-zero code.
    #[error("step '{step}' failed with exit code {code}")]
    ProcessFailure { step: String, code: i32 },

    /// An external process could not be started or awaited.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The log classifier or coverage gate rejected a successful run.
    #[error("quality gate failed for '{step}': {reason}")]
    QualityGate { step: String, reason: String },

    /// No project descriptor was found walking up from `start`.
    #[error("no project descriptor found above {}", .start.display())]
    NotFound { start: PathBuf },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The coverage report exists but could not be parsed.
    #[error("invalid coverage report {}: {reason}", .path.display())]
    CoverageParse { path: PathBuf, reason: String },
}

impl GateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GateError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GateError::Configuration(_)
            | GateError::ToolNotFound { .. }
            | GateError::NotFound { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_split_setup_from_failures() {
        assert_eq!(GateError::Configuration("x".into()).exit_code(), 2);
        assert_eq!(
            GateError::NotFound {
                start: PathBuf::from("/tmp")
            }
            .exit_code(),
            2
        );
        assert_eq!(
            GateError::ProcessFailure {
                step: "build".into(),
                code: 6
            }
            .exit_code(),
            1
        );
        assert_eq!(
            GateError::QualityGate {
                step: "test".into(),
                reason: "coverage".into()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_messages_name_the_step() {
        let e = GateError::ProcessFailure {
            step: "game-shipping".into(),
            code: 3,
        };
        assert_eq!(e.to_string(), "step 'game-shipping' failed with exit code 3");
    }
}
