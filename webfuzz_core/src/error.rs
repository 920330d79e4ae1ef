use std::path::PathBuf;
use thiserror::Error;

/// Which part of the target lifecycle a supervisor failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStage {
    Start,
    Restart,
}

impl std::fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchStage::Start => write!(f, "start"),
            LaunchStage::Restart => write!(f, "restart"),
        }
    }
}

/// Fatal conditions that abort the run for one test-definition file.
///
/// Network failures and target crashes are not represented here: they are
/// recorded as catches in a `TestResult` and fuzzing continues.
#[derive(Error, Debug)]
pub enum FuzzError {
    /// A word-list file or generator backing a tag could not be resolved.
    #[error("Failed to load mutator for tag {tag}: {reason}")]
    Load { tag: String, reason: String },

    /// The test-definition document itself is unusable.
    #[error("Invalid test definition {path:?}: {reason}")]
    Definition { path: PathBuf, reason: String },

    /// A substituted template no longer parses as a request.
    #[error("Test case #{case} does not parse after substitution: {source}")]
    Parse {
        case: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The target never answered the health check.
    #[error("Target did not become ready at {url} after {attempts} attempts ({stage})")]
    HealthCheckTimeout {
        url: String,
        attempts: u32,
        stage: LaunchStage,
    },

    /// The target exited while we were waiting for it to become ready.
    #[error("Target exited before becoming ready ({stage}): {status}")]
    TargetExited { stage: LaunchStage, status: String },

    /// The target crashed during a case and could not be brought back.
    #[error("Target could not be restarted after crash in test case #{case}: {source}")]
    RestartFailed {
        case: usize,
        #[source]
        source: Box<FuzzError>,
    },

    #[error("Failed to spawn target {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Target I/O error: {0}")]
    Io(#[from] std::io::Error),
}
