use std::convert::From;
use std::fmt;
use std::time::Duration;

use thiserror;

/// A single stage of a chain that exited with a non-zero code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: usize,
    pub program: String,
    pub code: i32,
    pub stderr: String,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage {} (`{}`) exited with code {}",
            self.stage + 1,
            self.program,
            self.code
        )?;
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            write!(f, "\n{stderr}")?;
        }
        Ok(())
    }
}

fn format_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Unable to start `{program}`: {reason}")]
    Spawn { program: String, reason: String },
    #[error("{}", format_failures(.0))]
    ChainFailed(Vec<StageFailure>),
    #[error("Timed out after {0:?} waiting for `{1}`")]
    Timeout(Duration, String),
    #[error("Cancelled while waiting for `{0}`")]
    Cancelled(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
