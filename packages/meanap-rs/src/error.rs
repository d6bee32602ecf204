use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One decoder's verdict on a file it could not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeAttempt {
    pub decoder: &'static str,
    pub message: String,
}

impl fmt::Display for DecodeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.decoder, self.message)
    }
}

fn join_attempts(attempts: &[DecodeAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum MeaError {
    #[error("Experiment directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Unrecognized file format for {} ({})", path.display(), join_attempts(attempts))]
    FileFormatUnrecognized {
        path: PathBuf,
        attempts: Vec<DecodeAttempt>,
    },

    #[error("Corrupt {decoder} file {}: {reason}", path.display())]
    CorruptFile {
        path: PathBuf,
        decoder: &'static str,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MeaError>;
