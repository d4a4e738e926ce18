use std::fmt;

use thiserror::Error;

/// Primitive transcoder operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeOperation {
    Probe,
    Trim,
    Silence,
    Tempo,
    Concat,
    SilenceDetect,
    Version,
}

impl fmt::Display for TranscodeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TranscodeOperation::Probe => "probe",
            TranscodeOperation::Trim => "trim",
            TranscodeOperation::Silence => "silence",
            TranscodeOperation::Tempo => "tempo",
            TranscodeOperation::Concat => "concat",
            TranscodeOperation::SilenceDetect => "silence-detect",
            TranscodeOperation::Version => "version",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DubsyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcoder {operation} failed: {cause}")]
    Transcode {
        operation: TranscodeOperation,
        cause: String,
    },

    #[error("Assembly error: {0}")]
    Assembly(String),

    #[error("Cancelled during {phase} after {completed}/{total} segments")]
    Cancelled {
        phase: &'static str,
        completed: usize,
        total: usize,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl DubsyncError {
    pub fn transcode<S: Into<String>>(operation: TranscodeOperation, cause: S) -> Self {
        DubsyncError::Transcode {
            operation,
            cause: cause.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DubsyncError>;
