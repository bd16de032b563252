use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run or a single file's filtering job.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// An alignment whose tags or CIGAR cannot be interpreted. The file is
    /// presumed corrupt.
    #[error("Malformed record {name} (tid={tid}, pos={pos}): {detail}")]
    MalformedRecord {
        name: String,
        tid: i32,
        pos: i64,
        detail: String,
    },

    #[error("Invalid reference pattern {pattern}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("External tool error: {tool} - {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Failed to write report: {0}")]
    Report(#[from] serde_json::Error),
}

impl FilterError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn external_tool<S: Into<String>>(tool: S, message: S) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Process exit code used by the binary for this class of failure.
    pub fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            FilterError::Config { .. } | FilterError::Regex { .. } => exitcode::CONFIG,
            FilterError::Io { .. } | FilterError::Htslib(_) | FilterError::Report(_) => {
                exitcode::IOERR
            }
            FilterError::MalformedRecord { .. } => exitcode::DATAERR,
            FilterError::ExternalTool { .. } => exitcode::UNAVAILABLE,
        }
    }
}

pub type FilterResult<T> = Result<T, FilterError>;
