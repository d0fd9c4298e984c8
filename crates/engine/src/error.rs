use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Settings file parse / deserialization error.
    ConfigParse(String),
    /// Malformed, empty, or missing field mapping; invalid settings.
    Config(String),
    /// Text extraction failed for one document. Never fatal to a job.
    Extraction { document: String, message: String },
    /// Reading or writing a sheet, PDF, or archive failed.
    Io(String),
    /// The job ran past its deadline.
    Timeout { limit: Duration },
    /// A worker thread panicked.
    Worker(String),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Stable reason code reported for job-level failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) | Self::Config(_) => "config_error",
            Self::Extraction { .. } => "extraction_error",
            Self::Io(_) => "io_error",
            Self::Timeout { .. } => "timeout",
            Self::Worker(_) => "worker_failed",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Extraction { document, message } => {
                write!(f, "document '{document}': text extraction failed: {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Timeout { limit } => {
                write!(f, "job exceeded its time limit of {}s", limit.as_secs_f64())
            }
            Self::Worker(msg) => write!(f, "worker failed: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
