use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read archive {archive}: {message}")]
    ArchiveRead { archive: String, message: String },

    #[error("Failed to decompile {entry}: {source}")]
    Decompile {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Comparison cancelled")]
    Cancelled,

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CompareError {
    pub fn archive_read(archive: impl Into<String>, message: impl ToString) -> Self {
        CompareError::ArchiveRead {
            archive: archive.into(),
            message: message.to_string(),
        }
    }

    /// Stable kind name reported to users alongside the message
    pub fn kind(&self) -> &'static str {
        match self {
            CompareError::Io(_) => "IoError",
            CompareError::ArchiveRead { .. } => "ArchiveReadError",
            CompareError::Decompile { .. } => "DecompileError",
            CompareError::Cancelled => "CancelledError",
            CompareError::Render(_) => "RenderError",
            CompareError::Config(_) => "ConfigError",
            CompareError::Serialization(_) => "SerializationError",
        }
    }
}

pub type Result<T> = std::result::Result<T, CompareError>;

/// Formatter failures never abort a comparison; callers fall back to the
/// unformatted text.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatter {program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Formatter produced invalid UTF-8 for {0}")]
    InvalidOutput(String),
}
