use thiserror::Error;

/// Result type for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Error types that can occur while scheduling jobs and emitting charts
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Output sink error (I/O)
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid chart, dimension or variable definition
    #[error("chart error: {message}")]
    Chart { message: String },

    /// Invalid job configuration
    #[error("configuration error: {message}")]
    Config { message: String },

    /// No module registered under the requested name
    #[error("unknown module '{name}'")]
    UnknownModule { name: String },

    /// A module call panicked and was caught at the job's fault boundary
    #[error("module fault: {message}")]
    ModuleFault { message: String },
}

impl CollectorError {
    pub fn chart(message: impl Into<String>) -> Self {
        Self::Chart {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
