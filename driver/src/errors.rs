use thiserror::Error;

/// Errors that can occur while running a job.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Configuration error (argument count, path length, launcher environment, settings file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error with the file or field being processed
    #[error("IO error: {context}: {source}")]
    IoContext {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error occurred (file operations, sockets, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Coordinator and worker disagree about what comes next on the wire
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer connection could not be established or was lost
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Kernel failures under the `fail` policy
    #[error("Kernel error: {0}")]
    Kernel(String),

    /// The coordinator broadcast EXIT before distributing work
    #[error("Job aborted by coordinator")]
    Aborted,
}

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

impl DriverError {
    /// Wrap an IO error with the file or field that was being processed.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DriverError::IoContext {
            context: context.into(),
            source,
        }
    }

    /// Process exit status for this error.
    ///
    /// `Aborted` is the designed worker shutdown path and exits cleanly.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::Aborted => 0,
            DriverError::Config(_) => 2,
            DriverError::IoContext { .. } | DriverError::Io(_) => 3,
            DriverError::Protocol(_) => 4,
            DriverError::Transport(_) => 5,
            DriverError::Kernel(_) => 6,
            DriverError::Serialization(_) => 7,
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for DriverError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        DriverError::Serialization(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for DriverError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        DriverError::Serialization(e.to_string())
    }
}
