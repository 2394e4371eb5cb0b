//! Error types for ferrodm

use thiserror::Error;

/// Result type for ferrodm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ferrodm operations
#[derive(Error, Debug)]
pub enum Error {
    /// MPI has already been initialized in this process
    #[error("MPI has already been initialized")]
    AlreadyInitialized,

    /// Incompatible shape, process count, halo depth or partition strategy.
    ///
    /// Detected at construction as a pure function of shared configuration,
    /// so every rank reports it identically.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Window registration or allocation failed (the group disagrees on
    /// buffer semantics, or windows leaked past teardown)
    #[error("resource error: {0}")]
    Resource(String),

    /// Malformed Matrix Market input
    #[error("parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number in the input (0 when the input ended early)
        line: usize,
        /// What was wrong with the line
        message: String,
    },

    /// I/O failure while reading input
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid rank specified
    #[error("Invalid rank: {0}")]
    InvalidRank(usize),

    /// Global row index outside the matrix
    #[error("row {0} is out of range")]
    RowOutOfRange(usize),

    /// Column index outside the matrix
    #[error("column {0} is out of range")]
    ColumnOutOfRange(usize),

    /// Row is not owned by the calling rank
    #[error("row {0} is not local to this rank")]
    NotLocal(usize),

    /// Invalid buffer provided (length mismatch)
    #[error("Invalid buffer")]
    InvalidBuffer,

    /// MPI call returned a non-success code
    #[error("MPI error (code {0})")]
    Mpi(i32),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::Parse`] for the given 1-based line.
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    /// Check an MPI return code, returning Ok(()) for success.
    pub fn check(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Error::Mpi(code))
        }
    }

    /// Whether this error is fatal for the whole group.
    ///
    /// Only parse and I/O errors are local to the caller; everything else
    /// means the ranks have diverged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Parse { .. } | Error::Io(_))
    }
}
