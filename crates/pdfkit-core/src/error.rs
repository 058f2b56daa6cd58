use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failed pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    Read,
    Assembly,
    Cancelled,
}

/// Batch or form input rejected before any I/O
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please select at least {required} files (got {actual})")]
    TooFewInputs { required: usize, actual: usize },

    #[error("Input {index} ({name}) has unsupported type {mime_type}")]
    UnsupportedType {
        index: usize,
        name: String,
        mime_type: String,
    },

    #[error("{name} is {actual} bytes; files must be smaller than {limit} bytes")]
    TooLarge {
        name: String,
        limit: u64,
        actual: u64,
    },

    #[error("Password must not be empty")]
    EmptyPassword,

    #[error("Passwords do not match")]
    PasswordMismatch,
}

impl ValidationError {
    /// Index of the offending input, when a single input is at fault
    pub fn index(&self) -> Option<usize> {
        match self {
            ValidationError::UnsupportedType { index, .. } => Some(*index),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name}: expected {expected} bytes, read {actual}")]
    LengthMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
}

/// Failure reported by a document builder
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Encrypted documents cannot be merged")]
    Encrypted,

    #[error("PDF has no pages")]
    NoPages,

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Terminal failure of one assembler run
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Invalid batch: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to read input {index}: {source}")]
    Read {
        index: usize,
        #[source]
        source: ReadError,
    },

    #[error("Failed to assemble input {index}: {source}")]
    Assembly {
        index: usize,
        #[source]
        source: BuildError,
    },

    #[error("Failed to finalize document: {0}")]
    Finalize(#[source] BuildError),

    #[error("Assembly cancelled")]
    Cancelled,
}

impl AssemblyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssemblyError::Validation(_) => ErrorKind::Validation,
            AssemblyError::Read { .. } => ErrorKind::Read,
            AssemblyError::Assembly { .. } | AssemblyError::Finalize(_) => ErrorKind::Assembly,
            AssemblyError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 0-based index of the input that failed, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            AssemblyError::Validation(e) => e.index(),
            AssemblyError::Read { index, .. } | AssemblyError::Assembly { index, .. } => {
                Some(*index)
            }
            AssemblyError::Finalize(_) | AssemblyError::Cancelled => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InspectError {
    #[error("File too small to be a valid PDF")]
    TooSmall,

    #[error("Not a valid PDF file (missing %PDF- header)")]
    MissingHeader,

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF has no pages")]
    NoPages,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to read upload: {0}")]
    Read(#[from] ReadError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },
}
