//! Error types for the index.
//!
//! All fallible operations in this crate return [`Result<T>`], whose error
//! type [`HashdexError`] distinguishes I/O failures, malformed on-disk
//! records, dictionary exhaustion and background compaction failures.

use std::path::PathBuf;

use thiserror::Error;

/// The error type for index operations.
#[derive(Error, Debug)]
pub enum HashdexError {
    /// Opening, seeking, reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialized postings text does not follow the codec grammar.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Every slot of the dictionary was probed without finding room.
    #[error("Dictionary is full: probed all {table_size} slots for term '{term}'")]
    SlotExhaustion { term: String, table_size: u64 },

    /// A delete or rename kept failing past the retry ceiling.
    #[error("Could not {operation} {path:?} after {attempts} attempts: {source}")]
    TransientFsConflict {
        operation: &'static str,
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A background merge failed; the index may be incomplete.
    #[error("Compaction failed: {0}")]
    Compaction(String),

    /// A segment found on disk failed validation at startup.
    #[error("Corrupt segment {path:?}: {reason}")]
    CorruptSegment { path: PathBuf, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The index was already cleaned up and accepts no more writes.
    #[error("Index is closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HashdexError {
    /// Create a malformed record error.
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        HashdexError::MalformedRecord(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        HashdexError::InvalidArgument(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        HashdexError::InvalidConfig(msg.into())
    }

    /// Create a compaction error.
    pub fn compaction<S: Into<String>>(msg: S) -> Self {
        HashdexError::Compaction(msg.into())
    }

    /// Create a corrupt segment error for the given file.
    pub fn corrupt_segment<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        HashdexError::CorruptSegment {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, HashdexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: HashdexError = io.into();
        assert!(matches!(err, HashdexError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_corrupt_segment_message() {
        let err = HashdexError::corrupt_segment("/tmp/x/dictionary_3", "length not a multiple of 12");
        let msg = err.to_string();
        assert!(msg.contains("dictionary_3"));
        assert!(msg.contains("multiple of 12"));
    }
}
