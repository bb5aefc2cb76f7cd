//! Error types for Unity container parsing

use thiserror::Error;

/// Result type for container parsing operations
pub type Result<T> = std::result::Result<T, FilesError>;

/// Errors that can occur while parsing Unity container formats
#[derive(Error, Debug)]
pub enum FilesError {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read, write or slice exceeded the bounds of the current view
    #[error("out of range: requested {requested} bytes, {available} available")]
    OutOfRange { requested: u64, available: u64 },

    /// Recognized but unimplemented compression type or container variant
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Declared size does not match the actual decoded byte count
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// A metadata region's computed size disagrees with the declared size
    #[error("{context}: read {actual} but expected {expected} bytes")]
    FormatMismatch {
        context: String,
        expected: u64,
        actual: u64,
    },

    /// Lookup of an object or resource found nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid data
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Invalid signature
    #[error("invalid signature: expected {expected}, got {actual}")]
    InvalidSignature { expected: String, actual: String },

    /// Any of the above, attributed to the input file it arose in
    #[error("{file}: {source}")]
    InFile {
        file: String,
        source: Box<FilesError>,
    },
}

impl FilesError {
    /// Create a new out-of-range error
    pub fn out_of_range(requested: u64, available: u64) -> Self {
        Self::OutOfRange {
            requested,
            available,
        }
    }

    /// Create a new unsupported format error
    pub fn unsupported<S: Into<String>>(what: S) -> Self {
        Self::UnsupportedFormat(what.into())
    }

    /// Create a new decompression failed error
    pub fn decompression_failed<S: Into<String>>(msg: S) -> Self {
        Self::DecompressionFailed(msg.into())
    }

    /// Create a decompression error for a declared/actual size disagreement
    pub fn decompression_mismatch(expected: u64, actual: u64) -> Self {
        Self::DecompressionFailed(format!(
            "size mismatch: expected {expected} bytes, got {actual}"
        ))
    }

    /// Create a new format mismatch error
    pub fn format_mismatch<S: Into<String>>(context: S, expected: u64, actual: u64) -> Self {
        Self::FormatMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a new invalid data error
    pub fn invalid_data<S: Into<String>>(msg: S) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a new invalid signature error
    pub fn invalid_signature<S: Into<String>>(expected: S, actual: S) -> Self {
        Self::InvalidSignature {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Attribute this error to a file. An error that already names one
    /// keeps its original, innermost attribution.
    pub fn in_file<S: Into<String>>(self, file: S) -> Self {
        match self {
            Self::InFile { .. } => self,
            other => Self::InFile {
                file: file.into(),
                source: Box::new(other),
            },
        }
    }
}

impl From<std::string::FromUtf8Error> for FilesError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::invalid_data(format!("invalid UTF-8 string: {err}"))
    }
}

impl From<std::str::Utf8Error> for FilesError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::invalid_data(format!("invalid UTF-8 string: {err}"))
    }
}

impl From<lz4_flex::block::DecompressError> for FilesError {
    fn from(err: lz4_flex::block::DecompressError) -> Self {
        Self::decompression_failed(format!("LZ4 block decode failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FilesError::out_of_range(16, 4);
        assert_eq!(err.to_string(), "out of range: requested 16 bytes, 4 available");

        let err = FilesError::format_mismatch("bundle metadata", 100, 96);
        assert_eq!(err.to_string(), "bundle metadata: read 96 but expected 100 bytes");
    }

    #[test]
    fn test_decompression_mismatch() {
        let err = FilesError::decompression_mismatch(30, 20);
        assert!(matches!(err, FilesError::DecompressionFailed(_)));
        assert!(err.to_string().contains("expected 30"));
    }

    #[test]
    fn test_in_file_attributes_once() {
        let err = FilesError::not_found("object 5")
            .in_file("level0.assets")
            .in_file("outer.bundle");
        assert_eq!(err.to_string(), "level0.assets: not found: object 5");
    }
}
