//! Error types for Cabriolet operations.
//!
//! One error enum covers the whole engine: I/O failures, structural
//! violations of container headers, codec-internal failures and bad caller
//! input. Container and codec layers construct these through the helper
//! constructors so message formatting stays in one place.

use std::io;
use thiserror::Error;

/// The main error type for Cabriolet operations.
#[derive(Debug, Error)]
pub enum CabrioletError {
    /// I/O error from the underlying handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural violation of a container header.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the structural violation.
        message: String,
    },

    /// Magic-byte mismatch.
    #[error("Bad signature: expected {expected:02x?}, found {found:02x?}")]
    Signature {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual bytes found.
        found: Vec<u8>,
    },

    /// Valid magic but internally inconsistent fields.
    #[error("Format error: {message}")]
    Format {
        /// Description of the inconsistency.
        message: String,
    },

    /// Codec-internal violation during decompression.
    #[error("Decompression error: {message}")]
    Decompress {
        /// Description of the violation.
        message: String,
    },

    /// The compressor could not encode the input.
    #[error("Compression error: {message}")]
    Compress {
        /// Description of the failure.
        message: String,
    },

    /// CAB XOR-32 (or OAB CRC-32) mismatch.
    #[error("Checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    Checksum {
        /// Expected value from the archive.
        expected: u32,
        /// Value computed over the data.
        computed: u32,
    },

    /// Unknown compression kind or unregistered algorithm.
    #[error("Unsupported format: {message}")]
    Unsupported {
        /// What was requested.
        message: String,
    },

    /// Bad caller input (range, category, missing file, ...).
    #[error("Invalid argument: {message}")]
    Argument {
        /// What was wrong with the input.
        message: String,
    },
}

/// Result type alias for Cabriolet operations.
pub type Result<T> = std::result::Result<T, CabrioletError>;

impl CabrioletError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a signature error.
    pub fn signature(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::Signature {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a decompression error.
    pub fn decompress(message: impl Into<String>) -> Self {
        Self::Decompress {
            message: message.into(),
        }
    }

    /// Create a compression error.
    pub fn compress(message: impl Into<String>) -> Self {
        Self::Compress {
            message: message.into(),
        }
    }

    /// Create a checksum mismatch error.
    pub fn checksum(expected: u32, computed: u32) -> Self {
        Self::Checksum { expected, computed }
    }

    /// Create an unsupported-format error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create an invalid-argument error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CabrioletError::signature(b"MSCF".to_vec(), vec![0x50, 0x4B]);
        assert!(err.to_string().contains("Bad signature"));

        let err = CabrioletError::checksum(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("Checksum mismatch"));

        let err = CabrioletError::unsupported("compression kind 9");
        assert!(err.to_string().contains("kind 9"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: CabrioletError = io_err.into();
        assert!(matches!(err, CabrioletError::Io(_)));
    }
}
