//! Error types
//!
//! Usage errors raised by the packer and the recording layer, plus
//! configuration loading failures. None of these are fatal: policy objects
//! report them through their [`Reporter`](crate::report::Reporter) and
//! degrade the offending call to a no-op.

use std::path::PathBuf;

use thiserror::Error;

/// Packer usage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    /// A single field is wider than the packer accepts.
    #[error("field of {size} bits exceeds the {max}-bit limit for {what}")]
    FieldTooWide {
        /// Requested width.
        size: usize,
        /// Maximum width for this primitive.
        max: usize,
        /// Primitive that rejected the field.
        what: &'static str,
    },

    /// `pack_bytes`/`pack_ints` asked for more bits than the array holds.
    #[error("{what} called with size '{size}', which exceeds the array capacity ({capacity})")]
    SizeExceedsCapacity {
        /// Requested width.
        size: usize,
        /// `len * element_bits` of the source array.
        capacity: usize,
        /// Primitive that rejected the call.
        what: &'static str,
    },

    /// The stream ran out before a read could be satisfied.
    #[error("{needed} bits needed to unpack {what}, yet only {available} available.")]
    NotEnoughBits {
        /// Bits the read required.
        needed: usize,
        /// Bits left in the stream.
        available: usize,
        /// Kind of value being read.
        what: &'static str,
    },

    /// The stream holds a non-null object but there is nothing to unpack it into.
    #[error("cannot unpack into null object")]
    NullObject,

    /// The object consumed fewer bits than the stream carried.
    #[error("Unpack operation unsuccessful: unpacked {unpacked} bits from a total of {total} bits")]
    IncompleteUnpack {
        /// Bits consumed.
        unpacked: usize,
        /// Bits provided.
        total: usize,
    },
}

/// Transaction-recording lifecycle errors.
#[derive(Debug, Error)]
pub enum RecordingError {
    /// A recorder was opened without a stream/backend.
    #[error("illegal attempt to open recorder '{0}' on a null stream")]
    NullStream(String),

    /// A recorder that is already open or closed was opened again.
    #[error("illegal attempt to re-initialize '{0}'")]
    Reinitialized(String),

    /// A stream was configured twice.
    #[error("illegal attempt to re-configure stream '{0}'")]
    StreamReconfigured(String),

    /// The database file name cannot change while the file is open.
    #[error("cannot change file name of database while it is open")]
    DatabaseOpen,

    /// Writing the transcript failed.
    #[error("transcript I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading a configuration file.
    #[error("I/O error reading {path}: {error}")]
    Io {
        /// Path to the file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        error: std::io::Error,
    },

    /// Error parsing TOML.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_enough_bits_message() {
        let err = PackError::NotEnoughBits {
            needed: 16,
            available: 8,
            what: "integral",
        };
        assert_eq!(
            err.to_string(),
            "16 bits needed to unpack integral, yet only 8 available."
        );
    }

    #[test]
    fn size_exceeds_capacity_message() {
        let err = PackError::SizeExceedsCapacity {
            size: 20,
            capacity: 16,
            what: "pack_bytes",
        };
        assert!(err.to_string().contains("exceeds the array capacity (16)"));
    }

    #[test]
    fn recording_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: RecordingError = io.into();
        assert!(matches!(err, RecordingError::Io(_)));
    }
}
