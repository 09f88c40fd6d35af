//! Error types for the Gr8Paint document core.

use thiserror::Error;

/// Errors that can occur while compressing snapshots, maintaining undo
/// history, or reading and writing `.gr8` project files.
///
/// Every variant is recoverable at the editor boundary: show a message and
/// keep the previous in-memory state. None of these should abort the
/// process.
#[derive(Debug, Error)]
pub enum Gr8Error {
    /// A compressed snapshot failed to decompress, or decompressed to a
    /// length other than `width * height * 4` bytes.
    #[error("corrupted snapshot: {reason}")]
    CorruptedSnapshot { reason: String },

    /// The bytes are not a Gr8Paint project, or were written by a newer,
    /// incompatible version. The message distinguishes the two.
    #[error("unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// The checksum stored in the file does not match the payload that was
    /// actually read. Distinct from [`Gr8Error::UnsupportedFormat`] so
    /// callers can report "corrupted" rather than "wrong file type".
    #[error("file integrity check failed: stored checksum {stored:#x}, computed {computed:#x}")]
    FileIntegrity { stored: u64, computed: u64 },

    /// A layer stack that violates its own invariants: no layers at all, an
    /// out-of-range active index, or dimensions outside the supported range.
    #[error("invalid snapshot: {reason}")]
    InvalidSnapshot { reason: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster encode or decode failure during import or export.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    /// Payload serialization or deserialization failure.
    #[error("payload encoding error: {0}")]
    Payload(#[from] bincode::Error),
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Gr8Error>;
