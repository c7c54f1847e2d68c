//! Error types for the mixin engine
//!
//! Only session-level problems are reported through [`Error`]. Problems that
//! affect a single mixin are [`FailureCause`](crate::FailureCause) values and
//! problems that affect a single module are [`ApplyError`](crate::ApplyError).

use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload bytes are not a valid MXPT payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Unsupported payload format version
    #[error("Unsupported payload version: {0}")]
    UnsupportedVersion(u16),

    /// Payload body does not match the checksum stored in its header
    #[error("Payload checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum stored in the header
        expected: u32,
        /// Checksum computed over the body
        actual: u32,
    },

    /// Manifest could not be parsed or is inconsistent
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Unsupported manifest version
    #[error("Unsupported manifest version: {0}")]
    UnsupportedManifestVersion(u32),

    /// Module id cannot be mapped to a relative path
    #[error("Invalid module id '{id}': {reason}")]
    InvalidModuleId {
        /// The offending id
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// A selected mixin id is not in the catalog
    #[error("Unknown mixin: {0}")]
    UnknownMixin(String),

    /// The same mixin id was declared twice in a manifest
    #[error("Duplicate mixin in manifest: {0}")]
    DuplicateMixin(String),

    /// The payload source cannot be used at all
    #[error("Payload source unavailable: {0}")]
    PayloadSource(String),

    /// The worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl Error {
    /// Create a new InvalidPayload error
    pub fn invalid_payload<S: Into<String>>(msg: S) -> Self {
        Error::InvalidPayload(msg.into())
    }

    /// Create a new InvalidManifest error
    pub fn invalid_manifest<S: Into<String>>(msg: S) -> Self {
        Error::InvalidManifest(msg.into())
    }

    /// Create a new InvalidModuleId error
    pub fn invalid_module_id<S: Into<String>, R: Into<String>>(id: S, reason: R) -> Self {
        Error::InvalidModuleId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error only concerns a single payload
    ///
    /// Such errors are turned into per-mixin failures by the payload store
    /// instead of aborting the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidPayload(_)
                | Error::UnsupportedVersion(_)
                | Error::ChecksumMismatch { .. }
                | Error::InvalidModuleId { .. }
        )
    }
}
