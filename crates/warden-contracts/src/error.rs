//! Error types for the warden crates.
//!
//! Capability decisions never fail: a site that cannot be matched falls back
//! to the `DEFAULT` preset. The variants below cover the few genuinely
//! exceptional paths (internal key decoding, configuration and persistence).

use thiserror::Error;

/// The unified error type for the warden crates.
#[derive(Debug, Error)]
pub enum WardenError {
    /// A request key was not produced by `Policy::request_key`.
    #[error("malformed request key: '{key}'")]
    MalformedRequestKey { key: String },

    /// A configuration document is missing, unreadable or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A dried policy could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// A `PolicyStore` could not load or save a dried policy.
    #[error("policy store error: {reason}")]
    StoreError { reason: String },

    /// A shared policy's lock was poisoned by a panicking writer.
    #[error("policy lock poisoned: {reason}")]
    LockPoisoned { reason: String },

    /// A site key supplied by a user is not a valid site.
    #[error("invalid site: '{site}'")]
    InvalidSite { site: String },
}

/// Convenience alias used throughout the warden crates.
pub type WardenResult<T> = Result<T, WardenError>;
