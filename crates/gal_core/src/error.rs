//! Error Types
//!
//! [`GalError`] covers the failures the binding core reports to callers.
//! Programming errors (double tracking, removing an untracked resource,
//! binding a reserved sampler name) are not part of it: they trip a debug
//! assertion and degrade to a logged no-op in release builds.
//!
//! All fallible APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, GalError>`.

use thiserror::Error;

use crate::handles::HandleKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GalError {
    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The device failed to create an object.
    #[error("Failed to create {kind}: {reason}")]
    DeviceCreationFailed {
        /// The kind of object that was requested
        kind: HandleKind,
        /// Backend-provided reason
        reason: String,
    },

    /// A handle did not refer to a live object.
    #[error("Invalid {kind} handle")]
    InvalidHandle {
        /// The kind of handle that was rejected
        kind: HandleKind,
    },

    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// The device has no description for the bind group layout handle.
    #[error("Unknown bind group layout")]
    UnknownBindGroupLayout,

    /// A layout or bind group broke a structural rule.
    #[error("Layout violation: {0}")]
    LayoutViolation(String),

    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// The backend could not allocate a descriptor set from a fresh pool.
    #[error("Descriptor set allocation failed: {0}")]
    DescriptorAllocationFailed(String),

    /// A subsystem was used before initialization or after shutdown.
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),
}

impl GalError {
    #[must_use]
    pub fn creation_failed(kind: HandleKind, reason: impl Into<String>) -> Self {
        Self::DeviceCreationFailed {
            kind,
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, GalError>`.
pub type Result<T> = std::result::Result<T, GalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_object_kind() {
        let err = GalError::creation_failed(HandleKind::GraphicsPipeline, "shader missing");
        assert_eq!(
            err.to_string(),
            "Failed to create graphics pipeline: shader missing"
        );
        let err = GalError::InvalidHandle {
            kind: HandleKind::Texture,
        };
        assert_eq!(err.to_string(), "Invalid texture handle");
    }
}
