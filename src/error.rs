//! Error types for the realtime engine.

use crate::remote::Capability;
use crate::types::EntityIdentity;
use thiserror::Error;

/// Main error type for realtime operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Normalization failed for {identity}: {reason}")]
    Normalization {
        identity: EntityIdentity,
        reason: String,
    },

    #[error("Realtime engine has been shut down")]
    ShutDown,

    #[error("Capability mismatch: expected {expected:?}, got {got:?}")]
    CapabilityMismatch { expected: Capability, got: Capability },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Build a normalization error for a payload that could not be converted.
    pub fn normalization(identity: EntityIdentity, reason: impl Into<String>) -> Self {
        SyncError::Normalization {
            identity,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, SyncError>;
