//! Error types for metagate
//!
//! This module defines the common error types used throughout the system.

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Common result type for metagate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for metagate
#[derive(Debug, Error)]
pub enum Error {
    // Local persistence errors
    #[error("persistence I/O error at {path}: {reason}")]
    PersistenceIo { path: String, reason: String },

    #[error("corrupt state file {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Dangling index errors
    #[error("dangling import submission failed: {0}")]
    ImportSubmission(String),

    // Startup errors
    #[error("legacy metadata upgrade failed for {path}: {reason}")]
    LegacyUpgrade { path: String, reason: String },

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a persistence error for a path
    pub fn persistence_io(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        Self::PersistenceIo {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a corrupt state error for a path
    pub fn corrupt(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        Self::CorruptState {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a legacy upgrade error for a path
    pub fn legacy_upgrade(path: impl AsRef<Path>, reason: impl fmt::Display) -> Self {
        Self::LegacyUpgrade {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if the next cluster state event is expected to clear this error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PersistenceIo { .. } | Self::Io(_) | Self::ImportSubmission(_)
        )
    }

    /// Check if this error reports unreadable on-disk data
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptState { .. } | Self::Deserialization(_)
        )
    }
}
