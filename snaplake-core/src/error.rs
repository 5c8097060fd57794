//! Error taxonomy shared by the pipeline.
//!
//! - `InvalidInput`: a programming or configuration defect. Never retried.
//! - `Connector`: fetching or normalizing a source response failed.
//! - `Storage`: listing, reading or writing the archive failed.

use thiserror::Error;

use crate::data::connector::ConnectorError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }
}

/// Failures of the object-storage capability.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to list objects under '{prefix}': {reason}")]
    List { prefix: String, reason: String },

    #[error("failed to read object '{key}': {reason}")]
    Read { key: String, reason: String },

    #[error("failed to write object '{key}': {reason}")]
    Write { key: String, reason: String },

    #[error("object '{key}' already exists; archive objects are never overwritten")]
    AlreadyExists { key: String },

    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },
}
