//! Store errors
//!
//! Library functions return `anyhow::Result` and raise one of these kinds
//! with `bail!`; callers recover the kind with `downcast_ref::<StoreError>()`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid entry name: {0}")]
    Validation(String),

    #[error("entry '{0}' does not exist")]
    NotFound(String),

    #[error("entry '{0}' already exists (use --force to overwrite)")]
    AlreadyExists(String),

    #[error("passwords do not match")]
    Mismatch,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("'{0}' is required but was not found in PATH")]
    DependencyMissing(String),

    #[error("invalid character class: {0}")]
    InvalidPattern(String),

    #[error("unable to gather entropy: {0}")]
    Entropy(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of a store error, if `err` carries one
pub fn kind(err: &anyhow::Error) -> Option<&StoreError> {
    err.downcast_ref::<StoreError>()
}
