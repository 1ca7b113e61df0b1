//! Error types for azswarm

use std::path::PathBuf;

use crate::provision::Step;

/// azswarm Result type
pub type Result<T> = std::result::Result<T, Error>;

/// azswarm errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The az executable could not be located
    #[error("Azure CLI executable not found: {hint}")]
    ToolNotFound { hint: String },

    /// The az executable given explicitly does not exist
    #[error("Azure CLI executable not found at {}", path.display())]
    ToolPathInvalid { path: PathBuf },

    /// A provisioning step exited non-zero
    #[error("{step} failed: {message}")]
    StepFailed { step: Step, message: String },

    /// A configuration value or prompt answer was rejected
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The saga failed and every committed step was compensated
    #[error("provisioning failed at '{step}' and was rolled back: {reason}")]
    ProvisioningFailed { step: Step, reason: String },

    /// The saga failed and at least one compensation failed too
    #[error(
        "provisioning failed at '{step}' ({reason}); rollback incomplete, clean up manually: {}",
        orphaned.join(", ")
    )]
    PartialRollback {
        step: Step,
        reason: String,
        orphaned: Vec<String>,
    },

    /// Unexpected output from az
    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn step_failed(step: Step, message: impl Into<String>) -> Self {
        Error::StepFailed {
            step,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Process exit status for this error.
    ///
    /// A clean rollback and a partial one get their own codes so scripts can
    /// tell whether billable resources may have been left behind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::ProvisioningFailed { .. } => 2,
            Error::PartialRollback { .. } => 3,
            _ => 1,
        }
    }
}
