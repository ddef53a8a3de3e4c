//! Error types for packet streaming and sample reading.
//!
//! This module provides the error taxonomy for the daqflow library. All errors
//! implement the `std::error::Error` trait and carry enough structured context
//! to decide whether an operation can simply be retried.
//!
//! ## Error Categories
//!
//! - **Contract Errors**: invalid construction parameters or calls made in the
//!   wrong state (`InvalidParameter`, `InvalidState`, `InvalidSampleType`)
//! - **Descriptor Errors**: descriptors that violate their own invariants
//! - **Transient Errors**: allocator exhaustion and timeouts, recoverable by
//!   retrying once consumers advance
//! - **Configuration Errors**: YAML parsing and validation failures
//! - **Source Errors**: failures reported by a producer's sample source
//!
//! Reader invalidity is deliberately *not* an error. An invalid reader keeps
//! returning [`ReaderStatus`](crate::ReaderStatus) values flagged as ignored.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use daqflow::StreamError;
//!
//! let error = StreamError::out_of_memory(64, 1024);
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::SampleType;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for streaming and reading operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Invalid parameter: {details}")]
    InvalidParameter { details: String },

    #[error("Invalid state: {context}")]
    InvalidState { context: String },

    #[error("Cannot read {requested:?} samples: {details}")]
    InvalidSampleType { requested: Option<SampleType>, details: String },

    #[error("Invalid descriptor: {details}")]
    InvalidDescriptor { details: String },

    #[error("Packet arena out of memory: requested {requested} bytes, capacity {capacity} bytes")]
    OutOfMemory { requested: usize, capacity: usize },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("File error: {}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sample source failed: {reason}")]
    SourceFailed {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::OutOfMemory { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::SourceFailed { .. } => true,
            StreamError::InvalidParameter { .. } => false,
            StreamError::InvalidState { .. } => false,
            StreamError::InvalidSampleType { .. } => false,
            StreamError::InvalidDescriptor { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::File { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::InvalidParameter { .. } => vec![
                "Check block size and overlap values",
                "Keep overlap strictly below 100 percent",
            ],
            StreamError::InvalidState { .. } => vec![
                "Wait for the first descriptor before reading",
                "Ensure value packets carry a linked domain packet",
                "Rebuild the reader from a connected signal",
            ],
            StreamError::InvalidSampleType { .. } => vec![
                "Request a numeric sample type",
                "Match the Rust buffer type to the reader's value type",
                "Use raw value mode for non-numeric streams",
            ],
            StreamError::InvalidDescriptor { .. } => vec![
                "Match the post-scaling input type to the descriptor sample type",
                "Use a positive tick resolution",
            ],
            StreamError::OutOfMemory { .. } => vec![
                "Let consumers release older packets",
                "Retry the allocation later",
                "Increase the arena capacity",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase the read timeout",
                "Check that the producer is still sending packets",
            ],
            StreamError::Config { .. } => vec![
                "Check the YAML syntax",
                "Verify configuration values are within range",
            ],
            StreamError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            StreamError::SourceFailed { .. } => vec![
                "Check the sample source device",
                "Restart the producer driver",
            ],
        }
    }

    /// Helper constructor for invalid parameter errors.
    pub fn invalid_parameter(details: impl Into<String>) -> Self {
        StreamError::InvalidParameter { details: details.into() }
    }

    /// Helper constructor for invalid state errors.
    pub fn invalid_state(context: impl Into<String>) -> Self {
        StreamError::InvalidState { context: context.into() }
    }

    /// Helper constructor for sample type errors.
    pub fn invalid_sample_type(requested: Option<SampleType>, details: impl Into<String>) -> Self {
        StreamError::InvalidSampleType { requested, details: details.into() }
    }

    /// Helper constructor for descriptor errors.
    pub fn invalid_descriptor(details: impl Into<String>) -> Self {
        StreamError::InvalidDescriptor { details: details.into() }
    }

    /// Helper constructor for allocator exhaustion.
    pub fn out_of_memory(requested: usize, capacity: usize) -> Self {
        StreamError::OutOfMemory { requested, capacity }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::File { path, source }
    }

    /// Helper constructor for source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        StreamError::SourceFailed { reason: reason.into(), source: None }
    }

    /// Helper constructor for source failures with an underlying cause.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::SourceFailed { reason: reason.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for StreamError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StreamError::Config { context: "YAML".to_string(), details: err.to_string() }
    }
}
