//! Error types for VRT packet, frame and archive processing.
//!
//! All errors implement `std::error::Error` and carry structured context so a
//! caller can tell a malformed wire buffer apart from a rejected edit.
//!
//! ## Error Categories
//!
//! - **Malformed input**: sync word mismatch, truncated buffers, variable-length
//!   sections that overrun their container
//! - **Invalid format**: payload format descriptors whose fields contradict each other
//! - **Unsupported operation**: version-gated features, packet types outside a
//!   packet class, writes to read-only archives
//! - **Validation failure**: reported by the checker operations (`validate`)
//! - **Invalid value**: out-of-range arguments and reserved enumeration codes
//! - **File / Config**: archive I/O and configuration loading
//!
//! ## Helper Constructors
//!
//! ```rust
//! use vrt_codec::VrtError;
//!
//! let err = VrtError::malformed("VRL frame", "sync word mismatch");
//! assert!(!err.recovery_suggestions().is_empty());
//!
//! let err = VrtError::unsupported("set_pad_bit_count", "pad bits require V49b");
//! assert!(err.to_string().contains("V49b"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T, E = VrtError> = std::result::Result<T, E>;

/// Main error type for codec operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VrtError {
    #[error("Malformed input in {context}: {details}")]
    MalformedInput { context: String, details: String },

    #[error("Invalid payload format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Unsupported operation {operation}: {reason}")]
    UnsupportedOperation { operation: String, reason: String },

    #[error("Validation failed for {subject}: {reason}")]
    ValidationFailure { subject: String, reason: String },

    #[error("Invalid value for {field}: {details}")]
    InvalidValue { field: String, details: String },

    #[error("VRA file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {details}")]
    Config {
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl VrtError {
    /// Returns whether this error came from a checker rather than a rejected edit.
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, VrtError::ValidationFailure { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            VrtError::MalformedInput { .. } => vec![
                "Check the buffer starts on a packet or frame boundary",
                "Verify the source did not truncate the transfer",
                "Use the non-strict validators to locate the damaged section",
            ],
            VrtError::InvalidFormat { .. } => vec![
                "Keep the data item size within the item packing field size",
                "Use 32-bit items for float and 64-bit items for double",
                "Start from a DataType and adjust individual fields",
            ],
            VrtError::UnsupportedOperation { .. } => vec![
                "Check the configured VRT version",
                "Use a packet class that supports the requested packet type",
                "Open the archive in Write or ReadWrite mode before modifying it",
            ],
            VrtError::ValidationFailure { .. } => vec![
                "Inspect the reported reason before trusting the buffer",
                "Re-run validation in non-strict mode to tolerate reserved bits",
            ],
            VrtError::InvalidValue { .. } => vec![
                "Check the argument against the documented field range",
                "Avoid reserved enumeration codes",
            ],
            VrtError::File { .. } => vec![
                "Check the file exists and is readable",
                "Verify the file starts with a VRAF header",
                "Check file permissions and free disk space",
            ],
            VrtError::Config { .. } => vec![
                "Check the YAML syntax of the configuration",
                "Use V49 or V49b for the VRT version",
            ],
        }
    }

    /// Helper constructor for malformed input errors.
    pub fn malformed(context: impl Into<String>, details: impl Into<String>) -> Self {
        VrtError::MalformedInput { context: context.into(), details: details.into() }
    }

    /// Helper constructor for payload format errors.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        VrtError::InvalidFormat { reason: reason.into() }
    }

    /// Helper constructor for unsupported operations.
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        VrtError::UnsupportedOperation { operation: operation.into(), reason: reason.into() }
    }

    /// Helper constructor for checker failures.
    pub fn validation(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        VrtError::ValidationFailure { subject: subject.into(), reason: reason.into() }
    }

    /// Helper constructor for out-of-range arguments.
    pub fn invalid_value(field: impl Into<String>, details: impl Into<String>) -> Self {
        VrtError::InvalidValue { field: field.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        VrtError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        VrtError::Config { details: details.into(), source: None }
    }

    /// Helper constructor for configuration errors with source.
    pub fn config_with_source(
        details: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        VrtError::Config { details: details.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for VrtError {
    fn from(err: std::io::Error) -> Self {
        VrtError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
