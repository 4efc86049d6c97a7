//! Error handling for gcodeplan
//!
//! Provides error types for the layers of the estimator:
//! - G-Code errors (tokenizing, command tables, tool selection, tags)
//! - Post-processing errors (the streaming in-place rewrite)
//!
//! Malformed input lines are normally logged and skipped by the processor;
//! the G-Code variants exist for the places where a caller asks for a
//! strict answer (e.g. parsing a role name or registering a command).
//!
//! All error types use `thiserror` for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// G-Code error type
///
/// Represents errors related to G-Code tokenizing and interpretation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// Invalid G-Code syntax
    #[error("Invalid syntax at line {line_number}: {reason}")]
    InvalidSyntax {
        /// The line number where the syntax error occurred.
        line_number: u32,
        /// The reason for the syntax error.
        reason: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{param}' at line {line_number}: {reason}")]
    InvalidParameter {
        /// The line number where the invalid parameter was found.
        line_number: u32,
        /// The parameter letter.
        param: char,
        /// The reason the parameter is invalid.
        reason: String,
    },

    /// Tool index outside of the configured filament table
    #[error("Invalid tool T{tool} at line {line_number}")]
    InvalidTool {
        /// The line number of the tool change.
        line_number: u32,
        /// The requested tool index.
        tool: i64,
    },

    /// Unrecognized extrusion role name in a feature tag
    #[error("Unknown extrusion role: {name}")]
    UnknownRole {
        /// The role name as written in the file.
        name: String,
    },

    /// A mnemonic was registered twice in a command table
    #[error("Duplicate command mnemonic: {mnemonic}")]
    DuplicateMnemonic {
        /// The mnemonic registered twice.
        mnemonic: String,
    },

    /// Generic G-Code error
    #[error("G-Code error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Post-processing error type
///
/// Every variant aborts the rewrite. Temporary files are removed before
/// one of these is returned; the original file is never touched.
#[derive(Error, Debug)]
pub enum PostProcessError {
    /// Input or output file could not be opened
    #[error("Failed to open {} for post-processing: {source}", .path.display())]
    Open {
        /// The file that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Reading from the file being rewritten failed
    #[error("Error while reading from {}: {source}", .path.display())]
    Read {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a temporary file failed
    #[error("Post-processing export failed while writing {}. Is the disk full? ({source})", .path.display())]
    Write {
        /// The temporary file being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Swapping the rewritten file into place failed
    #[error("Failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        /// The temporary file.
        from: PathBuf,
        /// The destination file.
        to: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A temporary file could not be removed
    #[error("Failed to remove temporary file {}: {source}", .path.display())]
    RemoveTemp {
        /// The temporary file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Main error type for gcodeplan
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Post-processing error
    #[error(transparent)]
    PostProcess(#[from] PostProcessError),

    /// Processing was cancelled by the caller's callback
    #[error("Processing cancelled")]
    Cancelled,

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a post-processing error
    pub fn is_post_process_error(&self) -> bool {
        matches!(self, Error::PostProcess(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
