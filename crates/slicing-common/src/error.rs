//! Error types for slicing operations.
//!
//! This module defines the error types used throughout the slicing crates.
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

use slicing_types::Dpid;

/// Result type alias for slicing operations.
pub type SliceResult<T> = Result<T, SliceError>;

/// Errors that can occur during slicing operations.
#[derive(Debug, Error)]
pub enum SliceError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// An operation did not finish in time.
    #[error("Operation timed out after {after_ms}ms: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The configured bound in milliseconds.
        after_ms: u64,
    },

    /// A flow installer call failed for one switch.
    #[error("Flow installer failed on switch {dpid}: {operation}: {message}")]
    Installer {
        /// The switch the call was aimed at.
        dpid: Dpid,
        /// The installer operation (e.g. "install_rule", "delete_all_rules").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Operator command could not be accepted.
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// IO error on a socket or file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl SliceError {
    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    /// Creates a flow installer error.
    pub fn installer(dpid: Dpid, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Installer {
            dpid,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid command error.
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SliceError::Timeout { .. }
                | SliceError::ShellCommandFailed { .. }
                | SliceError::Installer { .. }
                | SliceError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SliceError::installer(Dpid(4), "delete_all_rules", "bridge s4 not found");
        assert_eq!(
            err.to_string(),
            "Flow installer failed on switch 4: delete_all_rules: bridge s4 not found"
        );
    }

    #[test]
    fn test_invalid_command() {
        let err = SliceError::invalid_command("missing key 'simulation'");
        assert_eq!(err.to_string(), "Invalid command: missing key 'simulation'");
    }

    #[test]
    fn test_shell_command_failed() {
        let err = SliceError::ShellCommandFailed {
            command: "ovs-ofctl del-flows s1".to_string(),
            exit_code: 1,
            output: "s1 is not a bridge or a socket".to_string(),
        };
        assert!(err.to_string().contains("ovs-ofctl del-flows"));
        assert!(err.to_string().contains("exit code 1"));
    }

    #[test]
    fn test_timeout_display() {
        let err = SliceError::timeout("ovs-ofctl add-flow s2", 2000);
        assert_eq!(
            err.to_string(),
            "Operation timed out after 2000ms: ovs-ofctl add-flow s2"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(SliceError::timeout("x", 1).is_retryable());
        assert!(SliceError::installer(Dpid(1), "install_rule", "busy").is_retryable());
        assert!(!SliceError::invalid_command("bad json").is_retryable());
        assert!(!SliceError::internal("bug").is_retryable());
    }
}
