//! Error types for `imgrec_core`.
//!
//! All hard failures are funnelled through [`AutomationError`], which uses
//! `thiserror` for `Display` and `Error` derives.  Conditions that automation
//! loops poll for (no match, missing template, missing script) are *not*
//! errors and are returned as `Option` / `bool` by the relevant APIs.

use thiserror::Error;

/// Top-level error type for the `imgrec_core` library.
///
/// Each variant corresponds to a distinct subsystem.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Screen capture failure (display unavailable, GDI call failed, bad region).
    #[error("CaptureError: {0}")]
    CaptureError(String),

    /// Input injection failure (SendInput rejected events, cursor query failed).
    #[error("InputError: {0}")]
    InputError(String),

    /// Fault while sampling pointer state during a recording session.
    #[error("RecordingError: {0}")]
    RecordingError(String),

    /// Script persistence failure (invalid name, malformed file).
    #[error("ScriptError: {0}")]
    ScriptError(String),

    /// Invalid or unreadable settings.
    #[error("ConfigError: {0}")]
    ConfigError(String),

    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AutomationError>;

/// Convert a `windows::core::Error` (Win32 / GDI failure) into a
/// `AutomationError::CaptureError`.
#[cfg(windows)]
impl From<windows::core::Error> for AutomationError {
    fn from(err: windows::core::Error) -> Self {
        AutomationError::CaptureError(format!("Win32 error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes_subsystem() {
        let err = AutomationError::CaptureError("GetDC(NULL) failed".into());
        assert_eq!(err.to_string(), "CaptureError: GetDC(NULL) failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AutomationError = io.into();
        assert!(matches!(err, AutomationError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
