//! Error types with enough context to diagnose a failed dump or RPC call

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Dump Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Malformed dump line at key '{key}': {message} (line: {line})")]
    Parse {
        key: String,
        line: String,
        message: String,
    },

    #[error("View server protocol error: {message}")]
    Protocol { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ─────────────────────────────────────────────────────────────
    // RPC Errors
    // ─────────────────────────────────────────────────────────────
    #[error("RpcError: {exception}: {message}")]
    Remote { exception: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Selector Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid query field '{field}': {message}")]
    InvalidQuery { field: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Device Bridge Errors
    // ─────────────────────────────────────────────────────────────
    #[error("adb not found. Set ANDROID_HOME or ensure 'adb' is in your PATH.")]
    AdbNotFound,

    #[error("Device is not connected. Please connect to the device.")]
    NoDevice,

    #[error("adb process error: {message}")]
    Process { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn parse(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            key: key.into(),
            line: String::new(),
            message: message.into(),
        }
    }

    /// Attach the offending dump line to a [`Error::Parse`], truncated to
    /// [`LINE_PREVIEW_CHARS`]. Other variants pass through.
    pub fn with_line(self, text: &str) -> Self {
        match self {
            Self::Parse { key, message, .. } => Self::Parse {
                key,
                line: line_preview(text),
                message,
            },
            other => other,
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn remote(exception: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            exception: exception.into(),
            message: message.into(),
        }
    }

    pub fn invalid_query(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if retrying the whole dump/RPC operation could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. } | Error::Transport { .. } | Error::Remote { .. }
        )
    }

    /// Check if this error should abort the program
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::AdbNotFound | Error::NoDevice)
    }
}

/// Longest dump-line excerpt kept in a parse error
pub const LINE_PREVIEW_CHARS: usize = 120;

fn line_preview(text: &str) -> String {
    match text.char_indices().nth(LINE_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::protocol("empty dump");
        assert_eq!(err.to_string(), "View server protocol error: empty dump");

        let err = Error::AdbNotFound;
        assert!(err.to_string().contains("adb not found"));
    }

    #[test]
    fn test_remote_error_display_carries_exception_and_message() {
        let err = Error::remote("UiObjectNotFoundException", "no such object");
        assert_eq!(
            err.to_string(),
            "RpcError: UiObjectNotFoundException: no such object"
        );
    }

    #[test]
    fn test_parse_error_names_offending_key() {
        let err = Error::parse("text:mText", "declared length 12 exceeds remaining 3");
        let msg = err.to_string();
        assert!(msg.contains("text:mText"));
        assert!(msg.contains("exceeds"));
    }

    #[test]
    fn test_with_line_fills_parse_errors_only() {
        let err = Error::parse("k", "bad").with_line("A@1 k=9,v");
        match err {
            Error::Parse { line, .. } => assert_eq!(line, "A@1 k=9,v"),
            other => panic!("expected parse error, got {other:?}"),
        }

        let err = Error::protocol("empty").with_line("ignored");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_with_line_truncates_long_lines() {
        let long = "x".repeat(LINE_PREVIEW_CHARS + 10);
        match Error::parse("k", "bad").with_line(&long) {
            Error::Parse { line, .. } => {
                assert_eq!(line.len(), LINE_PREVIEW_CHARS + 3);
                assert!(line.ends_with("..."));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_query_names_field() {
        let err = Error::invalid_query("textMatche", "unknown field");
        assert!(err.to_string().contains("textMatche"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_fatal() {
        assert!(Error::AdbNotFound.is_fatal());
        assert!(Error::NoDevice.is_fatal());
        assert!(!Error::protocol("test").is_fatal());
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(Error::protocol("empty").is_recoverable());
        assert!(Error::transport("refused").is_recoverable());
        assert!(Error::remote("T", "m").is_recoverable());
        assert!(!Error::parse("k", "m").is_recoverable());
        assert!(!Error::invalid_query("f", "m").is_recoverable());
    }

    #[test]
    fn test_result_ext_preserves_error() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe",
        ));
        let err = res.context("writing command").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
