//! Error types shared by every modgate crate.

/// Failure while decoding a worker request frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame contained characters outside the base64 alphabet, misplaced
    /// padding, or an impossible final group.
    #[error("invalid frame encoding: {reason}")]
    Decode { reason: String },

    /// The stream ended before the newline terminator was seen.
    #[error("frame truncated: stream closed before the terminator")]
    Truncated,

    /// The decoded module would exceed the configured size.
    #[error("frame too large: decoded module exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Reading the underlying stream failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to parse a platform or operation identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// Convenience alias for frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display() {
        let err = FrameError::TooLarge { limit: 16 };
        assert_eq!(
            err.to_string(),
            "frame too large: decoded module exceeds 16 bytes"
        );
    }

    #[test]
    fn io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = FrameError::from(io_err);
        assert!(err.to_string().contains("pipe gone"));
    }

    #[test]
    fn parse_error_display() {
        assert_eq!(
            ParseError::UnknownPlatform("nope".into()).to_string(),
            "unknown platform: nope"
        );
    }
}
