use thiserror::Error;

/// Error kinds surfaced by the session server (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    Connecting,
    Reading,
    Sending,
    Unknown,
}

impl std::fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "CONNECTING",
            Self::Reading => "READING",
            Self::Sending => "SENDING",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload too large: {0} bytes exceeds u32 frame limit")]
    PayloadTooLarge(usize),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unrecognized message tag: {0}")]
    UnknownTag(String),
}
