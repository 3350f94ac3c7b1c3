use thiserror::Error;

/// Reasons a deframed candidate is not a usable packet.
///
/// # Examples
/// ```
/// use gdat_core::frame::FrameError;
///
/// let err = FrameError::ChecksumMismatch { computed: 0x12, received: 0x13 };
/// assert!(err.to_string().contains("checksum mismatch"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("incomplete framing: missing start delimiter")]
    MissingDelimiter,
    #[error("incomplete framing: stream ended inside an escape sequence")]
    DanglingEscape,
    #[error("packet too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },
}
