use thiserror::Error;

/// Errors produced while encoding or decoding wire messages
///
/// A decode error drops the single offending datagram; the connection that
/// delivered it stays up.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Buffer too short: need {need} bytes, have {have}")]
    BufferTooShort { need: usize, have: usize },

    #[error("Component {tag} declares {declared} bytes but only {remaining} remain")]
    ComponentLengthMismatch {
        tag: u16,
        declared: usize,
        remaining: usize,
    },

    #[error("{0} unexpected trailing bytes after message")]
    TrailingBytes(usize),

    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    #[error("{field} of {len} does not fit the wire field (max {max})")]
    PayloadTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Malformed component payload for tag {tag}: expected {expected} bytes, got {actual}")]
    MalformedComponent {
        tag: u16,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
