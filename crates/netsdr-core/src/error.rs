//! Error types for the NetSDR client.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Framing and sample-decoding failures are
//! grouped under [`CodecError`] so callers can match on the exact kind.

/// Largest total frame size the 13-bit header length field can express.
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// The error type for all NetSDR operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, UDP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for a response from the receiver.
    ///
    /// Only produced when a response timeout has been configured; by default
    /// control requests wait indefinitely.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a client operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the receiver has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the receiver was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// A sample stream or inbound channel was closed unexpectedly.
    #[error("stream closed")]
    StreamClosed,

    /// A message could not be framed, or a frame or body could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Framing and sample-decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The encoded message would not fit in the 13-bit length field.
    #[error("message length {length} exceeds maximum of {MAX_FRAME_LEN} bytes")]
    LengthExceeded {
        /// Total length the message would have had, header included.
        length: usize,
    },

    /// The header's declared length disagrees with the buffer length.
    #[error("header declares {declared} bytes but buffer holds {actual}")]
    LengthMismatch {
        /// Length from the header's low 13 bits (0 if no header was present).
        declared: usize,
        /// Actual number of bytes supplied.
        actual: usize,
    },

    /// The header is structurally invalid for its message type.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A control-item type was used to build a data item, or vice versa.
    #[error("message type {0} cannot be used for this message kind")]
    KindMismatch(String),

    /// Sample bit depth outside 1..=32.
    #[error("unsupported sample bit depth: {0}")]
    UnsupportedBitDepth(u16),

    /// Body length is not a whole number of samples.
    #[error("body length {len} is not a multiple of sample width {width}")]
    MisalignedBody {
        /// Body length in bytes.
        len: usize,
        /// Bytes per sample.
        width: usize,
    },
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
