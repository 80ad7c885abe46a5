//! Codec-level error taxonomy.
//!
//! `Incomplete` is deliberately *not* a variant here: needing more bytes is
//! the ordinary, resumable outcome of parsing a partial frame, not a
//! failure, so it is modeled as `Ok(ParseOutcome::Incomplete)` at the call
//! site instead of an `Err`.

use thiserror::Error;

/// Failure modes a codec can report. Each is local to the one frame being
/// parsed or composed and only affects the owning connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed framing or an unrecognized command.
    #[error("invalid request: {0}")]
    Invalid(&'static str),

    /// A decimal integer field exceeded the representable range.
    #[error("integer value overflowed while parsing")]
    Overflow,

    /// Composing a response would require growing the outbound buffer past
    /// its configured ceiling.
    #[error("response buffer overflow: {0}")]
    BufOverflow(#[from] cache_buf::DynBufError),
}
