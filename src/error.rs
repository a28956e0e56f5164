use std::io;

/// The error taxonomy for the reactor: I/O failures, decoder/protocol
/// failures, lifecycle misuse, and transient selector errors.
///
/// Handlers only ever see these through [`crate::handler::IoHandler::exception_caught`];
/// nothing in the decode path or the worker loop panics or unwinds to
/// report a failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A socket accept/read/write/registration failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A malformed or inconsistent byte stream seen by a [`crate::codec::DecodingState`].
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Misuse of the public API: writing to a closed session, binding an
    /// address that is already bound by this processor, etc.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// A transient failure on the selector itself (not on a particular
    /// session). The worker loop logs these and continues.
    #[error("selector error: {0}")]
    Selector(io::Error),
}

/// Errors produced while driving a [`crate::codec::DecodingState`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The input ended while a state still needed bytes to complete and
    /// that state does not override `finish_decode` to accept it.
    #[error("unexpected end of input: {0}")]
    UnexpectedEof(String),

    /// A state determined the bytes seen so far cannot form a valid
    /// message (bad tag, oversized length prefix, ...).
    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
