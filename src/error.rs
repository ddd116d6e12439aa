use thiserror::Error;

/// The error returned when decoding a bitpacked frame fails.
///
/// Every variant maps to untrusted input: a truncated buffer, or bytes that
/// no conforming writer could have produced. Writer-side misuse (values
/// outside their declared range, overflowing the buffer) is a programmer
/// error and is guarded by debug assertions instead.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationError {
    #[error("read past the end of the buffer")]
    Eof,
    #[error("decoded value is outside the declared range")]
    InvalidValue,
    #[error("alignment padding bits were not zero")]
    InvalidPadding,
    #[error("string bytes are not valid utf-8")]
    InvalidString,
}

pub type Result<T> = std::result::Result<T, SerializationError>;
