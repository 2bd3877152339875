use std::{error::Error, fmt::Display, io, str::Utf8Error};

use crate::protocol::ResultCode;

/// Errors that may occur when decoding a response or request frame.
#[derive(Debug)]
pub enum DecodeError {
    IoError(io::Error),
    /// The frame is not delimited by `&` and `#` (or `!` and `#` for requests).
    Malformed(String),
    InvalidUtf8(Utf8Error),
    /// The frame carries no result code.
    MissingResultCode,
    UnknownResultCode(char),
    /// The probe answered with a result code that is not valid for the command.
    NotOk(ResultCode),
    /// The body after the result code does not have the shape the command expects.
    InvalidBody(String),
    UnknownVersion(String),
    InvalidRequest(String),
}

impl DecodeError {
    /// Whether the error stems from the frame delimiters or encoding rather than its contents.
    pub fn is_framing(&self) -> bool {
        matches!(self, DecodeError::Malformed(_) | DecodeError::InvalidUtf8(_))
    }
}

impl From<io::Error> for DecodeError {
    fn from(value: io::Error) -> Self {
        DecodeError::IoError(value)
    }
}

impl From<Utf8Error> for DecodeError {
    fn from(value: Utf8Error) -> Self {
        DecodeError::InvalidUtf8(value)
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::IoError(error) => write!(f, "{}", error),
            DecodeError::Malformed(reason) => write!(f, "Malformed packet: {}", reason),
            DecodeError::InvalidUtf8(error) => write!(f, "Invalid UTF8: {}", error),
            DecodeError::MissingResultCode => write!(f, "Response carries no result code"),
            DecodeError::UnknownResultCode(code) => {
                write!(f, "Unknown result code '{}'", code.escape_default())
            }
            DecodeError::NotOk(code) => write!(f, "Got a non-okay response ({})", code),
            DecodeError::InvalidBody(reason) => write!(f, "Invalid response body: {}", reason),
            DecodeError::UnknownVersion(version) => {
                write!(f, "Unknown protocol version {}", version)
            }
            DecodeError::InvalidRequest(request) => write!(f, "Invalid request {}", request),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::IoError(error) => Some(error),
            DecodeError::InvalidUtf8(error) => Some(error),
            _ => None,
        }
    }
}

/// Errors for packets whose parameters cannot be rendered on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EncodeError {
    ZeroCycles,
    DataLength { expected: usize, got: usize },
}

impl Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::ZeroCycles => write!(f, "Sequence must clock at least one cycle"),
            EncodeError::DataLength { expected, got } => write!(
                f,
                "Improper amount of data for cycle count: expected {} bytes, got {}",
                expected, got
            ),
        }
    }
}

impl Error for EncodeError {}
