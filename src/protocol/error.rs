//! Protocol error types
//!
//! Every variant describes a stream that can no longer be trusted: once a
//! frame fails to decode the frame boundaries are ambiguous and the
//! connection has to be torn down.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error from the underlying transport
	Io(io::Error),
	/// Body ended before a value could be read
	Truncated { needed: usize, available: usize },
	/// Frame carries a type tag outside the message catalog
	UnknownMessageType(u8),
	/// String payload does not fit the u16 length prefix
	StringTooLong(usize),
	/// Negative or impossible array length prefix
	InvalidLength(i32),
	/// String payload is not valid UTF-8
	InvalidUtf8,
	/// Boolean byte other than 0 or 1
	InvalidBool(u8),
	/// Body decoded but bytes were left over
	TrailingBytes(usize),
	/// Frame without a type tag
	EmptyFrame,
	/// Frame length exceeds the configured maximum
	FrameTooLarge { size: usize, max: usize },
	/// Generic error message
	Other(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Truncated { needed, available } => {
				write!(f, "Truncated body: needed {} bytes, {} available", needed, available)
			}
			ProtocolError::UnknownMessageType(tag) => write!(f, "Unknown message type: {}", tag),
			ProtocolError::StringTooLong(len) => {
				write!(f, "String of {} bytes exceeds the 65535 byte limit", len)
			}
			ProtocolError::InvalidLength(len) => write!(f, "Invalid array length: {}", len),
			ProtocolError::InvalidUtf8 => write!(f, "String is not valid UTF-8"),
			ProtocolError::InvalidBool(b) => write!(f, "Invalid boolean byte: {}", b),
			ProtocolError::TrailingBytes(n) => write!(f, "{} trailing bytes after message body", n),
			ProtocolError::EmptyFrame => write!(f, "Empty frame"),
			ProtocolError::FrameTooLarge { size, max } => {
				write!(f, "Frame of {} bytes exceeds maximum {}", size, max)
			}
			ProtocolError::Other(msg) => write!(f, "{}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ProtocolError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<String> for ProtocolError {
	fn from(e: String) -> Self {
		ProtocolError::Other(e)
	}
}

impl From<&str> for ProtocolError {
	fn from(e: &str) -> Self {
		ProtocolError::Other(e.to_string())
	}
}

impl From<std::string::FromUtf8Error> for ProtocolError {
	fn from(_: std::string::FromUtf8Error) -> Self {
		ProtocolError::InvalidUtf8
	}
}


// vim: ts=4
