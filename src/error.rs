//! Error types for peer operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::protocol::ProtocolError;
use crate::types::{DeviceId, ProfileId};
use crate::validation::ValidationError;

/// Error returned by the application-facing peer API
#[derive(Debug)]
pub enum PeerError {
	/// No local profile with this id
	UnknownProfile(ProfileId),

	/// No connection registered for this device
	UnknownConnection(DeviceId),

	/// Pairing requested on a connection that is already verified
	AlreadyVerified(DeviceId),

	/// The local tree snapshot could not be generated
	FailedToGetState { profile_id: ProfileId, source: io::Error },

	/// Connection is closed or its writer has stopped
	ConnectionClosed(DeviceId),

	/// Wire encoding failed
	Protocol(ProtocolError),

	/// I/O error
	Io(io::Error),

	/// Invalid settings
	Config(ConfigError),
}

impl fmt::Display for PeerError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PeerError::UnknownProfile(id) => write!(f, "Unknown profile: {}", id),
			PeerError::UnknownConnection(id) => write!(f, "No connection for device {}", id),
			PeerError::AlreadyVerified(id) => write!(f, "Connection to {} is already verified", id),
			PeerError::FailedToGetState { profile_id, source } => {
				write!(f, "Failed to get state of profile {}: {}", profile_id, source)
			}
			PeerError::ConnectionClosed(id) => write!(f, "Connection to {} is closed", id),
			PeerError::Protocol(e) => write!(f, "Protocol error: {}", e),
			PeerError::Io(e) => write!(f, "I/O error: {}", e),
			PeerError::Config(e) => write!(f, "Configuration error: {}", e),
		}
	}
}

impl Error for PeerError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			PeerError::FailedToGetState { source, .. } => Some(source),
			PeerError::Protocol(e) => Some(e),
			PeerError::Io(e) => Some(e),
			PeerError::Config(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for PeerError {
	fn from(e: io::Error) -> Self {
		PeerError::Io(e)
	}
}

impl From<ProtocolError> for PeerError {
	fn from(e: ProtocolError) -> Self {
		PeerError::Protocol(e)
	}
}

impl From<ConfigError> for PeerError {
	fn from(e: ConfigError) -> Self {
		PeerError::Config(e)
	}
}

/// Settings loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Settings file could not be read
	Read { path: String, source: io::Error },

	/// Settings file could not be parsed
	Parse { path: String, message: String },

	/// File extension is not one of toml, json, json5
	UnsupportedFormat { path: String },

	/// Settings parsed but failed validation
	Invalid(ValidationError),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => write!(f, "Cannot read {}: {}", path, source),
			ConfigError::Parse { path, message } => write!(f, "Cannot parse {}: {}", path, message),
			ConfigError::UnsupportedFormat { path } => {
				write!(f, "Unsupported settings format: {} (expected .toml, .json or .json5)", path)
			}
			ConfigError::Invalid(e) => write!(f, "{}", e),
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ConfigError::Read { source, .. } => Some(source),
			ConfigError::Invalid(e) => Some(e),
			_ => None,
		}
	}
}

impl From<ValidationError> for ConfigError {
	fn from(e: ValidationError) -> Self {
		ConfigError::Invalid(e)
	}
}


// vim: ts=4
