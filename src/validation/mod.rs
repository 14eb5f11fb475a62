//! Checks on settings and on input received from peers
//!
//! Settings are checked once when a peer is built. Paths are checked for
//! every entry of every batch, before anything touches the disk.

use std::error::Error;
use std::fmt;

pub mod config;
pub mod path;

pub use config::*;
pub use path::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	/// A setting is out of range or malformed
	Setting(String),
	/// A peer-supplied path would leave the profile root
	UnsafePath(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::Setting(msg) => write!(f, "Invalid setting: {}", msg),
			ValidationError::UnsafePath(msg) => write!(f, "Unsafe path: {}", msg),
		}
	}
}

impl Error for ValidationError {}

/// Implemented by values that can check themselves
pub trait Validator {
	fn validate(&self) -> Result<(), ValidationError>;
}


// vim: ts=4
