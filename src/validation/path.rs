//! Path validation functions
//!
//! Relative paths arrive from the remote peer as `/`-separated strings and
//! are joined onto a profile root, so they must never be able to leave it.

use std::path::{Component, Path, PathBuf};

use super::ValidationError;

/// Check if a path is safe (no parent directory references)
pub fn is_path_safe(path: &Path) -> bool {
	!path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Validate a path is safe
///
/// # Returns
/// `Ok(())` if valid, `Err(ValidationError)` if path contains dangerous components
pub fn validate_path_safe(path: &Path) -> Result<(), ValidationError> {
	if !is_path_safe(path) {
		return Err(ValidationError::UnsafePath(
			"Path contains parent directory reference (..)".to_string(),
		));
	}
	Ok(())
}

/// Check if path has no absolute components
pub fn is_path_relative(path: &Path) -> bool {
	!path.is_absolute() && !path.has_root()
}

/// Validate that path is relative (not absolute)
pub fn validate_path_relative(path: &Path) -> Result<(), ValidationError> {
	if !is_path_relative(path) {
		return Err(ValidationError::UnsafePath(format!(
			"Path must be relative, got absolute path: {:?}",
			path
		)));
	}
	Ok(())
}

/// Validate a relative path received over the wire.
///
/// The path must be non-empty, relative and free of `..` components.
pub fn validate_wire_path(relative: &str) -> Result<(), ValidationError> {
	if relative.is_empty() {
		return Err(ValidationError::UnsafePath("Path is empty".to_string()));
	}
	if relative.contains('\0') {
		return Err(ValidationError::UnsafePath(format!("Path contains NUL: {:?}", relative)));
	}
	let path = Path::new(relative);
	validate_path_relative(path)?;
	validate_path_safe(path)?;
	if path.components().any(|c| matches!(c, Component::Prefix(_))) {
		return Err(ValidationError::UnsafePath(format!("Path has a prefix: {:?}", relative)));
	}
	if !path.components().any(|c| matches!(c, Component::Normal(_))) {
		return Err(ValidationError::UnsafePath(format!("Path names no entry: {:?}", relative)));
	}
	Ok(())
}

/// Join a validated wire path onto a root directory
pub fn resolve_wire_path(root: &Path, relative: &str) -> Result<PathBuf, ValidationError> {
	validate_wire_path(relative)?;
	let mut path = root.to_path_buf();
	for segment in relative.split('/').filter(|s| !s.is_empty() && *s != ".") {
		path.push(segment);
	}
	Ok(path)
}


// vim: ts=4
