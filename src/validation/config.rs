//! Configuration validation functions

use uuid::Uuid;

use super::ValidationError;

/// Longest accepted interval or timeout, in milliseconds
pub const MAX_INTERVAL_MS: u64 = 3_600_000;

/// Frame bytes reserved for the FileData header around a chunk
pub const FRAME_HEADER_RESERVE: usize = 1024;

/// Validate the transfer chunk size against the frame limit
///
/// A chunk plus its FileData header has to fit in one frame.
pub fn validate_chunk_size(chunk_size: usize, max_frame_size: usize) -> Result<(), ValidationError> {
	if chunk_size == 0 {
		return Err(ValidationError::Setting("Chunk size must be greater than 0".to_string()));
	}
	let limit = max_frame_size.saturating_sub(FRAME_HEADER_RESERVE);
	if chunk_size > limit {
		return Err(ValidationError::Setting(format!(
			"Chunk size {} too large for frame size {} (max {})",
			chunk_size, max_frame_size, limit
		)));
	}
	Ok(())
}

/// Validate an interval or timeout in milliseconds
pub fn validate_interval_ms(name: &str, ms: u64) -> Result<(), ValidationError> {
	if ms == 0 {
		return Err(ValidationError::Setting(format!("{} must be greater than 0", name)));
	}
	if ms > MAX_INTERVAL_MS {
		return Err(ValidationError::Setting(format!(
			"{} too large: {} ms (max {})",
			name, ms, MAX_INTERVAL_MS
		)));
	}
	Ok(())
}

/// Validate the display name announced to peers
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
	if name.trim().is_empty() {
		return Err(ValidationError::Setting("Display name must not be empty".to_string()));
	}
	if name.len() > u16::MAX as usize {
		return Err(ValidationError::Setting(format!(
			"Display name too long: {} bytes (max {})",
			name.len(),
			u16::MAX
		)));
	}
	Ok(())
}

/// Validate the local device identifier
pub fn validate_device_id(id: &Uuid) -> Result<(), ValidationError> {
	if id.is_nil() {
		return Err(ValidationError::Setting("Device id must not be nil".to_string()));
	}
	Ok(())
}


// vim: ts=4
