//! Peer settings
//!
//! Settings are built in code with [`PeerSettings::new`] or loaded from a
//! file with [`PeerSettings::load`]. The file format follows the extension:
//! `.toml`, `.json` or `.json5`. Missing keys fall back to the defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::types::DeviceId;
use crate::validation::{self, ValidationError, Validator};

/// Default transfer chunk size (512 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Settings of the local peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerSettings {
	// ========================================================================
	// IDENTITY
	// ========================================================================
	/// Stable identifier of this device
	pub device_id: DeviceId,

	/// Name announced to peers during pairing and verification
	pub display_name: String,

	// ========================================================================
	// TIMERS
	// ========================================================================
	/// Liveness ping interval
	pub ping_interval_ms: u64,

	/// Disconnect when a transfer makes no progress for this long
	pub progress_timeout_ms: u64,

	/// How often the stall watchdog looks at the progress counter
	pub progress_check_interval_ms: u64,

	// ========================================================================
	// TRANSFER
	// ========================================================================
	/// Largest chunk carried by one FileData message
	pub chunk_size: usize,

	/// Largest accepted frame payload
	pub max_frame_size: usize,

	/// Compare last-write times when diffing and apply them to built files
	pub supports_timestamp: bool,

	/// Glob patterns excluded from tree snapshots (e.g. "*.tmp", "build/**")
	pub exclude_patterns: Vec<String>,
}

impl Default for PeerSettings {
	fn default() -> Self {
		PeerSettings {
			device_id: Uuid::nil(),
			display_name: String::new(),
			ping_interval_ms: 5000,
			progress_timeout_ms: 30_000,
			progress_check_interval_ms: 1000,
			chunk_size: DEFAULT_CHUNK_SIZE,
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
			supports_timestamp: true,
			exclude_patterns: Vec::new(),
		}
	}
}

impl PeerSettings {
	pub fn new(device_id: DeviceId, display_name: impl Into<String>) -> Self {
		PeerSettings { device_id, display_name: display_name.into(), ..Default::default() }
	}

	/// Load settings from a toml, json or json5 file and validate them
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let display = path.display().to_string();
		let content = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: display.clone(), source })?;

		let ext = path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase());
		let parse_err = |message: String| ConfigError::Parse { path: display.clone(), message };
		let settings: PeerSettings = match ext.as_deref() {
			Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
			Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
			Some("json5") => json5::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
			_ => return Err(ConfigError::UnsupportedFormat { path: display }),
		};

		settings.validate()?;
		Ok(settings)
	}

	pub fn ping_interval(&self) -> Duration {
		Duration::from_millis(self.ping_interval_ms)
	}

	pub fn progress_timeout(&self) -> Duration {
		Duration::from_millis(self.progress_timeout_ms)
	}

	pub fn progress_check_interval(&self) -> Duration {
		Duration::from_millis(self.progress_check_interval_ms)
	}
}

impl Validator for PeerSettings {
	fn validate(&self) -> Result<(), ValidationError> {
		validation::validate_device_id(&self.device_id)?;
		validation::validate_display_name(&self.display_name)?;
		validation::validate_interval_ms("pingIntervalMs", self.ping_interval_ms)?;
		validation::validate_interval_ms("progressTimeoutMs", self.progress_timeout_ms)?;
		validation::validate_interval_ms("progressCheckIntervalMs", self.progress_check_interval_ms)?;
		validation::validate_chunk_size(self.chunk_size, self.max_frame_size)?;
		for pattern in &self.exclude_patterns {
			glob::Pattern::new(pattern).map_err(|e| {
				ValidationError::Setting(format!("Invalid exclude pattern {:?}: {}", pattern, e))
			})?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	#[test]
	fn test_defaults() {
		let settings = PeerSettings::new(Uuid::new_v4(), "Alice");
		assert_eq!(settings.ping_interval(), Duration::from_secs(5));
		assert_eq!(settings.progress_timeout(), Duration::from_secs(30));
		assert_eq!(settings.chunk_size, 512 * 1024);
		assert!(settings.supports_timestamp);
		assert!(settings.validate().is_ok());
	}

	#[test]
	fn test_default_is_invalid_without_identity() {
		assert!(PeerSettings::default().validate().is_err());
	}

	#[test]
	fn test_load_toml() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("peer.toml");
		let id = Uuid::new_v4();
		fs::write(
			&path,
			format!("deviceId = \"{}\"\ndisplayName = \"Alice\"\nchunkSize = 4096\n", id),
		)
		.unwrap();

		let settings = PeerSettings::load(&path).unwrap();
		assert_eq!(settings.device_id, id);
		assert_eq!(settings.chunk_size, 4096);
		assert_eq!(settings.ping_interval_ms, 5000);
	}

	#[test]
	fn test_load_json5_with_comments() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("peer.json5");
		let id = Uuid::new_v4();
		fs::write(
			&path,
			format!(
				"{{\n  // identity\n  deviceId: \"{}\",\n  displayName: \"Bob\",\n  supportsTimestamp: false,\n}}\n",
				id
			),
		)
		.unwrap();

		let settings = PeerSettings::load(&path).unwrap();
		assert_eq!(settings.display_name, "Bob");
		assert!(!settings.supports_timestamp);
	}

	#[test]
	fn test_load_json_roundtrip() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("peer.json");
		let settings = PeerSettings::new(Uuid::new_v4(), "Carol");
		fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();
		assert_eq!(PeerSettings::load(&path).unwrap(), settings);
	}

	#[test]
	fn test_load_rejects_invalid_values() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("peer.json");
		let mut settings = PeerSettings::new(Uuid::new_v4(), "Carol");
		settings.chunk_size = settings.max_frame_size;
		fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();
		assert!(matches!(PeerSettings::load(&path), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn test_load_unsupported_extension() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("peer.yaml");
		fs::write(&path, "deviceId: x").unwrap();
		assert!(matches!(PeerSettings::load(&path), Err(ConfigError::UnsupportedFormat { .. })));
	}

	#[test]
	fn test_invalid_exclude_pattern() {
		let mut settings = PeerSettings::new(Uuid::new_v4(), "Alice");
		settings.exclude_patterns = vec!["[".to_string()];
		assert!(settings.validate().is_err());
	}
}

// vim: ts=4
