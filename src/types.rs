//! Core data model shared by the protocol, the differ and the transfer engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier of a physical peer
pub type DeviceId = Uuid;

/// Identifier of a synchronized directory relationship
pub type ProfileId = Uuid;

/// Shared secret that authorizes profile-scoped messages
pub type ProfileKey = Uuid;

/// 100 ns ticks per second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tick count of 1970-01-01T00:00:00 UTC
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// UTC point in time, counted in 100 ns ticks since 0001-01-01T00:00:00 UTC.
///
/// This is the on-wire representation of every timestamp (signed 64-bit,
/// little-endian), so it has to stay bit-compatible across peers.
#[derive(
	Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
	pub const fn from_ticks(ticks: i64) -> Self {
		Timestamp(ticks)
	}

	pub const fn ticks(self) -> i64 {
		self.0
	}

	pub fn now() -> Self {
		Timestamp::from(SystemTime::now())
	}

	/// Absolute distance between two timestamps in ticks
	pub fn abs_diff(self, other: Timestamp) -> u64 {
		self.0.abs_diff(other.0)
	}

	pub fn to_system_time(self) -> SystemTime {
		let rel = self.0.saturating_sub(UNIX_EPOCH_TICKS);
		let magnitude = ticks_to_duration(rel.unsigned_abs());
		if rel >= 0 {
			UNIX_EPOCH.checked_add(magnitude).unwrap_or(UNIX_EPOCH)
		} else {
			UNIX_EPOCH.checked_sub(magnitude).unwrap_or(UNIX_EPOCH)
		}
	}
}

fn ticks_to_duration(ticks: u64) -> Duration {
	let per_sec = TICKS_PER_SECOND as u64;
	Duration::new(ticks / per_sec, ((ticks % per_sec) * 100) as u32)
}

fn duration_to_ticks(d: Duration) -> i64 {
	let secs = i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
	secs.saturating_mul(TICKS_PER_SECOND).saturating_add(i64::from(d.subsec_nanos() / 100))
}

impl From<SystemTime> for Timestamp {
	fn from(t: SystemTime) -> Self {
		match t.duration_since(UNIX_EPOCH) {
			Ok(d) => Timestamp(UNIX_EPOCH_TICKS.saturating_add(duration_to_ticks(d))),
			Err(e) => Timestamp(UNIX_EPOCH_TICKS.saturating_sub(duration_to_ticks(e.duration()))),
		}
	}
}

/// One entry of a directory tree snapshot.
///
/// Paths are relative to the profile root and always use `/` separators.
/// Directories carry no size and no write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemItem {
	pub is_directory: bool,
	pub relative_path: String,
	pub size: i64,
	pub last_write_time: Option<Timestamp>,
}

impl FileSystemItem {
	pub fn file(relative_path: impl Into<String>, size: i64, last_write_time: Timestamp) -> Self {
		FileSystemItem {
			is_directory: false,
			relative_path: relative_path.into(),
			size,
			last_write_time: Some(last_write_time),
		}
	}

	pub fn directory(relative_path: impl Into<String>) -> Self {
		FileSystemItem {
			is_directory: true,
			relative_path: relative_path.into(),
			size: 0,
			last_write_time: None,
		}
	}
}

/// A locally owned synchronization profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProfile {
	/// Display name
	pub name: String,

	/// Must match on both sides for any profile-scoped message to be honored
	pub key: ProfileKey,

	/// Local root directory of the synchronized tree
	pub root_directory: PathBuf,

	pub allow_send: bool,
	pub allow_receive: bool,
	pub allow_delete: bool,

	/// Skip dot-files and dot-directories when snapshotting
	pub skip_hidden: bool,

	pub creation_date: Timestamp,
	pub last_sync_date: Timestamp,
}

impl SyncProfile {
	/// New profile with a fresh key, send and receive allowed, delete denied
	pub fn new(name: impl Into<String>, root_directory: impl Into<PathBuf>) -> Self {
		SyncProfile {
			name: name.into(),
			key: Uuid::new_v4(),
			root_directory: root_directory.into(),
			allow_send: true,
			allow_receive: true,
			allow_delete: false,
			skip_hidden: true,
			creation_date: Timestamp::now(),
			last_sync_date: Timestamp::default(),
		}
	}

	/// Create a local profile from a share received from a remote device
	pub fn from_share(share: &SyncProfileShare, root_directory: impl Into<PathBuf>) -> Self {
		SyncProfile {
			name: share.name.clone(),
			key: share.key,
			skip_hidden: share.skip_hidden,
			..SyncProfile::new(share.name.clone(), root_directory)
		}
	}

	/// Metadata announced to a peer by a profile share
	pub fn share(&self) -> SyncProfileShare {
		SyncProfileShare { key: self.key, name: self.name.clone(), skip_hidden: self.skip_hidden }
	}
}

/// Profile metadata sent with a profile share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProfileShare {
	pub key: ProfileKey,
	pub name: String,
	pub skip_hidden: bool,
}

/// One side's view of a profile at sync time.
///
/// `tree` is `None` when the sending side shares no enumeration, which is
/// different from an empty directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProfileState {
	pub profile_id: ProfileId,
	pub key: ProfileKey,
	pub allow_delete: bool,
	pub tree: Option<Vec<FileSystemItem>>,
}

/// Classification of profile failures reported to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProfileError {
	/// The local tree snapshot could not be generated
	FailedToGetState,
	/// Files could not be queued for sending
	FailedToSendFiles,
}

impl std::fmt::Display for SyncProfileError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SyncProfileError::FailedToGetState => write!(f, "failed to get state"),
			SyncProfileError::FailedToSendFiles => write!(f, "failed to send files"),
		}
	}
}


// vim: ts=4
