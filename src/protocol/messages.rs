//! Wire message catalog
//!
//! The set of messages is closed: every kind has a stable type tag, a body
//! layout built from the primitives in [`super::codec`], and a handler on the
//! connection side. A payload is the tag byte followed by the body, and the
//! body has to be consumed exactly.

use uuid::Uuid;

use super::codec::{CodecResult, WireDecode, WireEncode, WireReader, WireWriter};
use super::error::ProtocolError;
use crate::types::{FileSystemItem, ProfileId, ProfileKey, SyncProfileShare, SyncProfileState, Timestamp};

/// Length of a verification nonce
pub const NONCE_LEN: usize = 16;

/// Length of a verification proof
pub const PROOF_LEN: usize = 32;

/// Stable numeric message tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
	IsAlive = 1,
	VerificationChallenge = 2,
	VerificationResponse = 3,
	PairingRequest = 4,
	PairingResponse = 5,
	ProfileShare = 6,
	SyncProfile = 7,
	CreateDirectories = 8,
	DeleteFiles = 9,
	DeleteDirectories = 10,
	FileData = 11,
	FileChunkRequest = 12,
}

impl MessageType {
	pub fn from_u8(tag: u8) -> Option<Self> {
		let ty = match tag {
			1 => MessageType::IsAlive,
			2 => MessageType::VerificationChallenge,
			3 => MessageType::VerificationResponse,
			4 => MessageType::PairingRequest,
			5 => MessageType::PairingResponse,
			6 => MessageType::ProfileShare,
			7 => MessageType::SyncProfile,
			8 => MessageType::CreateDirectories,
			9 => MessageType::DeleteFiles,
			10 => MessageType::DeleteDirectories,
			11 => MessageType::FileData,
			12 => MessageType::FileChunkRequest,
			_ => return None,
		};
		Some(ty)
	}

	pub fn as_u8(self) -> u8 {
		self as u8
	}

	/// Whether an unverified connection may process this kind
	pub fn allowed_before_verification(self) -> bool {
		matches!(
			self,
			MessageType::IsAlive
				| MessageType::VerificationChallenge
				| MessageType::VerificationResponse
				| MessageType::PairingRequest
				| MessageType::PairingResponse
		)
	}
}

/// Profile-scoped list of relative paths (directory creation, deletions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathBatch {
	pub profile_id: ProfileId,
	pub key: ProfileKey,
	pub paths: Vec<String>,
}

impl PathBatch {
	fn encode_body(&self, w: &mut WireWriter) -> CodecResult<()> {
		w.write_uuid(&self.profile_id);
		w.write_uuid(&self.key);
		w.write_array(&self.paths)
	}

	fn decode_body(r: &mut WireReader<'_>) -> CodecResult<Self> {
		Ok(PathBatch { profile_id: r.read_uuid()?, key: r.read_uuid()?, paths: r.read_array()? })
	}
}

/// One chunk of file content plus the header identifying its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
	pub profile_id: ProfileId,
	pub key: ProfileKey,
	pub relative_path: String,
	/// Total size of the file being transferred
	pub file_size: i64,
	pub last_write_time: Timestamp,
	pub creation_time: Timestamp,
	pub chunk: Vec<u8>,
}

/// Every message the protocol knows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetMessage {
	IsAlive,
	VerificationChallenge {
		nonce: [u8; NONCE_LEN],
	},
	VerificationResponse {
		proof: [u8; PROOF_LEN],
		display_name: String,
		supports_timestamp: bool,
	},
	PairingRequest {
		display_name: String,
	},
	/// `Some(raw_key)` on acceptance, `None` on refusal
	PairingResponse {
		raw_key: Option<Uuid>,
	},
	ProfileShare {
		profile_id: ProfileId,
		share: SyncProfileShare,
	},
	SyncProfile {
		state: SyncProfileState,
		is_response: bool,
	},
	CreateDirectories(PathBatch),
	DeleteFiles(PathBatch),
	DeleteDirectories(PathBatch),
	FileData(FileData),
	FileChunkRequest,
}

impl NetMessage {
	pub fn message_type(&self) -> MessageType {
		match self {
			NetMessage::IsAlive => MessageType::IsAlive,
			NetMessage::VerificationChallenge { .. } => MessageType::VerificationChallenge,
			NetMessage::VerificationResponse { .. } => MessageType::VerificationResponse,
			NetMessage::PairingRequest { .. } => MessageType::PairingRequest,
			NetMessage::PairingResponse { .. } => MessageType::PairingResponse,
			NetMessage::ProfileShare { .. } => MessageType::ProfileShare,
			NetMessage::SyncProfile { .. } => MessageType::SyncProfile,
			NetMessage::CreateDirectories(_) => MessageType::CreateDirectories,
			NetMessage::DeleteFiles(_) => MessageType::DeleteFiles,
			NetMessage::DeleteDirectories(_) => MessageType::DeleteDirectories,
			NetMessage::FileData(_) => MessageType::FileData,
			NetMessage::FileChunkRequest => MessageType::FileChunkRequest,
		}
	}

	/// Serialize into a frame payload (tag + body)
	pub fn encode(&self) -> CodecResult<Vec<u8>> {
		let mut w = WireWriter::with_capacity(self.size_hint());
		w.write_u8(self.message_type().as_u8());
		match self {
			NetMessage::IsAlive | NetMessage::FileChunkRequest => {}
			NetMessage::VerificationChallenge { nonce } => w.write_raw(nonce),
			NetMessage::VerificationResponse { proof, display_name, supports_timestamp } => {
				w.write_raw(proof);
				w.write_string(display_name)?;
				w.write_bool(*supports_timestamp);
			}
			NetMessage::PairingRequest { display_name } => w.write_string(display_name)?,
			NetMessage::PairingResponse { raw_key } => {
				w.write_bool(raw_key.is_some());
				if let Some(key) = raw_key {
					w.write_uuid(key);
				}
			}
			NetMessage::ProfileShare { profile_id, share } => {
				w.write_uuid(profile_id);
				w.write_uuid(&share.key);
				w.write_string(&share.name)?;
				w.write_bool(share.skip_hidden);
			}
			NetMessage::SyncProfile { state, is_response } => {
				w.write_uuid(&state.profile_id);
				w.write_uuid(&state.key);
				w.write_bool(state.allow_delete);
				w.write_bool(state.tree.is_some());
				if let Some(tree) = &state.tree {
					w.write_array(tree)?;
				}
				w.write_bool(*is_response);
			}
			NetMessage::CreateDirectories(batch)
			| NetMessage::DeleteFiles(batch)
			| NetMessage::DeleteDirectories(batch) => batch.encode_body(&mut w)?,
			NetMessage::FileData(data) => {
				w.write_uuid(&data.profile_id);
				w.write_uuid(&data.key);
				w.write_string(&data.relative_path)?;
				w.write_i64(data.file_size);
				w.write_timestamp(data.last_write_time);
				w.write_timestamp(data.creation_time);
				w.write_bytes(&data.chunk)?;
			}
		}
		Ok(w.into_inner())
	}

	/// Parse a frame payload, rejecting unknown tags and trailing bytes
	pub fn decode(payload: &[u8]) -> CodecResult<Self> {
		let (&tag, body) = payload.split_first().ok_or(ProtocolError::EmptyFrame)?;
		let ty = MessageType::from_u8(tag).ok_or(ProtocolError::UnknownMessageType(tag))?;
		let mut r = WireReader::new(body);

		let msg = match ty {
			MessageType::IsAlive => NetMessage::IsAlive,
			MessageType::FileChunkRequest => NetMessage::FileChunkRequest,
			MessageType::VerificationChallenge => {
				NetMessage::VerificationChallenge { nonce: r.read_fixed()? }
			}
			MessageType::VerificationResponse => NetMessage::VerificationResponse {
				proof: r.read_fixed()?,
				display_name: r.read_string()?,
				supports_timestamp: r.read_bool()?,
			},
			MessageType::PairingRequest => NetMessage::PairingRequest { display_name: r.read_string()? },
			MessageType::PairingResponse => {
				let accepted = r.read_bool()?;
				let raw_key = if accepted { Some(r.read_uuid()?) } else { None };
				NetMessage::PairingResponse { raw_key }
			}
			MessageType::ProfileShare => {
				let profile_id = r.read_uuid()?;
				let share = SyncProfileShare {
					key: r.read_uuid()?,
					name: r.read_string()?,
					skip_hidden: r.read_bool()?,
				};
				NetMessage::ProfileShare { profile_id, share }
			}
			MessageType::SyncProfile => {
				let profile_id = r.read_uuid()?;
				let key = r.read_uuid()?;
				let allow_delete = r.read_bool()?;
				let tree = if r.read_bool()? { Some(r.read_array()?) } else { None };
				let is_response = r.read_bool()?;
				NetMessage::SyncProfile {
					state: SyncProfileState { profile_id, key, allow_delete, tree },
					is_response,
				}
			}
			MessageType::CreateDirectories => {
				NetMessage::CreateDirectories(PathBatch::decode_body(&mut r)?)
			}
			MessageType::DeleteFiles => NetMessage::DeleteFiles(PathBatch::decode_body(&mut r)?),
			MessageType::DeleteDirectories => {
				NetMessage::DeleteDirectories(PathBatch::decode_body(&mut r)?)
			}
			MessageType::FileData => NetMessage::FileData(FileData {
				profile_id: r.read_uuid()?,
				key: r.read_uuid()?,
				relative_path: r.read_string()?,
				file_size: r.read_i64()?,
				last_write_time: r.read_timestamp()?,
				creation_time: r.read_timestamp()?,
				chunk: r.read_bytes()?,
			}),
		};

		r.finish()?;
		Ok(msg)
	}

	fn size_hint(&self) -> usize {
		match self {
			NetMessage::FileData(data) => 128 + data.relative_path.len() + data.chunk.len(),
			NetMessage::SyncProfile { state: SyncProfileState { tree: Some(tree), .. }, .. } => {
				64 + tree.len() * 48
			}
			_ => 64,
		}
	}
}

impl WireEncode for FileSystemItem {
	fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
		w.write_bool(self.is_directory);
		w.write_string(&self.relative_path)?;
		if !self.is_directory {
			w.write_i64(self.size);
			w.write_timestamp(self.last_write_time.unwrap_or_default());
		}
		Ok(())
	}
}

impl WireDecode for FileSystemItem {
	// flag + empty path
	const MIN_WIRE_SIZE: usize = 3;

	fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
		let is_directory = r.read_bool()?;
		let relative_path = r.read_string()?;
		if is_directory {
			return Ok(FileSystemItem::directory(relative_path));
		}
		let size = r.read_i64()?;
		let last_write_time = r.read_timestamp()?;
		Ok(FileSystemItem::file(relative_path, size, last_write_time))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roundtrip(msg: NetMessage) {
		let payload = msg.encode().unwrap();
		assert_eq!(payload[0], msg.message_type().as_u8());
		assert_eq!(NetMessage::decode(&payload).unwrap(), msg);
	}

	#[test]
	fn test_tags_are_stable() {
		for tag in 1..=12u8 {
			assert_eq!(MessageType::from_u8(tag).unwrap().as_u8(), tag);
		}
		assert!(MessageType::from_u8(0).is_none());
		assert!(MessageType::from_u8(13).is_none());
	}

	#[test]
	fn test_admission_set() {
		let allowed: Vec<u8> = (1..=12u8)
			.filter(|t| MessageType::from_u8(*t).unwrap().allowed_before_verification())
			.collect();
		assert_eq!(allowed, vec![1, 2, 3, 4, 5]);
	}

	#[test]
	fn test_empty_bodies() {
		assert_eq!(NetMessage::IsAlive.encode().unwrap(), vec![1]);
		assert_eq!(NetMessage::FileChunkRequest.encode().unwrap(), vec![12]);
	}

	#[test]
	fn test_pairing_refusal_has_no_key() {
		let payload = NetMessage::PairingResponse { raw_key: None }.encode().unwrap();
		assert_eq!(payload, vec![5, 0]);
		roundtrip(NetMessage::PairingResponse { raw_key: Some(Uuid::new_v4()) });
	}

	#[test]
	fn test_sync_profile_without_tree() {
		roundtrip(NetMessage::SyncProfile {
			state: SyncProfileState {
				profile_id: Uuid::new_v4(),
				key: Uuid::new_v4(),
				allow_delete: true,
				tree: None,
			},
			is_response: false,
		});
	}

	#[test]
	fn test_sync_profile_empty_tree_differs_from_none() {
		let state = SyncProfileState {
			profile_id: Uuid::nil(),
			key: Uuid::nil(),
			allow_delete: false,
			tree: Some(Vec::new()),
		};
		let msg = NetMessage::SyncProfile { state, is_response: true };
		let payload = msg.encode().unwrap();
		// tag, two ids, allow_delete, has_tree, count, is_response
		assert_eq!(payload.len(), 1 + 32 + 1 + 1 + 4 + 1);
		roundtrip(msg);
	}

	#[test]
	fn test_directory_item_omits_size_and_time() {
		let mut w = WireWriter::new();
		FileSystemItem::directory("a").encode(&mut w).unwrap();
		assert_eq!(w.into_inner(), vec![1, 1, 0, b'a']);
	}

	#[test]
	fn test_zero_length_chunk() {
		roundtrip(NetMessage::FileData(FileData {
			profile_id: Uuid::new_v4(),
			key: Uuid::new_v4(),
			relative_path: "empty.bin".into(),
			file_size: 0,
			last_write_time: Timestamp::from_ticks(1),
			creation_time: Timestamp::from_ticks(2),
			chunk: Vec::new(),
		}));
	}

	#[test]
	fn test_unknown_tag() {
		assert!(matches!(NetMessage::decode(&[99]), Err(ProtocolError::UnknownMessageType(99))));
	}

	#[test]
	fn test_empty_payload() {
		assert!(matches!(NetMessage::decode(&[]), Err(ProtocolError::EmptyFrame)));
	}

	#[test]
	fn test_trailing_bytes_rejected() {
		assert!(matches!(NetMessage::decode(&[1, 0]), Err(ProtocolError::TrailingBytes(1))));
	}

	#[test]
	fn test_truncated_body_rejected() {
		let mut payload = NetMessage::PairingRequest { display_name: "Alice".into() }.encode().unwrap();
		payload.pop();
		assert!(matches!(NetMessage::decode(&payload), Err(ProtocolError::Truncated { .. })));
	}
}

// vim: ts=4
