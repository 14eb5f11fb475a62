//! Per-message handlers
//!
//! Everything here runs on the connection's dispatch loop, one message at a
//! time. Disk access goes through [`run_blocking`], so the next message is
//! only handled after the filesystem work of the previous one finished.
//! Authorization failures are logged and dropped; nothing tells the remote
//! which check failed.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use super::{run_blocking, Connection};
use crate::callbacks::{PairingRequest, ProfileReceivedEvent};
use crate::error::PeerError;
use crate::logging::*;
use crate::peer::PeerShared;
use crate::protocol::{FileData, NetMessage, PathBatch, NONCE_LEN, PROOF_LEN};
use crate::security;
use crate::transfer::{FileSendInfo, MessageSink};
use crate::tree::DirectoryTreeDifference;
use crate::types::{
	FileSystemItem, ProfileId, ProfileKey, SyncProfile, SyncProfileError, SyncProfileShare, SyncProfileState,
};
use crate::validation::resolve_wire_path;

/// Which filesystem operation a path batch asks for
#[derive(Debug, Clone, Copy)]
enum BatchOp {
	CreateDirectories,
	DeleteFiles,
	DeleteDirectories,
}

impl Connection {
	pub(crate) async fn handle_message(self: &Arc<Self>, msg: NetMessage) {
		let ty = msg.message_type();
		if !self.is_verified() && !ty.allowed_before_verification() {
			warn!("Dropping {:?} from unverified {}", ty, self.remote_id);
			return;
		}
		trace!("{} <- {:?}", self.remote_id, ty);

		let peer = match self.peer() {
			Ok(peer) => peer,
			Err(_) => {
				debug!("Peer gone, ignoring {:?} from {}", ty, self.remote_id);
				return;
			}
		};

		match msg {
			NetMessage::IsAlive => {}
			NetMessage::VerificationChallenge { nonce } => self.on_challenge(&peer, &nonce),
			NetMessage::VerificationResponse { proof, display_name, supports_timestamp } => {
				self.on_verification_response(&peer, &proof, &display_name, supports_timestamp)
			}
			NetMessage::PairingRequest { display_name } => self.on_pairing_request(&peer, display_name),
			NetMessage::PairingResponse { raw_key } => self.on_pairing_response(&peer, raw_key),
			NetMessage::ProfileShare { profile_id, share } => self.on_profile_share(&peer, profile_id, share),
			NetMessage::SyncProfile { state, is_response } => self.on_sync_profile(&peer, state, is_response).await,
			NetMessage::CreateDirectories(batch) => {
				self.on_path_batch(&peer, batch, BatchOp::CreateDirectories).await
			}
			NetMessage::DeleteFiles(batch) => self.on_path_batch(&peer, batch, BatchOp::DeleteFiles).await,
			NetMessage::DeleteDirectories(batch) => {
				self.on_path_batch(&peer, batch, BatchOp::DeleteDirectories).await
			}
			NetMessage::FileData(data) => self.on_file_data(&peer, data),
			NetMessage::FileChunkRequest => self.on_chunk_request().await,
		}
	}

	// ========================================================================
	// VERIFICATION
	// ========================================================================

	fn on_challenge(&self, peer: &PeerShared, nonce: &[u8; NONCE_LEN]) {
		let Some(raw_key) = peer.device_keys.get(&self.remote_id) else {
			debug!("No key for {}, not answering challenge", self.remote_id);
			return;
		};
		let vk = security::derive_verification_key(&raw_key, &self.settings.device_id);
		self.send_or_log(NetMessage::VerificationResponse {
			proof: security::compute_proof(&vk, nonce),
			display_name: self.settings.display_name.clone(),
			supports_timestamp: self.settings.supports_timestamp,
		});
	}

	fn on_verification_response(
		&self,
		peer: &PeerShared,
		proof: &[u8; PROOF_LEN],
		display_name: &str,
		remote_supports_timestamp: bool,
	) {
		let Some(nonce) = self.pending_challenge.lock().unwrap_or_else(|e| e.into_inner()).take() else {
			warn!("Unsolicited verification response from {}", self.remote_id);
			return;
		};
		let Some(raw_key) = peer.device_keys.get(&self.remote_id) else {
			warn!("Verification response from unknown device {}", self.remote_id);
			return;
		};
		let vk = security::derive_verification_key(&raw_key, &self.remote_id);
		if !security::verify_proof(&vk, &nonce, proof) {
			warn!("Verification of {} failed (proof {})", self.remote_id, hex::encode(&proof[..8]));
			return;
		}

		self.set_display_name(display_name);
		self.supports_timestamp
			.store(remote_supports_timestamp && self.settings.supports_timestamp, Ordering::SeqCst);
		let was_verified = self.verified.swap(true, Ordering::SeqCst);
		if !was_verified {
			info!("Verified {} ({})", display_name, self.remote_id);
			peer.events.connection_verified(self.remote_id, display_name);
		}
	}

	// ========================================================================
	// PAIRING
	// ========================================================================

	fn on_pairing_request(self: &Arc<Self>, peer: &PeerShared, display_name: String) {
		if !peer.allow_pairing.load(Ordering::SeqCst) {
			info!("Pairing request from {} ({}) refused: pairing disabled", display_name, self.remote_id);
			self.refuse_pairing();
			return;
		}
		self.set_display_name(&display_name);
		info!("Pairing request from {} ({})", display_name, self.remote_id);
		peer.events.pairing_request(PairingRequest::new(self.remote_id, display_name, Arc::downgrade(self)));
	}

	fn on_pairing_response(&self, peer: &PeerShared, raw_key: Option<uuid::Uuid>) {
		if !self.pairing.swap(false, Ordering::SeqCst) {
			warn!("Pairing response from {} without a pairing request", self.remote_id);
			return;
		}
		match raw_key {
			Some(raw_key) => {
				peer.device_keys.upsert(self.remote_id, raw_key);
				info!("Paired with {}", self.remote_id);
				peer.events.new_pair_added(self.remote_id);
				self.send_challenge();
			}
			None => info!("{} refused pairing", self.remote_id),
		}
	}

	// ========================================================================
	// PROFILES
	// ========================================================================

	fn on_profile_share(&self, peer: &PeerShared, profile_id: ProfileId, share: SyncProfileShare) {
		debug!("Profile {} ({}) shared by {}", share.name, profile_id, self.remote_id);
		peer.events.profile_received(ProfileReceivedEvent { remote_device_id: self.remote_id, profile_id, share });
	}

	async fn on_sync_profile(self: &Arc<Self>, peer: &PeerShared, state: SyncProfileState, is_response: bool) {
		let Some(profile) = self.authorized_profile(peer, state.profile_id, &state.key) else {
			return;
		};

		if profile.allow_send {
			self.start_profile_sync(peer, state.profile_id, &profile, &state).await;
		} else {
			debug!("Profile {} does not allow sending", state.profile_id);
		}

		if !is_response {
			if let Err(e) = self.send_profile_state(state.profile_id, true).await {
				warn!("Cannot answer sync of {} from {}: {}", state.profile_id, self.remote_id, e);
			}
		}
	}

	/// Local profile if it exists and `key` matches
	fn authorized_profile(&self, peer: &PeerShared, profile_id: ProfileId, key: &ProfileKey) -> Option<SyncProfile> {
		let Some(profile) = peer.profiles.get(&profile_id) else {
			debug!("{} referenced unknown profile {}", self.remote_id, profile_id);
			return None;
		};
		if profile.key != *key {
			warn!("Key mismatch for profile {} from {}", profile_id, self.remote_id);
			return None;
		}
		Some(profile)
	}

	/// Send our state of a profile. The tree is included only when we accept
	/// files for it.
	pub(crate) async fn send_profile_state(&self, profile_id: ProfileId, is_response: bool) -> Result<(), PeerError> {
		let peer = self.peer()?;
		let profile = peer.profiles.get(&profile_id).ok_or(PeerError::UnknownProfile(profile_id))?;

		let tree = if profile.allow_receive {
			match self.scan(&profile).await {
				Ok(tree) => Some(tree),
				Err(source) => {
					peer.profiles.report_error(profile_id, SyncProfileError::FailedToGetState);
					return Err(PeerError::FailedToGetState { profile_id, source });
				}
			}
		} else {
			None
		};

		let state = SyncProfileState { profile_id, key: profile.key, allow_delete: profile.allow_delete, tree };
		self.send(NetMessage::SyncProfile { state, is_response })
	}

	/// Snapshot a profile root on the blocking pool
	async fn scan(&self, profile: &SyncProfile) -> io::Result<Vec<FileSystemItem>> {
		let fs = Arc::clone(&self.fs);
		let root = profile.root_directory.clone();
		let skip_hidden = profile.skip_hidden;
		self.progress.set_indeterminate(true);
		let tree = run_blocking(move || fs.generate_tree(&root, skip_hidden)).await;
		self.progress.set_indeterminate(false);
		tree
	}

	/// Diff against the remote state and push what the remote lacks
	async fn start_profile_sync(
		self: &Arc<Self>,
		peer: &PeerShared,
		profile_id: ProfileId,
		profile: &SyncProfile,
		remote: &SyncProfileState,
	) {
		let Some(remote_tree) = remote.tree.as_deref() else {
			debug!("{} sent no tree for {}, nothing to send", self.remote_id, profile_id);
			return;
		};

		let local_tree = match self.scan(profile).await {
			Ok(tree) => tree,
			Err(e) => {
				warn!("Cannot scan {}: {}", profile.root_directory.display(), e);
				peer.profiles.report_error(profile_id, SyncProfileError::FailedToGetState);
				return;
			}
		};

		let diff = DirectoryTreeDifference::new(&local_tree, remote_tree, self.supports_timestamp());
		if diff.is_empty() {
			debug!("Profile {} already in sync with {}", profile_id, self.remote_id);
			return;
		}

		let mut sent = false;
		if remote.allow_delete {
			sent |= self.send_batch(profile_id, profile, &diff.local_missing_files, NetMessage::DeleteFiles);
			sent |= self.send_batch(profile_id, profile, &diff.local_missing_directories, NetMessage::DeleteDirectories);
		}
		sent |=
			self.send_batch(profile_id, profile, &diff.remote_missing_directories, NetMessage::CreateDirectories);

		let files = FileSendInfo::from_items(profile_id, profile, &diff.remote_missing_files);
		if !files.is_empty() {
			info!("Sending {} files of {} to {}", files.len(), profile.name, self.remote_id);
			// Queueing reads the first chunk
			let conn = Arc::clone(self);
			match run_blocking(move || conn.file_sender().add_files(&*conn, files)).await {
				Ok(()) => sent = true,
				Err(e) => {
					warn!("Cannot send files of {}: {}", profile_id, e);
					peer.profiles.report_error(profile_id, SyncProfileError::FailedToSendFiles);
				}
			}
		}

		if sent {
			peer.profiles.update_last_sync(&profile_id);
		}
	}

	/// Send a non-empty path batch; true when something went out
	fn send_batch(
		&self,
		profile_id: ProfileId,
		profile: &SyncProfile,
		items: &[FileSystemItem],
		wrap: fn(PathBatch) -> NetMessage,
	) -> bool {
		if items.is_empty() {
			return false;
		}
		let paths = items.iter().map(|item| item.relative_path.clone()).collect();
		let msg = wrap(PathBatch { profile_id, key: profile.key, paths });
		let ty = msg.message_type();
		match self.send(msg) {
			Ok(()) => {
				debug!("{:?} with {} paths to {}", ty, items.len(), self.remote_id);
				true
			}
			Err(e) => {
				warn!("Cannot send {:?} to {}: {}", ty, self.remote_id, e);
				false
			}
		}
	}

	// ========================================================================
	// FILESYSTEM OPERATIONS
	// ========================================================================

	async fn on_path_batch(&self, peer: &PeerShared, batch: PathBatch, op: BatchOp) {
		let Some(profile) = self.authorized_profile(peer, batch.profile_id, &batch.key) else {
			return;
		};
		let permitted = match op {
			BatchOp::CreateDirectories => profile.allow_receive,
			BatchOp::DeleteFiles | BatchOp::DeleteDirectories => profile.allow_delete,
		};
		if !permitted {
			warn!("{:?} from {} not permitted for profile {}", op, self.remote_id, batch.profile_id);
			return;
		}
		if batch.paths.is_empty() {
			return;
		}

		let profile_id = batch.profile_id;
		let fs = Arc::clone(&self.fs);
		let remote_id = self.remote_id;
		let applied = run_blocking(move || {
			for relative in &batch.paths {
				let path = match resolve_wire_path(&profile.root_directory, relative) {
					Ok(path) => path,
					Err(e) => {
						warn!("Skipping {:?} from {}: {}", relative, remote_id, e);
						continue;
					}
				};
				let result = match op {
					BatchOp::CreateDirectories => fs.create_directory(&path),
					BatchOp::DeleteFiles => fs.delete_file(&path),
					BatchOp::DeleteDirectories => fs.delete_directory(&path),
				};
				match result {
					Ok(()) => debug!("{:?}: {}", op, relative),
					Err(e) => warn!("{:?} failed for {}: {}", op, path.display(), e),
				}
			}
			Ok::<(), io::Error>(())
		})
		.await;
		if let Err(e) = applied {
			warn!("{:?} from {} aborted: {}", op, self.remote_id, e);
		}
		peer.profiles.update_last_sync(&profile_id);
	}

	// ========================================================================
	// TRANSFER
	// ========================================================================

	fn on_file_data(self: &Arc<Self>, peer: &PeerShared, data: FileData) {
		let reply: Weak<dyn MessageSink> = Arc::downgrade(self) as Weak<dyn MessageSink>;
		peer.file_builder().enqueue(data, reply, Arc::clone(&self.progress));
	}

	async fn on_chunk_request(self: &Arc<Self>) {
		if self.sender.get().is_none() {
			debug!("Chunk request from {} with nothing queued", self.remote_id);
			return;
		}
		let conn = Arc::clone(self);
		if let Err(e) = run_blocking(move || conn.file_sender().on_chunk_request(&*conn)).await {
			warn!("Cannot send chunk to {}: {}", self.remote_id, e);
		}
	}
}

// vim: ts=4
