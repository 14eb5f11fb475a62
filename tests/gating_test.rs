//! Admission and authorization checks, driven by a hand-written remote that
//! speaks raw frames

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use syncr_peer::protocol::{self, PathBatch, DEFAULT_MAX_FRAME_SIZE};
use syncr_peer::{security, Connection, NetMessage, Peer, PeerBuilder, ProfileId, SyncProfile};

use common::*;

struct Fixture {
	root: tempfile::TempDir,
	peer: Peer,
	conn: Arc<Connection>,
	remote: Remote,
	profile_id: ProfileId,
	profile_key: Uuid,
	raw_key: Uuid,
}

fn fixture(configure: impl FnOnce(&mut SyncProfile)) -> Fixture {
	let root = tempfile::TempDir::new().unwrap();
	let remote_id = Uuid::new_v4();
	let raw_key = Uuid::new_v4();
	let profile_id = Uuid::new_v4();
	let mut profile = SyncProfile::new("Docs", root.path());
	profile.allow_delete = true;
	configure(&mut profile);
	let profile_key = profile.key;

	let peer = PeerBuilder::new(settings("Bob"))
		.device_keys(HashMap::from([(remote_id, raw_key)]))
		.profiles(HashMap::from([(profile_id, profile)]))
		.build()
		.unwrap();
	let (local_end, remote_end) = tokio::io::duplex(1 << 16);
	let conn = peer.add_connection(remote_id, local_end);

	Fixture {
		root,
		peer,
		conn,
		remote: Remote { id: remote_id, stream: remote_end },
		profile_id,
		profile_key,
		raw_key,
	}
}

fn batch(profile_id: ProfileId, key: Uuid, paths: &[&str]) -> PathBatch {
	PathBatch { profile_id, key, paths: paths.iter().map(|p| p.to_string()).collect() }
}

#[tokio::test]
async fn test_unverified_connection_drops_gated_messages() {
	let mut f = fixture(|_| {});
	write_file(f.root.path(), "keep.txt", b"keep");

	let create = batch(f.profile_id, f.profile_key, &["created"]);
	let delete = batch(f.profile_id, f.profile_key, &["keep.txt"]);
	f.remote.send(NetMessage::CreateDirectories(create)).await;
	f.remote.send(NetMessage::DeleteFiles(delete)).await;
	f.remote.send(NetMessage::FileChunkRequest).await;

	// Handled in order, so once this is answered the gated ones were seen
	f.remote.send(NetMessage::PairingRequest { display_name: "Mallory".to_string() }).await;
	let answer = f.remote.recv_until(|m| matches!(m, NetMessage::PairingResponse { .. })).await;
	assert_eq!(answer, NetMessage::PairingResponse { raw_key: None });

	assert!(!f.root.path().join("created").exists());
	assert!(f.root.path().join("keep.txt").exists());
	assert!(!f.conn.is_verified());
	assert!(!f.conn.is_disposed());
	assert_eq!(f.peer.profiles().get(&f.profile_id).unwrap().last_sync_date.ticks(), 0);
}

#[tokio::test]
async fn test_wrong_proof_does_not_verify() {
	let mut f = fixture(|_| {});
	let nonce = match f.remote.recv_until(|m| matches!(m, NetMessage::VerificationChallenge { .. })).await {
		NetMessage::VerificationChallenge { nonce } => nonce,
		_ => unreachable!(),
	};
	let wrong = security::derive_verification_key(&Uuid::new_v4(), &f.remote.id);
	f.remote
		.send(NetMessage::VerificationResponse {
			proof: security::compute_proof(&wrong, &nonce),
			display_name: "Mallory".to_string(),
			supports_timestamp: true,
		})
		.await;
	f.remote.send(NetMessage::CreateDirectories(batch(f.profile_id, f.profile_key, &["created"]))).await;
	f.remote.send(NetMessage::PairingRequest { display_name: "Mallory".to_string() }).await;
	f.remote.recv_until(|m| matches!(m, NetMessage::PairingResponse { .. })).await;

	assert!(!f.conn.is_verified());
	assert!(!f.root.path().join("created").exists());
}

#[tokio::test]
async fn test_key_mismatch_touches_nothing() {
	let mut f = fixture(|_| {});
	write_file(f.root.path(), "keep.txt", b"keep");
	let raw_key = f.raw_key;
	f.remote.verify(raw_key).await;
	wait_until("verified", || f.conn.is_verified()).await;

	let wrong = Uuid::new_v4();
	f.remote.send(NetMessage::CreateDirectories(batch(f.profile_id, wrong, &["wrong"]))).await;
	f.remote.send(NetMessage::DeleteFiles(batch(f.profile_id, wrong, &["keep.txt"]))).await;
	f.remote.send(NetMessage::DeleteDirectories(batch(f.profile_id, wrong, &[""]))).await;
	f.remote.send(NetMessage::CreateDirectories(batch(f.profile_id, f.profile_key, &["right"]))).await;

	let root = f.root.path().to_path_buf();
	wait_until("authorized directory", || root.join("right").is_dir()).await;
	assert!(!root.join("wrong").exists());
	assert!(root.join("keep.txt").exists());
}

#[tokio::test]
async fn test_permission_flags_gate_operations() {
	let mut f = fixture(|p| {
		p.allow_receive = false;
		p.allow_delete = false;
	});
	write_file(f.root.path(), "keep.txt", b"keep");
	let raw_key = f.raw_key;
	f.remote.verify(raw_key).await;
	wait_until("verified", || f.conn.is_verified()).await;

	f.remote.send(NetMessage::CreateDirectories(batch(f.profile_id, f.profile_key, &["created"]))).await;
	f.remote.send(NetMessage::DeleteFiles(batch(f.profile_id, f.profile_key, &["keep.txt"]))).await;
	f.remote.send(NetMessage::PairingRequest { display_name: "Mallory".to_string() }).await;
	f.remote.recv_until(|m| matches!(m, NetMessage::PairingResponse { .. })).await;

	assert!(!f.root.path().join("created").exists());
	assert!(f.root.path().join("keep.txt").exists());
}

#[tokio::test]
async fn test_paths_cannot_escape_the_root() {
	let outer = tempfile::TempDir::new().unwrap();
	let mut f = fixture(|_| {});
	let raw_key = f.raw_key;
	f.remote.verify(raw_key).await;
	wait_until("verified", || f.conn.is_verified()).await;

	let escape = format!("../{}/escaped", outer.path().file_name().unwrap().to_str().unwrap());
	let absolute = outer.path().join("absolute").display().to_string();
	f.remote
		.send(NetMessage::CreateDirectories(batch(f.profile_id, f.profile_key, &[&escape, &absolute, "inside"])))
		.await;

	let root = f.root.path().to_path_buf();
	wait_until("safe path created", || root.join("inside").is_dir()).await;
	assert!(!outer.path().join("escaped").exists());
	assert!(!outer.path().join("absolute").exists());
}

#[tokio::test]
async fn test_deletes_apply_and_advance_last_sync() {
	let mut f = fixture(|_| {});
	write_file(f.root.path(), "old.txt", b"old");
	write_file(f.root.path(), "stale/nested.txt", b"nested");
	let raw_key = f.raw_key;
	f.remote.verify(raw_key).await;
	wait_until("verified", || f.conn.is_verified()).await;

	f.remote.send(NetMessage::DeleteFiles(batch(f.profile_id, f.profile_key, &["old.txt", "missing.txt"]))).await;
	f.remote.send(NetMessage::DeleteDirectories(batch(f.profile_id, f.profile_key, &["stale"]))).await;

	let root = f.root.path().to_path_buf();
	wait_until("deletes applied", || !root.join("old.txt").exists() && !root.join("stale").exists()).await;
	assert!(f.peer.profiles().get(&f.profile_id).unwrap().last_sync_date.ticks() > 0);
}

#[tokio::test]
async fn test_sync_request_with_wrong_key_gets_no_answer() {
	let mut f = fixture(|_| {});
	let raw_key = f.raw_key;
	f.remote.verify(raw_key).await;
	wait_until("verified", || f.conn.is_verified()).await;

	let mut state = syncr_peer::SyncProfileState {
		profile_id: f.profile_id,
		key: Uuid::new_v4(),
		allow_delete: false,
		tree: Some(Vec::new()),
	};
	f.remote.send(NetMessage::SyncProfile { state: state.clone(), is_response: false }).await;
	state.key = f.profile_key;
	f.remote.send(NetMessage::SyncProfile { state, is_response: false }).await;

	// Only the second request is answered
	let answer = f.remote.recv_until(|m| matches!(m, NetMessage::SyncProfile { .. })).await;
	match answer {
		NetMessage::SyncProfile { state, is_response } => {
			assert!(is_response);
			assert_eq!(state.key, f.profile_key);
			assert_eq!(state.tree, Some(Vec::new()));
		}
		_ => unreachable!(),
	}
}

#[tokio::test]
async fn test_malformed_frame_disconnects() {
	let mut f = fixture(|_| {});
	protocol::write_frame(&mut f.remote.stream, &[200, 1, 2, 3], DEFAULT_MAX_FRAME_SIZE).await.unwrap();

	wait_until("disconnect", || f.conn.is_disposed()).await;
	assert!(f.peer.connections().is_empty());
}

#[tokio::test]
async fn test_truncated_body_disconnects() {
	let mut f = fixture(|_| {});
	// PairingRequest whose string length claims more bytes than follow
	protocol::write_frame(&mut f.remote.stream, &[4, 10, 0, b'a'], DEFAULT_MAX_FRAME_SIZE).await.unwrap();

	wait_until("disconnect", || f.conn.is_disposed()).await;
}

// vim: ts=4
