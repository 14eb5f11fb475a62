//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::DuplexStream;
use uuid::Uuid;

use syncr_peer::protocol::{self, DEFAULT_MAX_FRAME_SIZE};
use syncr_peer::{
	security, Connection, NetMessage, Peer, PeerBuilder, PeerCallbacks, PeerSettings, ProfileId, SyncProfile,
};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(10);

pub fn settings(name: &str) -> PeerSettings {
	PeerSettings::new(Uuid::new_v4(), name)
}

pub fn peer(settings: PeerSettings, callbacks: Arc<dyn PeerCallbacks>) -> Peer {
	PeerBuilder::new(settings).callbacks(callbacks).build().unwrap()
}

/// Two peers that already share a pairing key
pub fn paired_peers(
	a: PeerSettings,
	a_callbacks: Arc<dyn PeerCallbacks>,
	b: PeerSettings,
	b_callbacks: Arc<dyn PeerCallbacks>,
) -> (Peer, Peer) {
	let key = Uuid::new_v4();
	let a_id = a.device_id;
	let b_id = b.device_id;
	let a = PeerBuilder::new(a)
		.callbacks(a_callbacks)
		.device_keys(HashMap::from([(b_id, key)]))
		.build()
		.unwrap();
	let b = PeerBuilder::new(b)
		.callbacks(b_callbacks)
		.device_keys(HashMap::from([(a_id, key)]))
		.build()
		.unwrap();
	(a, b)
}

/// Connect two peers over an in-memory stream
pub fn connect(a: &Peer, b: &Peer) -> (Arc<Connection>, Arc<Connection>) {
	let (a_end, b_end) = tokio::io::duplex(1 << 20);
	let a_conn = a.add_connection(b.device_id(), a_end);
	let b_conn = b.add_connection(a.device_id(), b_end);
	(a_conn, b_conn)
}

/// Poll `cond` until it holds; panics after [`WAIT`]
pub async fn wait_until<F: FnMut() -> bool>(what: &str, mut cond: F) {
	let deadline = tokio::time::Instant::now() + WAIT;
	while !cond() {
		if tokio::time::Instant::now() > deadline {
			panic!("timed out waiting for {}", what);
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

/// The same profile registered on both peers, each with its own root
pub fn shared_profile(
	a: &Peer,
	a_profile: SyncProfile,
	b: &Peer,
	b_root: &Path,
	configure_b: impl FnOnce(&mut SyncProfile),
) -> ProfileId {
	let profile_id = Uuid::new_v4();
	let mut b_profile = SyncProfile::from_share(&a_profile.share(), b_root);
	configure_b(&mut b_profile);
	assert!(a.profiles().add(profile_id, a_profile));
	assert!(b.profiles().add(profile_id, b_profile));
	profile_id
}

pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, content).unwrap();
}

pub fn read_file(root: &Path, relative: &str) -> Option<Vec<u8>> {
	fs::read(root.join(relative)).ok()
}

/// Every temporary build file below `root`
pub fn temp_files(root: &Path) -> Vec<String> {
	let mut found = Vec::new();
	let mut stack = vec![root.to_path_buf()];
	while let Some(dir) = stack.pop() {
		for entry in fs::read_dir(&dir).unwrap() {
			let path = entry.unwrap().path();
			if path.is_dir() {
				stack.push(path);
			} else if path.extension().is_some_and(|e| e == "synctmp") {
				found.push(path.display().to_string());
			}
		}
	}
	found
}

/// Hand-written remote device speaking raw frames
pub struct Remote {
	pub id: Uuid,
	pub stream: DuplexStream,
}

impl Remote {
	pub async fn send(&mut self, msg: NetMessage) {
		protocol::write_message(&mut self.stream, &msg, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
	}

	pub async fn recv(&mut self) -> Option<NetMessage> {
		protocol::read_message(&mut self.stream, DEFAULT_MAX_FRAME_SIZE).await.unwrap()
	}

	/// Skip messages until one matches
	pub async fn recv_until<F: Fn(&NetMessage) -> bool>(&mut self, pred: F) -> NetMessage {
		loop {
			let msg = tokio::time::timeout(WAIT, self.recv()).await.unwrap().unwrap();
			if pred(&msg) {
				return msg;
			}
		}
	}

	/// Answer the peer's challenge with a proof for `raw_key`
	pub async fn verify(&mut self, raw_key: Uuid) {
		let nonce = match self.recv_until(|m| matches!(m, NetMessage::VerificationChallenge { .. })).await {
			NetMessage::VerificationChallenge { nonce } => nonce,
			_ => unreachable!(),
		};
		let vk = security::derive_verification_key(&raw_key, &self.id);
		self.send(NetMessage::VerificationResponse {
			proof: security::compute_proof(&vk, &nonce),
			display_name: "Mallory".to_string(),
			supports_timestamp: true,
		})
		.await;
	}
}

/// Deterministic test payload
pub fn pattern(len: usize) -> Vec<u8> {
	(0..len).map(|i| (i * 31 % 251) as u8).collect()
}

// vim: ts=4
