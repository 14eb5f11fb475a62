//! Connection to one remote device
//!
//! A connection wraps a duplex byte stream and runs four tasks on it:
//! - a writer draining the outbound queue into frames
//! - a dispatch loop reading frames and handling them in order; filesystem
//!   work of a handler runs on the blocking pool while the loop waits for it
//! - a liveness timer sending `IsAlive`
//! - a stall watchdog disconnecting when a transfer stops moving
//!
//! Trust state starts unverified. Until a verification response checks out
//! only the handshake and liveness messages are processed; everything else
//! is dropped without a reply.

mod handlers;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PeerSettings;
use crate::error::PeerError;
use crate::filesystem::FileSystem;
use crate::logging::*;
use crate::peer::PeerShared;
use crate::progress::{ProgressCounter, ProgressSnapshot};
use crate::protocol::{self, NetMessage, NONCE_LEN};
use crate::security;
use crate::transfer::{FileSender, MessageSink};
use crate::types::DeviceId;

#[derive(Default)]
struct ConnectionTasks {
	ping: Option<JoinHandle<()>>,
	watchdog: Option<JoinHandle<()>>,
	dispatch: Option<JoinHandle<()>>,
	writer: Option<JoinHandle<()>>,
}

pub struct Connection {
	remote_id: DeviceId,
	peer: Weak<PeerShared>,
	settings: Arc<PeerSettings>,
	fs: Arc<dyn FileSystem>,

	verified: AtomicBool,
	pairing: AtomicBool,
	supports_timestamp: AtomicBool,
	display_name: RwLock<String>,
	/// Nonce of the challenge we sent and still wait an answer for
	pending_challenge: Mutex<Option<[u8; NONCE_LEN]>>,

	outbound: mpsc::UnboundedSender<Vec<u8>>,
	outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,

	progress: Arc<ProgressCounter>,
	sender: OnceLock<FileSender>,

	tasks: Mutex<ConnectionTasks>,
	disposed: AtomicBool,
}

impl Connection {
	pub(crate) fn new(remote_id: DeviceId, peer: &Arc<PeerShared>) -> Arc<Self> {
		let (outbound, outbound_rx) = mpsc::unbounded_channel();
		Arc::new(Connection {
			remote_id,
			peer: Arc::downgrade(peer),
			settings: Arc::clone(&peer.settings),
			fs: Arc::clone(&peer.fs),
			verified: AtomicBool::new(false),
			pairing: AtomicBool::new(false),
			supports_timestamp: AtomicBool::new(false),
			display_name: RwLock::new(String::new()),
			pending_challenge: Mutex::new(None),
			outbound,
			outbound_rx: Mutex::new(Some(outbound_rx)),
			progress: Arc::new(ProgressCounter::new()),
			sender: OnceLock::new(),
			tasks: Mutex::new(ConnectionTasks::default()),
			disposed: AtomicBool::new(false),
		})
	}

	/// Send the initial challenge and spawn the connection tasks
	pub(crate) fn start<S>(self: &Arc<Self>, stream: S)
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let Some(rx) = self.outbound_rx.lock().unwrap_or_else(|e| e.into_inner()).take() else {
			warn!("Connection to {} already started", self.remote_id);
			return;
		};
		let (reader, writer) = tokio::io::split(stream);

		self.send_challenge();

		let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
		tasks.writer = Some(tokio::spawn(run_writer(
			writer,
			rx,
			self.settings.max_frame_size,
			Arc::downgrade(self),
		)));
		tasks.dispatch = Some(tokio::spawn(run_dispatch(Arc::clone(self), reader)));
		tasks.ping = Some(tokio::spawn(run_ping(Arc::downgrade(self), self.settings.ping_interval())));
		tasks.watchdog = Some(tokio::spawn(run_watchdog(
			Arc::downgrade(self),
			self.settings.progress_check_interval(),
			self.settings.progress_timeout(),
		)));
	}

	// ========================================================================
	// STATE
	// ========================================================================

	pub fn remote_id(&self) -> DeviceId {
		self.remote_id
	}

	pub fn is_verified(&self) -> bool {
		self.verified.load(Ordering::SeqCst)
	}

	pub fn is_pairing(&self) -> bool {
		self.pairing.load(Ordering::SeqCst)
	}

	/// Whether last-write times are compared when diffing with this peer
	pub fn supports_timestamp(&self) -> bool {
		self.supports_timestamp.load(Ordering::SeqCst)
	}

	/// Name the remote announced; empty until it pairs or verifies
	pub fn display_name(&self) -> String {
		self.display_name.read().unwrap_or_else(|e| e.into_inner()).clone()
	}

	fn set_display_name(&self, name: &str) {
		*self.display_name.write().unwrap_or_else(|e| e.into_inner()) = name.to_string();
	}

	pub fn progress(&self) -> ProgressSnapshot {
		self.progress.snapshot()
	}

	pub fn is_send_queue_empty(&self) -> bool {
		self.sender.get().map_or(true, FileSender::is_send_queue_empty)
	}

	/// Transfer in flight or files waiting to be sent
	pub fn is_syncing(&self) -> bool {
		self.progress.in_flight() || !self.is_send_queue_empty()
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	pub(crate) fn file_sender(&self) -> &FileSender {
		self.sender.get_or_init(|| {
			FileSender::new(Arc::clone(&self.fs), self.settings.chunk_size, Arc::clone(&self.progress))
		})
	}

	pub(crate) fn peer(&self) -> Result<Arc<PeerShared>, PeerError> {
		self.peer.upgrade().ok_or(PeerError::ConnectionClosed(self.remote_id))
	}

	// ========================================================================
	// OUTBOUND
	// ========================================================================

	/// Queue a message for the writer task. Safe from any thread.
	pub fn send(&self, msg: NetMessage) -> Result<(), PeerError> {
		let payload = msg.encode()?;
		if payload.len() > self.settings.max_frame_size {
			return Err(protocol::ProtocolError::FrameTooLarge {
				size: payload.len(),
				max: self.settings.max_frame_size,
			}
			.into());
		}
		self.outbound.send(payload).map_err(|_| PeerError::ConnectionClosed(self.remote_id))
	}

	fn send_or_log(&self, msg: NetMessage) {
		let ty = msg.message_type();
		if let Err(e) = self.send(msg) {
			warn!("Cannot send {:?} to {}: {}", ty, self.remote_id, e);
		}
	}

	// ========================================================================
	// VERIFICATION & PAIRING
	// ========================================================================

	/// Challenge the remote to prove it holds our shared key
	pub(crate) fn send_challenge(&self) {
		let nonce = security::generate_nonce();
		*self.pending_challenge.lock().unwrap_or_else(|e| e.into_inner()) = Some(nonce);
		self.send_or_log(NetMessage::VerificationChallenge { nonce });
	}

	/// Ask the remote device to pair with us
	pub(crate) fn start_pairing(&self) -> Result<(), PeerError> {
		if self.is_verified() {
			return Err(PeerError::AlreadyVerified(self.remote_id));
		}
		self.pairing.store(true, Ordering::SeqCst);
		let request = NetMessage::PairingRequest { display_name: self.settings.display_name.clone() };
		if let Err(e) = self.send(request) {
			self.pairing.store(false, Ordering::SeqCst);
			return Err(e);
		}
		info!("Pairing requested with {}", self.remote_id);
		Ok(())
	}

	/// Application accepted the remote's pairing request
	pub(crate) fn accept_pairing(&self) {
		let Ok(peer) = self.peer() else {
			return;
		};
		let raw_key = security::generate_raw_key();
		peer.device_keys.upsert(self.remote_id, raw_key);
		info!("Paired with {} ({})", self.display_name(), self.remote_id);
		peer.events.new_pair_added(self.remote_id);
		self.send_or_log(NetMessage::PairingResponse { raw_key: Some(raw_key) });
		self.send_challenge();
	}

	/// Application refused the remote's pairing request
	pub(crate) fn refuse_pairing(&self) {
		info!("Pairing with {} refused", self.remote_id);
		self.send_or_log(NetMessage::PairingResponse { raw_key: None });
	}

	// ========================================================================
	// TEARDOWN
	// ========================================================================

	/// Unregister and dispose. Idempotent.
	pub fn disconnect(&self) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		info!("Disconnecting {} ({})", self.display_name(), self.remote_id);

		let peer = self.peer.upgrade();
		if let Some(peer) = &peer {
			peer.connections.remove_if_same(self);
		}

		let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
		for task in [tasks.ping, tasks.watchdog, tasks.dispatch, tasks.writer].into_iter().flatten() {
			task.abort();
		}
		if let Some(sender) = self.sender.get() {
			sender.clear();
		}

		if let Some(peer) = peer {
			peer.events.connection_removed(self.remote_id);
		}
	}
}

impl MessageSink for Connection {
	fn send_message(&self, msg: NetMessage) -> Result<(), PeerError> {
		self.send(msg)
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("remote_id", &self.remote_id)
			.field("verified", &self.is_verified())
			.field("pairing", &self.is_pairing())
			.finish()
	}
}

async fn run_writer<W>(
	mut writer: WriteHalf<W>,
	mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
	max_frame_size: usize,
	conn: Weak<Connection>,
) where
	W: AsyncRead + AsyncWrite,
{
	while let Some(payload) = rx.recv().await {
		if let Err(e) = protocol::write_frame(&mut writer, &payload, max_frame_size).await {
			warn!("Write failed: {}", e);
			if let Some(conn) = conn.upgrade() {
				conn.disconnect();
			}
			return;
		}
	}
	let _ = writer.shutdown().await;
}

async fn run_dispatch<R>(conn: Arc<Connection>, mut reader: ReadHalf<R>)
where
	R: AsyncRead + AsyncWrite,
{
	let max_frame_size = conn.settings.max_frame_size;
	loop {
		let payload = match protocol::read_frame(&mut reader, max_frame_size).await {
			Ok(Some(payload)) => payload,
			Ok(None) => {
				info!("Connection to {} closed by remote", conn.remote_id);
				break;
			}
			Err(e) => {
				warn!("Frame error from {}: {}", conn.remote_id, e);
				break;
			}
		};
		match NetMessage::decode(&payload) {
			Ok(msg) => conn.handle_message(msg).await,
			Err(e) => {
				warn!("Malformed message from {}: {}", conn.remote_id, e);
				break;
			}
		}
	}
	conn.disconnect();
}

/// Run filesystem work on the blocking pool and wait for it
async fn run_blocking<T, E, F>(work: F) -> Result<T, E>
where
	F: FnOnce() -> Result<T, E> + Send + 'static,
	T: Send + 'static,
	E: From<io::Error> + Send + 'static,
{
	match tokio::task::spawn_blocking(work).await {
		Ok(result) => result,
		Err(e) => Err(io::Error::new(io::ErrorKind::Other, e).into()),
	}
}

async fn run_ping(conn: Weak<Connection>, period: std::time::Duration) {
	let mut ticker = tokio::time::interval(period);
	ticker.tick().await;
	loop {
		ticker.tick().await;
		let Some(strong) = conn.upgrade() else {
			return;
		};
		if strong.send(NetMessage::IsAlive).is_err() {
			return;
		}
	}
}

async fn run_watchdog(conn: Weak<Connection>, period: std::time::Duration, timeout: std::time::Duration) {
	let mut ticker = tokio::time::interval(period);
	ticker.tick().await;
	loop {
		ticker.tick().await;
		let Some(strong) = conn.upgrade() else {
			return;
		};
		if strong.progress.is_stalled(timeout) {
			info!("{}: sync progress timeout, disconnecting", strong.remote_id);
			strong.disconnect();
			return;
		}
	}
}

// vim: ts=4
