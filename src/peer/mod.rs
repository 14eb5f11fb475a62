//! The local peer
//!
//! A [`Peer`] owns the connection registry, the device key table, the profile
//! table and one file builder shared by all connections. The application
//! hands it connected streams; discovery and transport setup happen
//! elsewhere.
//!
//! ```rust,ignore
//! use syncr_peer::{CallbackBuilder, PeerBuilder, PeerSettings};
//!
//! let callbacks = CallbackBuilder::new()
//!     .on_pairing_request(|request| request.accept())
//!     .build();
//! let peer = PeerBuilder::new(PeerSettings::new(device_id, "Alice"))
//!     .callbacks(callbacks)
//!     .allow_pairing(true)
//!     .build()?;
//!
//! let conn = peer.add_connection(remote_id, tcp_stream);
//! peer.pair(&remote_id)?;
//! ```

pub mod connections;
pub mod device_keys;
pub mod profiles;

pub use connections::ConnectionManager;
pub use device_keys::DeviceKeyManager;
pub use profiles::ProfileManager;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::callbacks::{EventDispatcher, NoCallbacks, PeerCallbacks};
use crate::config::PeerSettings;
use crate::connection::Connection;
use crate::error::{ConfigError, PeerError};
use crate::filesystem::{FileSystem, LocalFileSystem};
use crate::logging::*;
use crate::protocol::NetMessage;
use crate::transfer::{BuilderContext, FileBuilder};
use crate::types::{DeviceId, ProfileId, SyncProfile};
use crate::validation::{ValidationError, Validator};

/// State shared between the peer and its connections
pub(crate) struct PeerShared {
	pub(crate) settings: Arc<PeerSettings>,
	pub(crate) allow_pairing: AtomicBool,
	pub(crate) connections: ConnectionManager,
	pub(crate) device_keys: DeviceKeyManager,
	pub(crate) profiles: Arc<ProfileManager>,
	pub(crate) fs: Arc<dyn FileSystem>,
	pub(crate) events: EventDispatcher,
	builder: OnceLock<FileBuilder>,
	shut_down: AtomicBool,
}

impl PeerShared {
	/// Shared builder, started on first use
	pub(crate) fn file_builder(&self) -> &FileBuilder {
		self.builder.get_or_init(|| {
			debug!("Starting file builder");
			FileBuilder::start(BuilderContext {
				fs: Arc::clone(&self.fs),
				profiles: Arc::clone(&self.profiles),
				events: self.events.clone(),
				supports_timestamp: self.settings.supports_timestamp,
			})
		})
	}
}

// ============================================================================
// BUILDER
// ============================================================================

/// Configures and creates a [`Peer`]
pub struct PeerBuilder {
	settings: PeerSettings,
	fs: Option<Arc<dyn FileSystem>>,
	callbacks: Arc<dyn PeerCallbacks>,
	profiles: HashMap<ProfileId, SyncProfile>,
	device_keys: HashMap<DeviceId, Uuid>,
	allow_pairing: bool,
}

impl PeerBuilder {
	pub fn new(settings: PeerSettings) -> Self {
		PeerBuilder {
			settings,
			fs: None,
			callbacks: Arc::new(NoCallbacks),
			profiles: HashMap::new(),
			device_keys: HashMap::new(),
			allow_pairing: false,
		}
	}

	/// Replace the default local filesystem
	pub fn filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
		self.fs = Some(fs);
		self
	}

	pub fn callbacks(mut self, callbacks: Arc<dyn PeerCallbacks>) -> Self {
		self.callbacks = callbacks;
		self
	}

	/// Seed the profile table from a persisted snapshot
	pub fn profiles(mut self, profiles: HashMap<ProfileId, SyncProfile>) -> Self {
		self.profiles = profiles;
		self
	}

	/// Seed the device key table from a persisted snapshot
	pub fn device_keys(mut self, keys: HashMap<DeviceId, Uuid>) -> Self {
		self.device_keys = keys;
		self
	}

	pub fn allow_pairing(mut self, allow: bool) -> Self {
		self.allow_pairing = allow;
		self
	}

	pub fn build(self) -> Result<Peer, PeerError> {
		self.settings.validate().map_err(ConfigError::Invalid)?;

		let fs = match self.fs {
			Some(fs) => fs,
			None => {
				let local = LocalFileSystem::with_exclude_patterns(&self.settings.exclude_patterns).map_err(|e| {
					ConfigError::Invalid(ValidationError::Setting(format!("Invalid exclude pattern: {}", e)))
				})?;
				Arc::new(local)
			}
		};

		let events = EventDispatcher::new(self.callbacks);
		let profiles = Arc::new(ProfileManager::with_profiles(events.clone(), self.profiles));
		info!(
			"Peer {} ({}) ready with {} profiles and {} paired devices",
			self.settings.display_name,
			self.settings.device_id,
			profiles.len(),
			self.device_keys.len()
		);

		Ok(Peer {
			shared: Arc::new(PeerShared {
				settings: Arc::new(self.settings),
				allow_pairing: AtomicBool::new(self.allow_pairing),
				connections: ConnectionManager::new(),
				device_keys: DeviceKeyManager::from_snapshot(self.device_keys),
				profiles,
				fs,
				events,
				builder: OnceLock::new(),
				shut_down: AtomicBool::new(false),
			}),
		})
	}
}

// ============================================================================
// PEER
// ============================================================================

/// Local synchronization endpoint
pub struct Peer {
	shared: Arc<PeerShared>,
}

impl Peer {
	/// Wrap a connected stream and start talking to `remote_id`.
	///
	/// Must be called from within a tokio runtime. A previous connection to
	/// the same device is disconnected first.
	pub fn add_connection<S>(&self, remote_id: DeviceId, stream: S) -> Arc<Connection>
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		if let Some(old) = self.shared.connections.get(&remote_id) {
			info!("Replacing connection to {}", remote_id);
			old.disconnect();
		}
		let conn = Connection::new(remote_id, &self.shared);
		self.shared.connections.insert(Arc::clone(&conn));
		self.shared.events.connection_added(remote_id);
		conn.start(stream);
		conn
	}

	/// Disconnect and forget a connection
	pub fn remove_connection(&self, remote_id: &DeviceId) -> Result<(), PeerError> {
		let conn = self.connection(remote_id)?;
		conn.disconnect();
		Ok(())
	}

	pub fn connection(&self, remote_id: &DeviceId) -> Result<Arc<Connection>, PeerError> {
		self.shared.connections.get(remote_id).ok_or(PeerError::UnknownConnection(*remote_id))
	}

	pub fn connections(&self) -> Vec<Arc<Connection>> {
		self.shared.connections.all()
	}

	/// Ask the remote device to pair with us
	pub fn pair(&self, remote_id: &DeviceId) -> Result<(), PeerError> {
		self.connection(remote_id)?.start_pairing()
	}

	/// Announce a local profile to a verified peer
	pub fn share_profile(&self, remote_id: &DeviceId, profile_id: &ProfileId) -> Result<(), PeerError> {
		let conn = self.connection(remote_id)?;
		let profile = self.shared.profiles.get(profile_id).ok_or(PeerError::UnknownProfile(*profile_id))?;
		conn.send(NetMessage::ProfileShare { profile_id: *profile_id, share: profile.share() })
	}

	/// Start synchronizing a profile with a peer.
	///
	/// The local snapshot is generated on the blocking pool; the call returns
	/// once it has been queued for sending.
	pub async fn sync_profile(&self, remote_id: &DeviceId, profile_id: &ProfileId) -> Result<(), PeerError> {
		let conn = self.connection(remote_id)?;
		info!("Syncing profile {} with {}", profile_id, remote_id);
		conn.send_profile_state(*profile_id, false).await
	}

	pub fn set_allow_pairing(&self, allow: bool) {
		self.shared.allow_pairing.store(allow, Ordering::SeqCst);
	}

	pub fn allow_pairing(&self) -> bool {
		self.shared.allow_pairing.load(Ordering::SeqCst)
	}

	/// Any chunk waiting to be built or any connection transferring
	pub fn is_syncing(&self) -> bool {
		let building = self.shared.builder.get().is_some_and(|b| !b.is_build_queue_empty());
		building || self.shared.connections.all().iter().any(|c| c.is_syncing())
	}

	pub fn profiles(&self) -> &ProfileManager {
		&self.shared.profiles
	}

	pub fn device_keys(&self) -> &DeviceKeyManager {
		&self.shared.device_keys
	}

	pub fn settings(&self) -> &PeerSettings {
		&self.shared.settings
	}

	pub fn device_id(&self) -> DeviceId {
		self.shared.settings.device_id
	}

	/// Disconnect everything and stop the builder. Idempotent.
	pub fn shutdown(&self) {
		if self.shared.shut_down.swap(true, Ordering::SeqCst) {
			return;
		}
		for conn in self.shared.connections.drain() {
			conn.disconnect();
		}
		if let Some(builder) = self.shared.builder.get() {
			builder.shutdown();
		}
		info!("Peer {} shut down", self.shared.settings.device_id);
	}
}

impl Drop for Peer {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl std::fmt::Debug for Peer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Peer")
			.field("device_id", &self.shared.settings.device_id)
			.field("connections", &self.shared.connections.len())
			.field("profiles", &self.shared.profiles.len())
			.finish()
	}
}

// vim: ts=4
