//! Callback traits for peer events
//!
//! Most events are delivered synchronously on the task that produced them.
//! `on_file_built` and `on_profile_changed` are fire-and-forget: they run on
//! the blocking pool so slow application code never stalls a connection.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use crate::connection::Connection;
use crate::logging::*;
use crate::types::{DeviceId, ProfileId, SyncProfile, SyncProfileError, SyncProfileShare};

// Type aliases to reduce complexity
type PairingRequestFn = dyn Fn(PairingRequest) + Send + Sync;
type DeviceFn = dyn Fn(DeviceId) + Send + Sync;
type VerifiedFn = dyn Fn(DeviceId, &str) + Send + Sync;
type ProfileFn = dyn Fn(ProfileId, &SyncProfile) + Send + Sync;
type ProfileChangedFn = dyn Fn(&ProfileChangedEvent) + Send + Sync;
type ProfileErrorFn = dyn Fn(&ProfileErrorEvent) + Send + Sync;
type ProfileReceivedFn = dyn Fn(&ProfileReceivedEvent) + Send + Sync;
type FileBuiltFn = dyn Fn(&FileBuiltEvent) + Send + Sync;

/// Incoming pairing request awaiting an application decision.
///
/// Call [`PairingRequest::accept`] or [`PairingRequest::refuse`] exactly
/// once, now or later. A request dropped without a decision is refused.
pub struct PairingRequest {
	pub remote_device_id: DeviceId,
	pub display_name: String,
	connection: Weak<Connection>,
	decided: bool,
}

impl PairingRequest {
	pub(crate) fn new(remote_device_id: DeviceId, display_name: String, connection: Weak<Connection>) -> Self {
		PairingRequest { remote_device_id, display_name, connection, decided: false }
	}

	pub fn accept(mut self) {
		self.decided = true;
		match self.connection.upgrade() {
			Some(conn) => conn.accept_pairing(),
			None => debug!("Pairing with {} accepted after disconnect", self.remote_device_id),
		}
	}

	pub fn refuse(mut self) {
		self.decided = true;
		if let Some(conn) = self.connection.upgrade() {
			conn.refuse_pairing();
		}
	}
}

impl Drop for PairingRequest {
	fn drop(&mut self) {
		if !self.decided {
			if let Some(conn) = self.connection.upgrade() {
				conn.refuse_pairing();
			}
		}
	}
}

impl std::fmt::Debug for PairingRequest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PairingRequest")
			.field("remote_device_id", &self.remote_device_id)
			.field("display_name", &self.display_name)
			.finish()
	}
}

/// A profile was replaced in the profile table
#[derive(Debug, Clone)]
pub struct ProfileChangedEvent {
	pub profile_id: ProfileId,
	pub old: SyncProfile,
	pub new: SyncProfile,
}

/// A profile operation failed in a way the application can act on
#[derive(Debug, Clone)]
pub struct ProfileErrorEvent {
	pub profile_id: ProfileId,
	pub profile: SyncProfile,
	pub error: SyncProfileError,
}

/// A remote device shared a profile
#[derive(Debug, Clone)]
pub struct ProfileReceivedEvent {
	pub remote_device_id: DeviceId,
	pub profile_id: ProfileId,
	pub share: SyncProfileShare,
}

/// A transferred file was moved into place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBuiltEvent {
	pub profile_id: ProfileId,
	pub root_directory: PathBuf,
	pub relative_path: String,
}

/// Combined callback handler for all peer events
pub trait PeerCallbacks: Send + Sync {
	/// A device asks to pair. Refused unless overridden.
	fn on_pairing_request(&self, request: PairingRequest) {
		request.refuse();
	}

	/// Pairing completed and a key for the device was stored
	fn on_new_pair_added(&self, _remote_device_id: DeviceId) {}

	fn on_connection_added(&self, _remote_device_id: DeviceId) {}

	fn on_connection_verified(&self, _remote_device_id: DeviceId, _display_name: &str) {}

	fn on_connection_removed(&self, _remote_device_id: DeviceId) {}

	fn on_profile_added(&self, _profile_id: ProfileId, _profile: &SyncProfile) {}

	fn on_profile_removed(&self, _profile_id: ProfileId, _profile: &SyncProfile) {}

	/// Fire-and-forget
	fn on_profile_changed(&self, _event: &ProfileChangedEvent) {}

	fn on_profile_error(&self, _event: &ProfileErrorEvent) {}

	fn on_profile_received(&self, _event: &ProfileReceivedEvent) {}

	/// Fire-and-forget
	fn on_file_built(&self, _event: &FileBuiltEvent) {}
}

/// Default callback implementation that refuses pairing and ignores the rest
pub struct NoCallbacks;

impl PeerCallbacks for NoCallbacks {}

/// Builder for callbacks using function closures
#[derive(Default)]
pub struct CallbackBuilder {
	pairing_request: Option<Box<PairingRequestFn>>,
	new_pair_added: Option<Box<DeviceFn>>,
	connection_added: Option<Box<DeviceFn>>,
	connection_verified: Option<Box<VerifiedFn>>,
	connection_removed: Option<Box<DeviceFn>>,
	profile_added: Option<Box<ProfileFn>>,
	profile_removed: Option<Box<ProfileFn>>,
	profile_changed: Option<Box<ProfileChangedFn>>,
	profile_error: Option<Box<ProfileErrorFn>>,
	profile_received: Option<Box<ProfileReceivedFn>>,
	file_built: Option<Box<FileBuiltFn>>,
}

impl CallbackBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_pairing_request<F>(mut self, callback: F) -> Self
	where
		F: Fn(PairingRequest) + Send + Sync + 'static,
	{
		self.pairing_request = Some(Box::new(callback));
		self
	}

	pub fn on_new_pair_added<F>(mut self, callback: F) -> Self
	where
		F: Fn(DeviceId) + Send + Sync + 'static,
	{
		self.new_pair_added = Some(Box::new(callback));
		self
	}

	pub fn on_connection_added<F>(mut self, callback: F) -> Self
	where
		F: Fn(DeviceId) + Send + Sync + 'static,
	{
		self.connection_added = Some(Box::new(callback));
		self
	}

	pub fn on_connection_verified<F>(mut self, callback: F) -> Self
	where
		F: Fn(DeviceId, &str) + Send + Sync + 'static,
	{
		self.connection_verified = Some(Box::new(callback));
		self
	}

	pub fn on_connection_removed<F>(mut self, callback: F) -> Self
	where
		F: Fn(DeviceId) + Send + Sync + 'static,
	{
		self.connection_removed = Some(Box::new(callback));
		self
	}

	pub fn on_profile_added<F>(mut self, callback: F) -> Self
	where
		F: Fn(ProfileId, &SyncProfile) + Send + Sync + 'static,
	{
		self.profile_added = Some(Box::new(callback));
		self
	}

	pub fn on_profile_removed<F>(mut self, callback: F) -> Self
	where
		F: Fn(ProfileId, &SyncProfile) + Send + Sync + 'static,
	{
		self.profile_removed = Some(Box::new(callback));
		self
	}

	pub fn on_profile_changed<F>(mut self, callback: F) -> Self
	where
		F: Fn(&ProfileChangedEvent) + Send + Sync + 'static,
	{
		self.profile_changed = Some(Box::new(callback));
		self
	}

	pub fn on_profile_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&ProfileErrorEvent) + Send + Sync + 'static,
	{
		self.profile_error = Some(Box::new(callback));
		self
	}

	pub fn on_profile_received<F>(mut self, callback: F) -> Self
	where
		F: Fn(&ProfileReceivedEvent) + Send + Sync + 'static,
	{
		self.profile_received = Some(Box::new(callback));
		self
	}

	pub fn on_file_built<F>(mut self, callback: F) -> Self
	where
		F: Fn(&FileBuiltEvent) + Send + Sync + 'static,
	{
		self.file_built = Some(Box::new(callback));
		self
	}

	/// Build the callbacks handler
	pub fn build(self) -> Arc<dyn PeerCallbacks> {
		Arc::new(CompositeCallbacks { inner: self })
	}
}

/// Internal composite callbacks implementation
struct CompositeCallbacks {
	inner: CallbackBuilder,
}

impl PeerCallbacks for CompositeCallbacks {
	fn on_pairing_request(&self, request: PairingRequest) {
		match self.inner.pairing_request {
			Some(ref callback) => callback(request),
			None => request.refuse(),
		}
	}

	fn on_new_pair_added(&self, remote_device_id: DeviceId) {
		if let Some(ref callback) = self.inner.new_pair_added {
			callback(remote_device_id);
		}
	}

	fn on_connection_added(&self, remote_device_id: DeviceId) {
		if let Some(ref callback) = self.inner.connection_added {
			callback(remote_device_id);
		}
	}

	fn on_connection_verified(&self, remote_device_id: DeviceId, display_name: &str) {
		if let Some(ref callback) = self.inner.connection_verified {
			callback(remote_device_id, display_name);
		}
	}

	fn on_connection_removed(&self, remote_device_id: DeviceId) {
		if let Some(ref callback) = self.inner.connection_removed {
			callback(remote_device_id);
		}
	}

	fn on_profile_added(&self, profile_id: ProfileId, profile: &SyncProfile) {
		if let Some(ref callback) = self.inner.profile_added {
			callback(profile_id, profile);
		}
	}

	fn on_profile_removed(&self, profile_id: ProfileId, profile: &SyncProfile) {
		if let Some(ref callback) = self.inner.profile_removed {
			callback(profile_id, profile);
		}
	}

	fn on_profile_changed(&self, event: &ProfileChangedEvent) {
		if let Some(ref callback) = self.inner.profile_changed {
			callback(event);
		}
	}

	fn on_profile_error(&self, event: &ProfileErrorEvent) {
		if let Some(ref callback) = self.inner.profile_error {
			callback(event);
		}
	}

	fn on_profile_received(&self, event: &ProfileReceivedEvent) {
		if let Some(ref callback) = self.inner.profile_received {
			callback(event);
		}
	}

	fn on_file_built(&self, event: &FileBuiltEvent) {
		if let Some(ref callback) = self.inner.file_built {
			callback(event);
		}
	}
}

/// Routes events to the application's callbacks
#[derive(Clone)]
pub struct EventDispatcher {
	callbacks: Arc<dyn PeerCallbacks>,
}

impl EventDispatcher {
	pub fn new(callbacks: Arc<dyn PeerCallbacks>) -> Self {
		EventDispatcher { callbacks }
	}

	pub fn callbacks(&self) -> &dyn PeerCallbacks {
		self.callbacks.as_ref()
	}

	/// Run `f` on the blocking pool, or inline outside a runtime
	fn detached<F>(&self, f: F)
	where
		F: FnOnce(&dyn PeerCallbacks) + Send + 'static,
	{
		let callbacks = Arc::clone(&self.callbacks);
		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				handle.spawn_blocking(move || f(callbacks.as_ref()));
			}
			Err(_) => f(callbacks.as_ref()),
		}
	}

	pub fn pairing_request(&self, request: PairingRequest) {
		self.callbacks.on_pairing_request(request);
	}

	pub fn new_pair_added(&self, remote_device_id: DeviceId) {
		self.callbacks.on_new_pair_added(remote_device_id);
	}

	pub fn connection_added(&self, remote_device_id: DeviceId) {
		self.callbacks.on_connection_added(remote_device_id);
	}

	pub fn connection_verified(&self, remote_device_id: DeviceId, display_name: &str) {
		self.callbacks.on_connection_verified(remote_device_id, display_name);
	}

	pub fn connection_removed(&self, remote_device_id: DeviceId) {
		self.callbacks.on_connection_removed(remote_device_id);
	}

	pub fn profile_added(&self, profile_id: ProfileId, profile: &SyncProfile) {
		self.callbacks.on_profile_added(profile_id, profile);
	}

	pub fn profile_removed(&self, profile_id: ProfileId, profile: &SyncProfile) {
		self.callbacks.on_profile_removed(profile_id, profile);
	}

	pub fn profile_changed(&self, event: ProfileChangedEvent) {
		self.detached(move |callbacks| callbacks.on_profile_changed(&event));
	}

	pub fn profile_error(&self, profile_id: ProfileId, profile: SyncProfile, error: SyncProfileError) {
		warn!("Profile {} ({}): {}", profile.name, profile_id, error);
		self.callbacks.on_profile_error(&ProfileErrorEvent { profile_id, profile, error });
	}

	pub fn profile_received(&self, event: ProfileReceivedEvent) {
		self.callbacks.on_profile_received(&event);
	}

	pub fn file_built(&self, event: FileBuiltEvent) {
		self.detached(move |callbacks| callbacks.on_file_built(&event));
	}
}

impl Default for EventDispatcher {
	fn default() -> Self {
		Self::new(Arc::new(NoCallbacks))
	}
}


// vim: ts=4
