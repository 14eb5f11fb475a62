//! Connection registry keyed by remote device id

use dashmap::DashMap;
use std::sync::Arc;

use crate::connection::Connection;
use crate::types::DeviceId;

#[derive(Default)]
pub struct ConnectionManager {
	connections: DashMap<DeviceId, Arc<Connection>>,
}

impl ConnectionManager {
	pub fn new() -> Self {
		ConnectionManager { connections: DashMap::new() }
	}

	/// Register a connection, returning the one it replaced
	pub fn insert(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
		self.connections.insert(connection.remote_id(), connection)
	}

	pub fn get(&self, device_id: &DeviceId) -> Option<Arc<Connection>> {
		self.connections.get(device_id).map(|c| Arc::clone(&c))
	}

	/// Remove only if `connection` is still the registered one
	pub fn remove_if_same(&self, connection: &Connection) -> bool {
		self.connections
			.remove_if(&connection.remote_id(), |_, c| std::ptr::eq(Arc::as_ptr(c), connection))
			.is_some()
	}

	pub fn remove(&self, device_id: &DeviceId) -> Option<Arc<Connection>> {
		self.connections.remove(device_id).map(|(_, c)| c)
	}

	pub fn ids(&self) -> Vec<DeviceId> {
		self.connections.iter().map(|e| *e.key()).collect()
	}

	pub fn all(&self) -> Vec<Arc<Connection>> {
		self.connections.iter().map(|e| Arc::clone(e.value())).collect()
	}

	pub fn len(&self) -> usize {
		self.connections.len()
	}

	pub fn is_empty(&self) -> bool {
		self.connections.is_empty()
	}

	/// Remove every connection
	pub fn drain(&self) -> Vec<Arc<Connection>> {
		let all = self.all();
		for conn in &all {
			self.remove_if_same(conn);
		}
		all
	}
}

// vim: ts=4
