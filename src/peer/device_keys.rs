//! Device key table
//!
//! Holds the raw pairing key shared with every paired device. Verification
//! keys are derived from it per prover identity when a challenge is answered
//! or checked, so the raw key itself never crosses the wire after pairing.

use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::DeviceId;

/// Concurrent map of remote device id to pairing key
#[derive(Debug, Default)]
pub struct DeviceKeyManager {
	keys: DashMap<DeviceId, Uuid>,
}

impl DeviceKeyManager {
	pub fn new() -> Self {
		DeviceKeyManager { keys: DashMap::new() }
	}

	/// Load a previously persisted table
	pub fn from_snapshot(snapshot: HashMap<DeviceId, Uuid>) -> Self {
		DeviceKeyManager { keys: snapshot.into_iter().collect() }
	}

	/// Insert or replace, returning the previous key
	pub fn upsert(&self, device_id: DeviceId, key: Uuid) -> Option<Uuid> {
		self.keys.insert(device_id, key)
	}

	pub fn get(&self, device_id: &DeviceId) -> Option<Uuid> {
		self.keys.get(device_id).map(|k| *k)
	}

	pub fn remove(&self, device_id: &DeviceId) -> Option<Uuid> {
		self.keys.remove(device_id).map(|(_, k)| k)
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// Copy of the table for persistence
	pub fn snapshot(&self) -> HashMap<DeviceId, Uuid> {
		self.keys.iter().map(|e| (*e.key(), *e.value())).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_upsert_replaces() {
		let keys = DeviceKeyManager::new();
		let id = Uuid::new_v4();
		let k1 = Uuid::new_v4();
		let k2 = Uuid::new_v4();
		assert_eq!(keys.upsert(id, k1), None);
		assert_eq!(keys.upsert(id, k2), Some(k1));
		assert_eq!(keys.get(&id), Some(k2));
		assert_eq!(keys.len(), 1);
	}

	#[test]
	fn test_snapshot_roundtrip() {
		let keys = DeviceKeyManager::new();
		keys.upsert(Uuid::new_v4(), Uuid::new_v4());
		keys.upsert(Uuid::new_v4(), Uuid::new_v4());
		let restored = DeviceKeyManager::from_snapshot(keys.snapshot());
		assert_eq!(restored.snapshot(), keys.snapshot());
	}

	#[test]
	fn test_remove() {
		let keys = DeviceKeyManager::new();
		let id = Uuid::new_v4();
		keys.upsert(id, Uuid::new_v4());
		assert!(keys.remove(&id).is_some());
		assert_eq!(keys.get(&id), None);
		assert!(keys.remove(&id).is_none());
	}
}

// vim: ts=4
