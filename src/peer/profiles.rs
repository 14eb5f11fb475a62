//! Profile table
//!
//! The table can be seeded from and exported to an external store; every
//! mutation fires the matching event so the store can persist it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;

use crate::callbacks::{EventDispatcher, ProfileChangedEvent};
use crate::types::{ProfileId, SyncProfile, SyncProfileError, Timestamp};

/// Concurrent profile table with add-if-absent and compare-and-update
pub struct ProfileManager {
	profiles: DashMap<ProfileId, SyncProfile>,
	events: EventDispatcher,
}

impl ProfileManager {
	pub fn new(events: EventDispatcher) -> Self {
		ProfileManager { profiles: DashMap::new(), events }
	}

	/// Seed the table without firing events
	pub fn with_profiles(events: EventDispatcher, profiles: HashMap<ProfileId, SyncProfile>) -> Self {
		ProfileManager { profiles: profiles.into_iter().collect(), events }
	}

	/// Add a profile unless the id is taken
	pub fn add(&self, profile_id: ProfileId, profile: SyncProfile) -> bool {
		match self.profiles.entry(profile_id) {
			Entry::Occupied(_) => return false,
			Entry::Vacant(entry) => {
				entry.insert(profile.clone());
			}
		}
		self.events.profile_added(profile_id, &profile);
		true
	}

	/// Replace a profile only while it still equals `expected`
	pub fn update(&self, profile_id: ProfileId, expected: &SyncProfile, new: SyncProfile) -> bool {
		{
			let Some(mut current) = self.profiles.get_mut(&profile_id) else {
				return false;
			};
			if *current != *expected {
				return false;
			}
			*current = new.clone();
		}
		self.events.profile_changed(ProfileChangedEvent {
			profile_id,
			old: expected.clone(),
			new,
		});
		true
	}

	pub fn remove(&self, profile_id: &ProfileId) -> Option<SyncProfile> {
		let (id, profile) = self.profiles.remove(profile_id)?;
		self.events.profile_removed(id, &profile);
		Some(profile)
	}

	pub fn get(&self, profile_id: &ProfileId) -> Option<SyncProfile> {
		self.profiles.get(profile_id).map(|p| p.clone())
	}

	pub fn ids(&self) -> Vec<ProfileId> {
		self.profiles.iter().map(|e| *e.key()).collect()
	}

	pub fn len(&self) -> usize {
		self.profiles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.profiles.is_empty()
	}

	/// Copy of the table for persistence
	pub fn snapshot(&self) -> HashMap<ProfileId, SyncProfile> {
		self.profiles.iter().map(|e| (*e.key(), e.value().clone())).collect()
	}

	/// Advance the last sync date to now, retrying on concurrent updates
	pub fn update_last_sync(&self, profile_id: &ProfileId) -> bool {
		loop {
			let Some(current) = self.get(profile_id) else {
				return false;
			};
			let new = SyncProfile { last_sync_date: Timestamp::now(), ..current.clone() };
			if self.update(*profile_id, &current, new) {
				return true;
			}
		}
	}

	/// Report a failure the application can act on
	pub fn report_error(&self, profile_id: ProfileId, error: SyncProfileError) {
		if let Some(profile) = self.get(&profile_id) {
			self.events.profile_error(profile_id, profile, error);
		}
	}
}


// vim: ts=4
