//! Pairing and verification between two peers over an in-memory stream

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use syncr_peer::callbacks::NoCallbacks;
use syncr_peer::security;
use syncr_peer::{CallbackBuilder, PeerError};

use common::*;

#[tokio::test]
async fn test_pairing_verifies_both_sides() {
	let bob_saw = Arc::new(Mutex::new(None));
	let bob_pairs = Arc::new(AtomicUsize::new(0));
	let alice_pairs = Arc::new(AtomicUsize::new(0));

	let alice = peer(
		settings("Alice"),
		CallbackBuilder::new()
			.on_new_pair_added({
				let pairs = Arc::clone(&alice_pairs);
				move |_| {
					pairs.fetch_add(1, Ordering::SeqCst);
				}
			})
			.build(),
	);
	let bob = peer(
		settings("Bob"),
		CallbackBuilder::new()
			.on_pairing_request({
				let saw = Arc::clone(&bob_saw);
				move |request| {
					*saw.lock().unwrap() = Some((request.remote_device_id, request.display_name.clone()));
					request.accept();
				}
			})
			.on_new_pair_added({
				let pairs = Arc::clone(&bob_pairs);
				move |_| {
					pairs.fetch_add(1, Ordering::SeqCst);
				}
			})
			.build(),
	);
	bob.set_allow_pairing(true);

	let (a_conn, b_conn) = connect(&alice, &bob);
	alice.pair(&bob.device_id()).unwrap();
	assert!(a_conn.is_pairing());

	wait_until("both sides verified", || a_conn.is_verified() && b_conn.is_verified()).await;

	assert_eq!(*bob_saw.lock().unwrap(), Some((alice.device_id(), "Alice".to_string())));
	assert!(!a_conn.is_pairing());
	assert_eq!(a_conn.display_name(), "Bob");
	assert_eq!(b_conn.display_name(), "Alice");
	assert_eq!(alice_pairs.load(Ordering::SeqCst), 1);
	assert_eq!(bob_pairs.load(Ordering::SeqCst), 1);

	let key = alice.device_keys().get(&bob.device_id()).unwrap();
	assert_eq!(bob.device_keys().get(&alice.device_id()), Some(key));
	assert_ne!(
		security::derive_verification_key(&key, &alice.device_id()),
		security::derive_verification_key(&key, &bob.device_id())
	);

	assert!(matches!(alice.pair(&bob.device_id()), Err(PeerError::AlreadyVerified(_))));
}

#[tokio::test]
async fn test_refused_pairing_clears_pairing_state() {
	let alice = peer(settings("Alice"), Arc::new(NoCallbacks));
	let bob = peer(settings("Bob"), CallbackBuilder::new().on_pairing_request(|request| request.refuse()).build());
	bob.set_allow_pairing(true);

	let (a_conn, b_conn) = connect(&alice, &bob);
	alice.pair(&bob.device_id()).unwrap();

	wait_until("pairing answered", || !a_conn.is_pairing()).await;
	assert!(alice.device_keys().is_empty());
	assert!(bob.device_keys().is_empty());
	assert!(!a_conn.is_verified());
	assert!(!b_conn.is_verified());
}

#[tokio::test]
async fn test_pairing_disabled_refuses_without_asking() {
	let asked = Arc::new(AtomicUsize::new(0));
	let alice = peer(settings("Alice"), Arc::new(NoCallbacks));
	let bob = peer(
		settings("Bob"),
		CallbackBuilder::new()
			.on_pairing_request({
				let asked = Arc::clone(&asked);
				move |request| {
					asked.fetch_add(1, Ordering::SeqCst);
					request.accept();
				}
			})
			.build(),
	);
	assert!(!bob.allow_pairing());

	let (a_conn, _b_conn) = connect(&alice, &bob);
	alice.pair(&bob.device_id()).unwrap();

	wait_until("pairing answered", || !a_conn.is_pairing()).await;
	assert_eq!(asked.load(Ordering::SeqCst), 0);
	assert!(alice.device_keys().is_empty());
}

#[tokio::test]
async fn test_dropped_pairing_request_is_refused() {
	let alice = peer(settings("Alice"), Arc::new(NoCallbacks));
	let bob = peer(settings("Bob"), CallbackBuilder::new().on_pairing_request(drop).build());
	bob.set_allow_pairing(true);

	let (a_conn, _b_conn) = connect(&alice, &bob);
	alice.pair(&bob.device_id()).unwrap();

	wait_until("pairing answered", || !a_conn.is_pairing()).await;
	assert!(bob.device_keys().is_empty());
}

#[tokio::test]
async fn test_stored_keys_verify_on_connect() {
	let verified = Arc::new(Mutex::new(Vec::new()));
	let (alice, bob) = paired_peers(
		settings("Alice"),
		CallbackBuilder::new()
			.on_connection_verified({
				let verified = Arc::clone(&verified);
				move |id, name| verified.lock().unwrap().push((id, name.to_string()))
			})
			.build(),
		settings("Bob"),
		Arc::new(NoCallbacks),
	);

	let (a_conn, b_conn) = connect(&alice, &bob);
	wait_until("both sides verified", || a_conn.is_verified() && b_conn.is_verified()).await;

	assert_eq!(*verified.lock().unwrap(), vec![(bob.device_id(), "Bob".to_string())]);
	assert!(a_conn.supports_timestamp());
}

#[tokio::test]
async fn test_timestamp_support_needs_both_sides() {
	let mut bob_settings = settings("Bob");
	bob_settings.supports_timestamp = false;
	let (alice, bob) = paired_peers(settings("Alice"), Arc::new(NoCallbacks), bob_settings, Arc::new(NoCallbacks));

	let (a_conn, b_conn) = connect(&alice, &bob);
	wait_until("both sides verified", || a_conn.is_verified() && b_conn.is_verified()).await;

	assert!(!a_conn.supports_timestamp());
	assert!(!b_conn.supports_timestamp());
}

#[tokio::test]
async fn test_mismatched_keys_stay_unverified() {
	let alice_settings = settings("Alice");
	let bob_settings = settings("Bob");
	let alice = syncr_peer::PeerBuilder::new(alice_settings.clone())
		.device_keys([(bob_settings.device_id, uuid::Uuid::new_v4())].into())
		.build()
		.unwrap();
	let bob = syncr_peer::PeerBuilder::new(bob_settings)
		.device_keys([(alice_settings.device_id, uuid::Uuid::new_v4())].into())
		.build()
		.unwrap();

	let (a_conn, b_conn) = connect(&alice, &bob);
	tokio::time::sleep(Duration::from_millis(300)).await;

	assert!(!a_conn.is_verified());
	assert!(!b_conn.is_verified());
	assert!(!a_conn.is_disposed());
}

#[tokio::test]
async fn test_shutdown_disconnects_everything() {
	let removed = Arc::new(AtomicUsize::new(0));
	let (alice, bob) = paired_peers(
		settings("Alice"),
		CallbackBuilder::new()
			.on_connection_removed({
				let removed = Arc::clone(&removed);
				move |_| {
					removed.fetch_add(1, Ordering::SeqCst);
				}
			})
			.build(),
		settings("Bob"),
		Arc::new(NoCallbacks),
	);

	let (a_conn, b_conn) = connect(&alice, &bob);
	wait_until("both sides verified", || a_conn.is_verified() && b_conn.is_verified()).await;

	alice.shutdown();
	alice.shutdown();
	assert!(a_conn.is_disposed());
	assert!(alice.connections().is_empty());
	assert_eq!(removed.load(Ordering::SeqCst), 1);

	wait_until("remote notices", || b_conn.is_disposed()).await;
	assert!(bob.connections().is_empty());
}

// vim: ts=4
