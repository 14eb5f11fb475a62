//! Key derivation and challenge/response proofs
//!
//! A pairing hands both sides the same raw key. Neither side ever sends it
//! again: each proof is keyed by a verification key derived from the raw key
//! and the prover's device id, bound to a nonce chosen by the verifier.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;
use uuid::Uuid;

use crate::protocol::{NONCE_LEN, PROOF_LEN};
use crate::types::DeviceId;

/// PBKDF2 rounds for verification key derivation
pub const KDF_ITERATIONS: u32 = 1000;

/// Domain separation for proof keys
const PROOF_CONTEXT: &str = "syncr-peer 2024 verification proof";

/// Derive the verification key `device_id` proves possession of.
///
/// PBKDF2-HMAC-SHA1 over the raw key with the device id as salt. Both inputs
/// and the 16-byte output use the little-endian GUID byte layout.
pub fn derive_verification_key(raw_key: &Uuid, device_id: &DeviceId) -> Uuid {
	let mut out = [0u8; 16];
	pbkdf2_hmac::<Sha1>(&raw_key.to_bytes_le(), &device_id.to_bytes_le(), KDF_ITERATIONS, &mut out);
	Uuid::from_bytes_le(out)
}

/// Fresh random challenge nonce
pub fn generate_nonce() -> [u8; NONCE_LEN] {
	rand::random()
}

/// Fresh raw pairing key
pub fn generate_raw_key() -> Uuid {
	Uuid::new_v4()
}

/// Proof of possession of `verification_key` for one nonce
pub fn compute_proof(verification_key: &Uuid, nonce: &[u8; NONCE_LEN]) -> [u8; PROOF_LEN] {
	let proof_key = blake3::derive_key(PROOF_CONTEXT, verification_key.as_bytes());
	*blake3::keyed_hash(&proof_key, nonce).as_bytes()
}

/// Check a proof in constant time
pub fn verify_proof(verification_key: &Uuid, nonce: &[u8; NONCE_LEN], proof: &[u8; PROOF_LEN]) -> bool {
	let proof_key = blake3::derive_key(PROOF_CONTEXT, verification_key.as_bytes());
	blake3::keyed_hash(&proof_key, nonce) == blake3::Hash::from(*proof)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kdf_is_deterministic() {
		let raw = Uuid::new_v4();
		let id = Uuid::new_v4();
		assert_eq!(derive_verification_key(&raw, &id), derive_verification_key(&raw, &id));
	}

	#[test]
	fn test_kdf_depends_on_device() {
		let raw = Uuid::new_v4();
		assert_ne!(
			derive_verification_key(&raw, &Uuid::new_v4()),
			derive_verification_key(&raw, &Uuid::new_v4())
		);
	}

	#[test]
	fn test_kdf_depends_on_raw_key() {
		let id = Uuid::new_v4();
		assert_ne!(
			derive_verification_key(&Uuid::new_v4(), &id),
			derive_verification_key(&Uuid::new_v4(), &id)
		);
	}

	#[test]
	fn test_kdf_does_not_return_raw_key() {
		let raw = Uuid::new_v4();
		assert_ne!(derive_verification_key(&raw, &Uuid::new_v4()), raw);
	}

	#[test]
	fn test_proof_roundtrip() {
		let vk = derive_verification_key(&Uuid::new_v4(), &Uuid::new_v4());
		let nonce = generate_nonce();
		let proof = compute_proof(&vk, &nonce);
		assert!(verify_proof(&vk, &nonce, &proof));
	}

	#[test]
	fn test_proof_rejects_wrong_key_or_nonce() {
		let vk = derive_verification_key(&Uuid::new_v4(), &Uuid::new_v4());
		let other = derive_verification_key(&Uuid::new_v4(), &Uuid::new_v4());
		let nonce = generate_nonce();
		let proof = compute_proof(&vk, &nonce);
		assert!(!verify_proof(&other, &nonce, &proof));

		let mut other_nonce = nonce;
		other_nonce[0] ^= 0xff;
		assert!(!verify_proof(&vk, &other_nonce, &proof));
	}
}

// vim: ts=4
