//! Logging prelude
//!
//! Re-exports the tracing macros so modules only need one import:
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Verified {}", device_id);
//! warn!("Dropping message from unverified peer");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Install a stderr subscriber filtered by `RUST_LOG`, defaulting to INFO.
///
/// ```bash
/// RUST_LOG=debug my-app
/// RUST_LOG=syncr_peer::connection=trace,syncr_peer::transfer=debug my-app
/// ```
pub fn init_tracing() {
	init_tracing_with("info");
}

/// Like [`init_tracing`] with a different default level when `RUST_LOG` is
/// unset. Does nothing if a global subscriber is already installed.
pub fn init_tracing_with(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
