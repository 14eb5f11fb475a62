//! # syncr-peer - Peer-to-peer directory synchronization engine
//!
//! Two devices that trust each other keep a shared directory ("profile") in
//! sync over any duplex byte stream:
//!
//! - **Pairing** hands both devices a shared secret once; afterwards each
//!   connection is verified by a challenge/response proof.
//! - **Profile sync** exchanges directory tree snapshots, diffs them and
//!   sends the missing directories, deletions and files.
//! - **Transfer** is pull based: the receiver asks for each chunk after it
//!   has written the previous one.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use syncr_peer::{CallbackBuilder, PeerBuilder, PeerSettings, SyncProfile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     syncr_peer::logging::init_tracing();
//!
//!     let settings = PeerSettings::load("peer.toml")?;
//!     let peer = PeerBuilder::new(settings)
//!         .callbacks(CallbackBuilder::new().on_file_built(|e| println!("{}", e.relative_path)).build())
//!         .build()?;
//!
//!     let stream = tokio::net::TcpStream::connect("192.168.1.10:7000").await?;
//!     peer.add_connection(remote_id, stream);
//!     peer.profiles().add(profile_id, SyncProfile::new("Photos", "/home/me/Photos"));
//!     peer.sync_profile(&remote_id, &profile_id).await?;
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod config;
pub mod connection;
pub mod error;
pub mod filesystem;
pub mod logging;
pub mod peer;
pub mod progress;
pub mod protocol;
pub mod security;
pub mod transfer;
pub mod tree;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use callbacks::{CallbackBuilder, PairingRequest, PeerCallbacks};
pub use config::PeerSettings;
pub use connection::Connection;
pub use error::{ConfigError, PeerError};
pub use filesystem::{FileSystem, LocalFileSystem};
pub use peer::{Peer, PeerBuilder};
pub use protocol::{NetMessage, ProtocolError};
pub use tree::DirectoryTreeDifference;
pub use types::{DeviceId, FileSystemItem, ProfileId, SyncProfile, SyncProfileState, Timestamp};

// vim: ts=4
