//! Pull-based chunked file transfer
//!
//! The sending side keeps a per-connection queue of files ([`FileSender`]).
//! It pushes the first chunk when it goes from idle to busy and afterwards
//! sends exactly one chunk per `FileChunkRequest` it receives.
//!
//! The receiving side funnels chunks from every connection into one shared
//! [`FileBuilder`], which writes them to a temporary file next to the target
//! and renames it into place once the last byte arrived. After each applied
//! chunk the builder asks the delivering connection for the next one.

pub mod builder;
pub mod sender;

pub use builder::{BuilderContext, FileBuilder};
pub use sender::{FileSendInfo, FileSender};

use crate::error::PeerError;
use crate::protocol::NetMessage;

/// Destination for outbound protocol messages
pub trait MessageSink: Send + Sync {
	fn send_message(&self, msg: NetMessage) -> Result<(), PeerError>;
}

// vim: ts=4
