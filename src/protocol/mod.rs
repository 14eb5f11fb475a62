//! Binary wire protocol
//!
//! Three layers, bottom up:
//! - [`codec`]: little-endian primitives, strings, arrays, identifiers, timestamps
//! - [`messages`]: the closed message catalog with tag-dispatched decoding
//! - [`framing`]: length-prefixed frames over an async byte stream
//!
//! Any error surfaced by these layers is fatal for the stream it came from.

pub mod codec;
pub mod error;
pub mod framing;
pub mod messages;

pub use codec::{WireDecode, WireEncode, WireReader, WireWriter, MAX_STRING_BYTES};
pub use error::ProtocolError;
pub use framing::{read_frame, read_message, write_frame, write_message, DEFAULT_MAX_FRAME_SIZE};
pub use messages::{FileData, MessageType, NetMessage, PathBatch, NONCE_LEN, PROOF_LEN};

// vim: ts=4
