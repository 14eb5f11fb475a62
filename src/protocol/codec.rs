//! Bit-exact binary codec for primitive wire values
//!
//! Layout rules:
//! - integers are fixed width little-endian, booleans a single 0/1 byte
//! - strings are UTF-8 prefixed with a `u16` byte length (hard limit 65535)
//! - arrays of any element type are prefixed with an `i32` element count
//! - identifiers are 16 raw bytes in little-endian GUID layout
//! - timestamps are `i64` ticks (see [`Timestamp`])

use uuid::Uuid;

use super::error::ProtocolError;
use crate::types::Timestamp;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, ProtocolError>;

/// Largest string payload the `u16` prefix can describe
pub const MAX_STRING_BYTES: usize = u16::MAX as usize;

/// Append-only encoder
#[derive(Debug, Default)]
pub struct WireWriter {
	buf: Vec<u8>,
}

impl WireWriter {
	pub fn new() -> Self {
		WireWriter { buf: Vec::new() }
	}

	pub fn with_capacity(capacity: usize) -> Self {
		WireWriter { buf: Vec::with_capacity(capacity) }
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.buf
	}

	pub fn write_raw(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	pub fn write_u8(&mut self, v: u8) {
		self.buf.push(v);
	}

	pub fn write_bool(&mut self, v: bool) {
		self.buf.push(u8::from(v));
	}

	pub fn write_u16(&mut self, v: u16) {
		self.write_raw(&v.to_le_bytes());
	}

	pub fn write_i32(&mut self, v: i32) {
		self.write_raw(&v.to_le_bytes());
	}

	pub fn write_i64(&mut self, v: i64) {
		self.write_raw(&v.to_le_bytes());
	}

	pub fn write_string(&mut self, v: &str) -> CodecResult<()> {
		let bytes = v.as_bytes();
		if bytes.len() > MAX_STRING_BYTES {
			return Err(ProtocolError::StringTooLong(bytes.len()));
		}
		self.write_u16(bytes.len() as u16);
		self.write_raw(bytes);
		Ok(())
	}

	pub fn write_uuid(&mut self, v: &Uuid) {
		self.write_raw(&v.to_bytes_le());
	}

	pub fn write_timestamp(&mut self, v: Timestamp) {
		self.write_i64(v.ticks());
	}

	/// `i32` count prefix for an array of `len` elements
	pub fn write_len(&mut self, len: usize) -> CodecResult<()> {
		let count = i32::try_from(len)
			.map_err(|_| ProtocolError::Other(format!("Array of {} elements is too long", len)))?;
		self.write_i32(count);
		Ok(())
	}

	/// Byte array: `i32` count followed by the raw bytes
	pub fn write_bytes(&mut self, v: &[u8]) -> CodecResult<()> {
		self.write_len(v.len())?;
		self.write_raw(v);
		Ok(())
	}

	pub fn write_array<T: WireEncode>(&mut self, items: &[T]) -> CodecResult<()> {
		self.write_len(items.len())?;
		for item in items {
			item.encode(self)?;
		}
		Ok(())
	}
}

/// Cursor over a received message body
#[derive(Debug)]
pub struct WireReader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> WireReader<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		WireReader { buf, pos: 0 }
	}

	pub fn remaining(&self) -> usize {
		self.buf.len() - self.pos
	}

	/// Fail unless the whole body was consumed
	pub fn finish(&self) -> CodecResult<()> {
		match self.remaining() {
			0 => Ok(()),
			n => Err(ProtocolError::TrailingBytes(n)),
		}
	}

	pub fn read_raw(&mut self, len: usize) -> CodecResult<&'a [u8]> {
		if self.remaining() < len {
			return Err(ProtocolError::Truncated { needed: len, available: self.remaining() });
		}
		let slice = &self.buf[self.pos..self.pos + len];
		self.pos += len;
		Ok(slice)
	}

	fn read_array_const<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
		let mut out = [0u8; N];
		out.copy_from_slice(self.read_raw(N)?);
		Ok(out)
	}

	pub fn read_fixed<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
		self.read_array_const::<N>()
	}

	pub fn read_u8(&mut self) -> CodecResult<u8> {
		Ok(self.read_raw(1)?[0])
	}

	pub fn read_bool(&mut self) -> CodecResult<bool> {
		match self.read_u8()? {
			0 => Ok(false),
			1 => Ok(true),
			b => Err(ProtocolError::InvalidBool(b)),
		}
	}

	pub fn read_u16(&mut self) -> CodecResult<u16> {
		Ok(u16::from_le_bytes(self.read_array_const()?))
	}

	pub fn read_i32(&mut self) -> CodecResult<i32> {
		Ok(i32::from_le_bytes(self.read_array_const()?))
	}

	pub fn read_i64(&mut self) -> CodecResult<i64> {
		Ok(i64::from_le_bytes(self.read_array_const()?))
	}

	pub fn read_string(&mut self) -> CodecResult<String> {
		let len = self.read_u16()? as usize;
		let bytes = self.read_raw(len)?;
		Ok(String::from_utf8(bytes.to_vec())?)
	}

	pub fn read_uuid(&mut self) -> CodecResult<Uuid> {
		Ok(Uuid::from_bytes_le(self.read_array_const()?))
	}

	pub fn read_timestamp(&mut self) -> CodecResult<Timestamp> {
		Ok(Timestamp::from_ticks(self.read_i64()?))
	}

	/// Read an `i32` count prefix.
	///
	/// Every element occupies at least `min_element_size` bytes, so a count
	/// the remaining body cannot hold is rejected before anything is allocated.
	pub fn read_len(&mut self, min_element_size: usize) -> CodecResult<usize> {
		let count = self.read_i32()?;
		if count < 0 {
			return Err(ProtocolError::InvalidLength(count));
		}
		let count = count as usize;
		if count.saturating_mul(min_element_size) > self.remaining() {
			return Err(ProtocolError::Truncated {
				needed: count.saturating_mul(min_element_size),
				available: self.remaining(),
			});
		}
		Ok(count)
	}

	pub fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
		let len = self.read_len(1)?;
		Ok(self.read_raw(len)?.to_vec())
	}

	pub fn read_array<T: WireDecode>(&mut self) -> CodecResult<Vec<T>> {
		let count = self.read_len(T::MIN_WIRE_SIZE)?;
		let mut items = Vec::with_capacity(count);
		for _ in 0..count {
			items.push(T::decode(self)?);
		}
		Ok(items)
	}
}

/// Values with a defined wire encoding
pub trait WireEncode {
	fn encode(&self, w: &mut WireWriter) -> CodecResult<()>;
}

/// Values that can be decoded from the wire
pub trait WireDecode: Sized {
	/// Smallest possible encoding, used to sanity-check array counts
	const MIN_WIRE_SIZE: usize;

	fn decode(r: &mut WireReader<'_>) -> CodecResult<Self>;
}

macro_rules! wire_primitive {
	($ty:ty, $size:expr, $write:ident, $read:ident) => {
		impl WireEncode for $ty {
			fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
				w.$write(*self);
				Ok(())
			}
		}

		impl WireDecode for $ty {
			const MIN_WIRE_SIZE: usize = $size;

			fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
				r.$read()
			}
		}
	};
}

wire_primitive!(u8, 1, write_u8, read_u8);
wire_primitive!(bool, 1, write_bool, read_bool);
wire_primitive!(u16, 2, write_u16, read_u16);
wire_primitive!(i32, 4, write_i32, read_i32);
wire_primitive!(i64, 8, write_i64, read_i64);
wire_primitive!(Timestamp, 8, write_timestamp, read_timestamp);

impl WireEncode for String {
	fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
		w.write_string(self)
	}
}

impl WireDecode for String {
	const MIN_WIRE_SIZE: usize = 2;

	fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
		r.read_string()
	}
}

impl WireEncode for Uuid {
	fn encode(&self, w: &mut WireWriter) -> CodecResult<()> {
		w.write_uuid(self);
		Ok(())
	}
}

impl WireDecode for Uuid {
	const MIN_WIRE_SIZE: usize = 16;

	fn decode(r: &mut WireReader<'_>) -> CodecResult<Self> {
		r.read_uuid()
	}
}


// vim: ts=4
