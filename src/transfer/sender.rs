//! Per-connection file sender

use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::MessageSink;
use crate::error::PeerError;
use crate::filesystem::{FileStat, FileSystem};
use crate::logging::*;
use crate::progress::ProgressCounter;
use crate::protocol::{FileData, NetMessage};
use crate::types::{FileSystemItem, ProfileId, ProfileKey, SyncProfile};
use crate::validation::resolve_wire_path;

/// A file queued for sending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSendInfo {
	pub profile_id: ProfileId,
	pub key: ProfileKey,
	pub root_directory: PathBuf,
	pub relative_path: String,
	/// Size from the snapshot, used for progress accounting
	pub size: u64,
}

impl FileSendInfo {
	/// Queue entries for the files of a diff result
	pub fn from_items(profile_id: ProfileId, profile: &SyncProfile, items: &[FileSystemItem]) -> Vec<Self> {
		items
			.iter()
			.filter(|item| !item.is_directory)
			.map(|item| FileSendInfo {
				profile_id,
				key: profile.key,
				root_directory: profile.root_directory.clone(),
				relative_path: item.relative_path.clone(),
				size: u64::try_from(item.size).unwrap_or(0),
			})
			.collect()
	}
}

struct OpenFile {
	info: FileSendInfo,
	reader: Box<dyn Read + Send>,
	stat: FileStat,
	sent: u64,
}

#[derive(Default)]
struct SenderState {
	queue: VecDeque<FileSendInfo>,
	current: Option<OpenFile>,
	/// A chunk went out and no request for the next one arrived yet
	awaiting_request: bool,
}

/// Queue of outgoing files for one connection
pub struct FileSender {
	fs: Arc<dyn FileSystem>,
	chunk_size: usize,
	progress: Arc<ProgressCounter>,
	state: Mutex<SenderState>,
}

impl FileSender {
	pub fn new(fs: Arc<dyn FileSystem>, chunk_size: usize, progress: Arc<ProgressCounter>) -> Self {
		FileSender { fs, chunk_size: chunk_size.max(1), progress, state: Mutex::new(SenderState::default()) }
	}

	fn lock(&self) -> MutexGuard<'_, SenderState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Queue files; starts sending when the sender was idle
	pub fn add_files(&self, sink: &dyn MessageSink, files: Vec<FileSendInfo>) -> Result<(), PeerError> {
		if files.is_empty() {
			return Ok(());
		}
		let mut state = self.lock();
		for file in files {
			self.progress.add_maximum(file.size);
			debug!("Queued {} ({} bytes)", file.relative_path, file.size);
			state.queue.push_back(file);
		}
		if !state.awaiting_request {
			self.send_next_chunk(&mut state, sink)?;
		}
		Ok(())
	}

	/// The receiver asked for the next chunk
	pub fn on_chunk_request(&self, sink: &dyn MessageSink) -> Result<(), PeerError> {
		let mut state = self.lock();
		state.awaiting_request = false;
		self.send_next_chunk(&mut state, sink)
	}

	pub fn is_send_queue_empty(&self) -> bool {
		let state = self.lock();
		state.queue.is_empty() && state.current.is_none()
	}

	/// Drop everything queued
	pub fn clear(&self) {
		let mut state = self.lock();
		state.queue.clear();
		state.current = None;
		state.awaiting_request = false;
	}

	fn open_next(&self, state: &mut SenderState) -> Option<()> {
		while state.current.is_none() {
			let info = state.queue.pop_front()?;
			match self.open(&info) {
				Ok((reader, stat)) => state.current = Some(OpenFile { info, reader, stat, sent: 0 }),
				Err(e) => {
					warn!("Skipping {}: {}", info.relative_path, e);
					self.progress.add_progress(info.size);
				}
			}
		}
		Some(())
	}

	fn open(&self, info: &FileSendInfo) -> io::Result<(Box<dyn Read + Send>, FileStat)> {
		let path = resolve_wire_path(&info.root_directory, &info.relative_path)
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
		let stat = self.fs.stat_file(&path)?;
		let reader = self.fs.open_read(&path)?;
		Ok((reader, stat))
	}

	/// Send one chunk of the current (or next) file. Does nothing when the
	/// queue is exhausted.
	fn send_next_chunk(&self, state: &mut SenderState, sink: &dyn MessageSink) -> Result<(), PeerError> {
		loop {
			if self.open_next(state).is_none() {
				return Ok(());
			}
			let Some(file) = state.current.as_mut() else {
				return Ok(());
			};

			let remaining = file.stat.size - file.sent;
			let want = remaining.min(self.chunk_size as u64);
			let mut chunk = Vec::with_capacity(want as usize);
			if let Err(e) = (&mut file.reader).take(want).read_to_end(&mut chunk) {
				warn!("Read of {} failed: {}", file.info.relative_path, e);
				self.progress.add_progress(file.info.size.saturating_sub(file.sent));
				state.current = None;
				continue;
			}

			let read = chunk.len() as u64;
			let shrunk = read < want;
			file.sent += read;
			let file_size = if shrunk {
				warn!("{} shrank during transfer, sending {} bytes", file.info.relative_path, file.sent);
				file.sent
			} else {
				file.stat.size
			};

			let msg = NetMessage::FileData(FileData {
				profile_id: file.info.profile_id,
				key: file.info.key,
				relative_path: file.info.relative_path.clone(),
				file_size: i64::try_from(file_size).unwrap_or(i64::MAX),
				last_write_time: file.stat.last_write_time,
				creation_time: file.stat.creation_time,
				chunk,
			});
			self.progress.add_progress(read);

			if shrunk || file.sent >= file.stat.size {
				debug!("Sent last chunk of {}", file.info.relative_path);
				self.progress.add_progress(file.info.size.saturating_sub(file.sent));
				state.current = None;
			}

			state.awaiting_request = true;
			return sink.send_message(msg);
		}
	}
}


// vim: ts=4
