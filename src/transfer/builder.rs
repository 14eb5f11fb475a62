//! Shared file builder
//!
//! One worker serves every connection of a peer, so only one chunk is
//! written at a time. Chunks are applied on the blocking pool.
//!
//! Each delivering connection has its own build in progress. A connection
//! that starts a file another connection was building takes it over from
//! byte 0, and builds of closed connections are dropped.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::MessageSink;
use crate::callbacks::{EventDispatcher, FileBuiltEvent};
use crate::filesystem::{FileSystem, TEMP_EXTENSION};
use crate::logging::*;
use crate::peer::ProfileManager;
use crate::progress::ProgressCounter;
use crate::protocol::{FileData, NetMessage};
use crate::types::{ProfileId, SyncProfile, Timestamp};
use crate::validation::resolve_wire_path;

/// Everything the worker needs besides the chunks themselves
pub struct BuilderContext {
	pub fs: Arc<dyn FileSystem>,
	pub profiles: Arc<ProfileManager>,
	pub events: EventDispatcher,
	/// Apply the sender's timestamps to built files
	pub supports_timestamp: bool,
}

struct BuildJob {
	data: FileData,
	reply: Weak<dyn MessageSink>,
	progress: Arc<ProgressCounter>,
}

/// What to do after a chunk was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildOutcome {
	/// Ask the sender for the next chunk
	RequestNext,
	/// Not authorized: drop without a reply
	Rejected,
}

struct CurrentBuild {
	profile_id: ProfileId,
	relative_path: String,
	final_path: PathBuf,
	temp_path: PathBuf,
	writer: Box<dyn Write + Send>,
	written: u64,
	file_size: u64,
	/// Bytes added to the progress maximum for this file
	announced: u64,
	last_write_time: Timestamp,
	creation_time: Timestamp,
	progress: Arc<ProgressCounter>,
}

impl CurrentBuild {
	fn is_for(&self, data: &FileData) -> bool {
		self.profile_id == data.profile_id && self.relative_path == data.relative_path
	}

	fn settle_progress(&self) {
		self.progress.add_progress(self.announced.saturating_sub(self.written));
	}
}

/// A file whose build failed; its remaining chunks are discarded
struct FailedBuild {
	profile_id: ProfileId,
	relative_path: String,
	remaining: u64,
}

impl FailedBuild {
	fn is_for(&self, data: &FileData) -> bool {
		self.profile_id == data.profile_id && self.relative_path == data.relative_path
	}
}

/// Identity of a delivering connection
type SinkKey = usize;

fn sink_key(reply: &Weak<dyn MessageSink>) -> SinkKey {
	reply.as_ptr() as *const () as usize
}

/// Build state of one delivering connection
struct SinkBuilds {
	/// Keeps the allocation alive, so the key is not reused while tracked
	reply: Weak<dyn MessageSink>,
	current: Option<CurrentBuild>,
	failed: Option<FailedBuild>,
}

impl SinkBuilds {
	fn new(reply: Weak<dyn MessageSink>) -> Self {
		SinkBuilds { reply, current: None, failed: None }
	}

	fn owns(&self, data: &FileData) -> bool {
		self.current.as_ref().is_some_and(|b| b.is_for(data)) || self.failed.as_ref().is_some_and(|f| f.is_for(data))
	}

	fn is_idle(&self) -> bool {
		self.current.is_none() && self.failed.is_none()
	}

	fn abandon_current(&mut self, reason: &str) {
		if let Some(stale) = self.current.take() {
			warn!(
				"Abandoning build of {} ({} of {} bytes, {}), temporary file left on disk",
				stale.relative_path, stale.written, stale.file_size, reason
			);
			stale.settle_progress();
		}
	}

	fn mark_failed(&mut self, data: &FileData, remaining: u64) {
		if remaining > 0 {
			self.failed = Some(FailedBuild {
				profile_id: data.profile_id,
				relative_path: data.relative_path.clone(),
				remaining,
			});
		}
	}

	fn apply(
		&mut self,
		ctx: &BuilderContext,
		profile: &SyncProfile,
		final_path: PathBuf,
		data: FileData,
		progress: Arc<ProgressCounter>,
	) -> BuildOutcome {
		let file_size = u64::try_from(data.file_size).unwrap_or(0);
		let chunk_len = data.chunk.len() as u64;

		if let Some(failed) = self.failed.as_mut() {
			if failed.is_for(&data) {
				failed.remaining = failed.remaining.saturating_sub(chunk_len);
				if failed.remaining == 0 || chunk_len == 0 {
					self.failed = None;
				}
				return BuildOutcome::RequestNext;
			}
			self.failed = None;
		}

		if !self.current.as_ref().is_some_and(|b| b.is_for(&data)) {
			self.abandon_current("sender moved on");
			let temp_path = temp_path_for(&final_path);
			match ctx.fs.open_write(&temp_path) {
				Ok(writer) => {
					debug!("Building {} ({} bytes)", data.relative_path, file_size);
					progress.add_maximum(file_size);
					self.current = Some(CurrentBuild {
						profile_id: data.profile_id,
						relative_path: data.relative_path.clone(),
						final_path,
						temp_path,
						writer,
						written: 0,
						file_size,
						announced: file_size,
						last_write_time: data.last_write_time,
						creation_time: data.creation_time,
						progress,
					});
				}
				Err(e) => {
					warn!("Cannot create {}: {}", temp_path.display(), e);
					self.mark_failed(&data, file_size.saturating_sub(chunk_len));
					return BuildOutcome::RequestNext;
				}
			}
		}

		let Some(build) = self.current.as_mut() else {
			return BuildOutcome::RequestNext;
		};

		// The last header wins: a sender whose file shrank reports the final size
		build.file_size = file_size;
		if let Err(e) = build.writer.write_all(&data.chunk) {
			warn!("Write to {} failed: {}", build.temp_path.display(), e);
			let remaining = file_size.saturating_sub(build.written + chunk_len);
			build.settle_progress();
			self.current = None;
			self.mark_failed(&data, remaining);
			return BuildOutcome::RequestNext;
		}
		build.written += chunk_len;
		build.progress.add_progress(chunk_len);

		if build.written >= build.file_size {
			if let Some(done) = self.current.take() {
				finish_build(ctx, done, profile);
			}
		}
		BuildOutcome::RequestNext
	}
}

#[derive(Default)]
struct BuildState {
	sinks: HashMap<SinkKey, SinkBuilds>,
}

impl BuildState {
	/// Forget the builds of connections that are gone
	fn prune_closed(&mut self) {
		self.sinks.retain(|_, builds| {
			if builds.reply.strong_count() > 0 {
				return true;
			}
			builds.abandon_current("connection closed");
			false
		});
	}

	/// Another connection restarts `data`'s file; drop its old build
	fn release_elsewhere(&mut self, key: SinkKey, data: &FileData) {
		for (other, builds) in self.sinks.iter_mut() {
			if *other == key {
				continue;
			}
			if builds.current.as_ref().is_some_and(|b| b.is_for(data)) {
				builds.abandon_current("restarted by another connection");
			}
			if builds.failed.as_ref().is_some_and(|f| f.is_for(data)) {
				builds.failed = None;
			}
		}
		self.sinks.retain(|other, builds| *other == key || !builds.is_idle());
	}
}

/// Handle to the shared build worker
pub struct FileBuilder {
	tx: mpsc::UnboundedSender<BuildJob>,
	pending: Arc<AtomicUsize>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileBuilder {
	/// Spawn the worker on the current runtime
	pub fn start(context: BuilderContext) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let pending = Arc::new(AtomicUsize::new(0));
		let worker = tokio::spawn(run_worker(Arc::new(context), rx, Arc::clone(&pending)));
		FileBuilder { tx, pending, worker: Mutex::new(Some(worker)) }
	}

	/// Queue a received chunk. `reply` gets the next chunk request.
	pub fn enqueue(&self, data: FileData, reply: Weak<dyn MessageSink>, progress: Arc<ProgressCounter>) {
		self.pending.fetch_add(1, Ordering::SeqCst);
		if self.tx.send(BuildJob { data, reply, progress }).is_err() {
			self.pending.fetch_sub(1, Ordering::SeqCst);
			warn!("File builder is stopped, chunk dropped");
		}
	}

	pub fn is_build_queue_empty(&self) -> bool {
		self.pending.load(Ordering::SeqCst) == 0
	}

	/// Stop the worker; unfinished temporary files stay on disk
	pub fn shutdown(&self) {
		if let Some(worker) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
			worker.abort();
		}
	}
}

impl Drop for FileBuilder {
	fn drop(&mut self) {
		self.shutdown();
	}
}

async fn run_worker(
	ctx: Arc<BuilderContext>,
	mut rx: mpsc::UnboundedReceiver<BuildJob>,
	pending: Arc<AtomicUsize>,
) {
	let state = Arc::new(Mutex::new(BuildState::default()));

	while let Some(BuildJob { data, reply, progress }) = rx.recv().await {
		let ctx = Arc::clone(&ctx);
		let state = Arc::clone(&state);
		let sink = reply.clone();
		let result = tokio::task::spawn_blocking(move || {
			let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
			apply_chunk(&ctx, &mut state, data, &sink, progress)
		})
		.await;

		match result {
			Ok(BuildOutcome::RequestNext) => match reply.upgrade() {
				Some(sink) => {
					if let Err(e) = sink.send_message(NetMessage::FileChunkRequest) {
						debug!("Cannot request next chunk: {}", e);
					}
				}
				None => debug!("Connection gone, not requesting next chunk"),
			},
			Ok(BuildOutcome::Rejected) => {}
			Err(e) => error!("Chunk build task failed: {}", e),
		}
		pending.fetch_sub(1, Ordering::SeqCst);
	}
}

fn temp_path_for(final_path: &Path) -> PathBuf {
	let mut name = final_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(".");
	name.push(TEMP_EXTENSION);
	final_path.with_file_name(name)
}

fn apply_chunk(
	ctx: &BuilderContext,
	state: &mut BuildState,
	data: FileData,
	reply: &Weak<dyn MessageSink>,
	progress: Arc<ProgressCounter>,
) -> BuildOutcome {
	state.prune_closed();

	let Some(profile) = ctx.profiles.get(&data.profile_id) else {
		warn!("Chunk for unknown profile {} dropped", data.profile_id);
		return BuildOutcome::Rejected;
	};
	if !profile.allow_receive || profile.key != data.key {
		warn!("Chunk for profile {} rejected", data.profile_id);
		return BuildOutcome::Rejected;
	}
	let final_path = match resolve_wire_path(&profile.root_directory, &data.relative_path) {
		Ok(path) => path,
		Err(e) => {
			warn!("Chunk with unsafe path {:?} rejected: {}", data.relative_path, e);
			return BuildOutcome::Rejected;
		}
	};

	let key = sink_key(reply);
	if !state.sinks.get(&key).is_some_and(|builds| builds.owns(&data)) {
		state.release_elsewhere(key, &data);
	}
	let builds = state.sinks.entry(key).or_insert_with(|| SinkBuilds::new(reply.clone()));
	let outcome = builds.apply(ctx, &profile, final_path, data, progress);
	if builds.is_idle() {
		state.sinks.remove(&key);
	}
	outcome
}

fn finish_build(ctx: &BuilderContext, mut build: CurrentBuild, profile: &SyncProfile) {
	build.settle_progress();
	if let Err(e) = build.writer.flush() {
		warn!("Flush of {} failed: {}", build.temp_path.display(), e);
		return;
	}
	drop(build.writer);

	if let Err(e) = ctx.fs.rename_file(&build.temp_path, &build.final_path) {
		warn!("Cannot move {} into place: {}", build.relative_path, e);
		return;
	}
	if ctx.supports_timestamp {
		if let Err(e) = ctx.fs.set_file_times(&build.final_path, build.last_write_time, build.creation_time) {
			warn!("Cannot set times of {}: {}", build.relative_path, e);
		}
	}

	info!("Received {} ({} bytes)", build.relative_path, build.written);
	ctx.events.file_built(FileBuiltEvent {
		profile_id: build.profile_id,
		root_directory: profile.root_directory.clone(),
		relative_path: build.relative_path,
	});
}


// vim: ts=4
