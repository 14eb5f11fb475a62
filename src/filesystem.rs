//! Filesystem collaborator
//!
//! The protocol engine never touches the disk directly. Every operation goes
//! through a [`FileSystem`] implementation; failures are returned as
//! `io::Error`, logged by the caller and treated as a skipped operation.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use filetime::FileTime;

use crate::logging::*;
use crate::types::{FileSystemItem, Timestamp};

/// Extension of in-progress transfers, never reported by [`FileSystem::generate_tree`]
pub const TEMP_EXTENSION: &str = "synctmp";

/// Size and times of a regular file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
	pub size: u64,
	pub last_write_time: Timestamp,
	pub creation_time: Timestamp,
}

/// Filesystem operations consumed by the sync engine
pub trait FileSystem: Send + Sync {
	/// Succeeds when the file is already absent
	fn delete_file(&self, path: &Path) -> io::Result<()>;

	/// Replace `to` with `from`
	fn rename_file(&self, from: &Path, to: &Path) -> io::Result<()>;

	fn set_file_times(&self, path: &Path, last_write: Timestamp, creation: Timestamp) -> io::Result<()>;

	/// Creates missing parents too
	fn create_directory(&self, path: &Path) -> io::Result<()>;

	/// Recursive; succeeds when the directory is already absent
	fn delete_directory(&self, path: &Path) -> io::Result<()>;

	/// Creates the file, truncating an existing one
	fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

	fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

	/// Snapshot of everything below `root`, sorted by relative path.
	///
	/// Fails only when `root` itself cannot be read; unreadable entries
	/// below it are left out.
	fn generate_tree(&self, root: &Path, skip_hidden: bool) -> io::Result<Vec<FileSystemItem>>;

	fn stat_file(&self, path: &Path) -> io::Result<FileStat>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
	exclude: Vec<glob::Pattern>,
}

impl LocalFileSystem {
	pub fn new() -> Self {
		LocalFileSystem { exclude: Vec::new() }
	}

	/// Exclude entries whose relative path matches any of the glob patterns
	pub fn with_exclude_patterns(patterns: &[String]) -> Result<Self, glob::PatternError> {
		let exclude = patterns.iter().map(|p| glob::Pattern::new(p)).collect::<Result<Vec<_>, _>>()?;
		Ok(LocalFileSystem { exclude })
	}

	fn is_excluded(&self, relative: &str) -> bool {
		self.exclude.iter().any(|p| p.matches(relative))
	}

	fn scan_dir(
		&self,
		dir: &Path,
		prefix: &str,
		skip_hidden: bool,
		items: &mut Vec<FileSystemItem>,
	) -> io::Result<()> {
		for entry_result in fs::read_dir(dir)? {
			let entry = match entry_result {
				Ok(entry) => entry,
				Err(e) => {
					warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
					continue;
				}
			};
			let name = match entry.file_name().into_string() {
				Ok(name) => name,
				Err(name) => {
					warn!("Skipping non UTF-8 name {:?} in {}", name, dir.display());
					continue;
				}
			};
			if skip_hidden && name.starts_with('.') {
				continue;
			}
			if is_temp_name(&name) {
				continue;
			}

			let relative = if prefix.is_empty() { name } else { format!("{}/{}", prefix, name) };
			if self.is_excluded(&relative) {
				debug!("Excluded from snapshot: {}", relative);
				continue;
			}

			let path = entry.path();
			let metadata = match fs::symlink_metadata(&path) {
				Ok(metadata) => metadata,
				Err(e) => {
					warn!("Skipping {}: {}", path.display(), e);
					continue;
				}
			};
			if metadata.is_dir() {
				// An unreadable directory is reported without its contents
				items.push(FileSystemItem::directory(relative.clone()));
				if let Err(e) = self.scan_dir(&path, &relative, skip_hidden, items) {
					warn!("Cannot read directory {}: {}", path.display(), e);
				}
			} else if metadata.is_file() {
				let modified = match metadata.modified() {
					Ok(modified) => modified,
					Err(e) => {
						warn!("Skipping {}: {}", path.display(), e);
						continue;
					}
				};
				let size = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
				items.push(FileSystemItem::file(relative, size, Timestamp::from(modified)));
			} else {
				debug!("Skipping special file: {}", relative);
			}
		}
		Ok(())
	}
}

fn is_temp_name(name: &str) -> bool {
	Path::new(name).extension().and_then(|e| e.to_str()) == Some(TEMP_EXTENSION)
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
	match result {
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		other => other,
	}
}

impl FileSystem for LocalFileSystem {
	fn delete_file(&self, path: &Path) -> io::Result<()> {
		ignore_not_found(fs::remove_file(path))
	}

	fn rename_file(&self, from: &Path, to: &Path) -> io::Result<()> {
		fs::rename(from, to)
	}

	fn set_file_times(&self, path: &Path, last_write: Timestamp, _creation: Timestamp) -> io::Result<()> {
		// Creation time cannot be set portably; access time follows the write time
		let mtime = FileTime::from_system_time(last_write.to_system_time());
		filetime::set_file_times(path, mtime, mtime)
	}

	fn create_directory(&self, path: &Path) -> io::Result<()> {
		fs::create_dir_all(path)
	}

	fn delete_directory(&self, path: &Path) -> io::Result<()> {
		ignore_not_found(fs::remove_dir_all(path))
	}

	fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
		Ok(Box::new(fs::File::create(path)?))
	}

	fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
		Ok(Box::new(fs::File::open(path)?))
	}

	fn generate_tree(&self, root: &Path, skip_hidden: bool) -> io::Result<Vec<FileSystemItem>> {
		if !root.is_dir() {
			return Err(io::Error::new(
				io::ErrorKind::NotFound,
				format!("Profile root {} is not a directory", root.display()),
			));
		}
		let mut items = Vec::new();
		self.scan_dir(root, "", skip_hidden, &mut items)?;
		items.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
		Ok(items)
	}

	fn stat_file(&self, path: &Path) -> io::Result<FileStat> {
		let metadata = fs::metadata(path)?;
		if !metadata.is_file() {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("{} is not a regular file", path.display()),
			));
		}
		let modified = metadata.modified()?;
		let created = metadata.created().unwrap_or(modified);
		Ok(FileStat {
			size: metadata.len(),
			last_write_time: Timestamp::from(modified),
			creation_time: Timestamp::from(created),
		})
	}
}

/// Remove leftover temporary files of aborted transfers below `root`.
///
/// Aborted builds leave their temporary file behind. Nothing calls this
/// automatically; the application decides when a profile is idle enough.
pub fn remove_temporary_files(root: &Path) -> io::Result<usize> {
	info!("Cleaning up temporary files below {}", root.display());
	let mut count = 0;

	fn scan_dir(dir: &Path, count: &mut usize) -> io::Result<()> {
		for entry_result in fs::read_dir(dir)? {
			let entry = match entry_result {
				Ok(e) => e,
				Err(e) => {
					debug!("Error reading directory entry during cleanup: {}", e);
					continue;
				}
			};

			let path = entry.path();
			let metadata = match fs::symlink_metadata(&path) {
				Ok(m) => m,
				Err(e) => {
					warn!("Cannot access {} during cleanup: {}", path.display(), e);
					continue;
				}
			};

			let is_temp = path.file_name().and_then(|n| n.to_str()).is_some_and(is_temp_name);
			if is_temp && metadata.is_file() {
				match fs::remove_file(&path) {
					Ok(()) => {
						debug!("Removed temporary file {}", path.display());
						*count += 1;
					}
					Err(e) if e.kind() == io::ErrorKind::NotFound => {}
					Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
				}
			} else if metadata.is_dir() {
				if let Err(e) = scan_dir(&path, count) {
					warn!("Cannot read directory {} during cleanup: {}", path.display(), e);
				}
			}
		}
		Ok(())
	}

	scan_dir(root, &mut count)?;
	if count > 0 {
		info!("Removed {} temporary files", count);
	}
	Ok(count)
}


// vim: ts=4
