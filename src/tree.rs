//! Directory tree differ
//!
//! Matches two snapshots by exact relative path and splits the result into
//! four sets: entries the local side is missing (fetch candidates) and
//! entries the remote side is missing (send candidates), each for files and
//! directories. A file present on both sides with different content metadata
//! is missing on both sides, so it is replaced in both directions' plans.

use std::collections::HashMap;

use crate::types::{FileSystemItem, TICKS_PER_SECOND};

/// Largest last-write difference still considered equal (filesystem precision)
pub const TIMESTAMP_TOLERANCE_TICKS: u64 = TICKS_PER_SECOND as u64;

/// Four-way difference of two tree snapshots.
///
/// Every set keeps the order of the snapshot it was taken from, so parents
/// precede their children whenever the snapshot is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTreeDifference {
	pub local_missing_files: Vec<FileSystemItem>,
	pub local_missing_directories: Vec<FileSystemItem>,
	pub remote_missing_files: Vec<FileSystemItem>,
	pub remote_missing_directories: Vec<FileSystemItem>,
}

impl DirectoryTreeDifference {
	/// Diff `local` against `remote`.
	///
	/// With `compare_timestamps` false only sizes decide whether a file changed.
	pub fn new(local: &[FileSystemItem], remote: &[FileSystemItem], compare_timestamps: bool) -> Self {
		let (local_missing_directories, local_missing_files) =
			missing_from(remote, &index(local), compare_timestamps);
		let (remote_missing_directories, remote_missing_files) =
			missing_from(local, &index(remote), compare_timestamps);

		DirectoryTreeDifference {
			local_missing_files,
			local_missing_directories,
			remote_missing_files,
			remote_missing_directories,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.local_missing_files.is_empty()
			&& self.local_missing_directories.is_empty()
			&& self.remote_missing_files.is_empty()
			&& self.remote_missing_directories.is_empty()
	}
}

type TreeIndex<'a> = HashMap<(bool, &'a str), &'a FileSystemItem>;

fn index(items: &[FileSystemItem]) -> TreeIndex<'_> {
	items.iter().map(|item| ((item.is_directory, item.relative_path.as_str()), item)).collect()
}

/// Entries of `source` without an equal counterpart in `other`, split into
/// (directories, files)
fn missing_from(
	source: &[FileSystemItem],
	other: &TreeIndex<'_>,
	compare_timestamps: bool,
) -> (Vec<FileSystemItem>, Vec<FileSystemItem>) {
	let mut dirs = Vec::new();
	let mut files = Vec::new();
	for item in source {
		match other.get(&(item.is_directory, item.relative_path.as_str())) {
			Some(_) if item.is_directory => {}
			Some(counterpart) if !is_changed(item, counterpart, compare_timestamps) => {}
			_ if item.is_directory => dirs.push(item.clone()),
			_ => files.push(item.clone()),
		}
	}
	(dirs, files)
}

/// Whether two files at the same path differ
pub fn is_changed(a: &FileSystemItem, b: &FileSystemItem, compare_timestamps: bool) -> bool {
	if a.size != b.size {
		return true;
	}
	if !compare_timestamps {
		return false;
	}
	match (a.last_write_time, b.last_write_time) {
		(Some(ta), Some(tb)) => ta.abs_diff(tb) > TIMESTAMP_TOLERANCE_TICKS,
		(None, None) => false,
		_ => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Timestamp;

	fn file(path: &str, size: i64, secs: i64) -> FileSystemItem {
		FileSystemItem::file(path, size, Timestamp::from_ticks(secs * TICKS_PER_SECOND))
	}

	fn names(items: &[FileSystemItem]) -> Vec<&str> {
		items.iter().map(|i| i.relative_path.as_str()).collect()
	}

	#[test]
	fn test_remote_empty() {
		let local = vec![FileSystemItem::directory("docs"), file("docs/a.txt", 10, 100)];
		let diff = DirectoryTreeDifference::new(&local, &[], true);
		assert_eq!(names(&diff.remote_missing_directories), vec!["docs"]);
		assert_eq!(names(&diff.remote_missing_files), vec!["docs/a.txt"]);
		assert!(diff.local_missing_files.is_empty());
		assert!(diff.local_missing_directories.is_empty());
	}

	#[test]
	fn test_identical_snapshots() {
		let tree = vec![
			FileSystemItem::directory("a"),
			file("a/x", 1, 5),
			file("b", 0, 7),
		];
		assert!(DirectoryTreeDifference::new(&tree, &tree.clone(), true).is_empty());
	}

	#[test]
	fn test_size_change_is_both_ways() {
		let local = vec![file("f", 1, 5)];
		let remote = vec![file("f", 2, 5)];
		let diff = DirectoryTreeDifference::new(&local, &remote, false);
		assert_eq!(diff.local_missing_files, remote);
		assert_eq!(diff.remote_missing_files, local);
	}

	#[test]
	fn test_timestamp_change_requires_flag() {
		let local = vec![file("f", 3, 100)];
		let remote = vec![file("f", 3, 200)];
		assert!(DirectoryTreeDifference::new(&local, &remote, false).is_empty());
		let diff = DirectoryTreeDifference::new(&local, &remote, true);
		assert_eq!(names(&diff.local_missing_files), vec!["f"]);
		assert_eq!(names(&diff.remote_missing_files), vec!["f"]);
	}

	#[test]
	fn test_timestamp_tolerance() {
		let a = FileSystemItem::file("f", 3, Timestamp::from_ticks(0));
		let b = FileSystemItem::file("f", 3, Timestamp::from_ticks(TICKS_PER_SECOND));
		let c = FileSystemItem::file("f", 3, Timestamp::from_ticks(TICKS_PER_SECOND + 1));
		assert!(!is_changed(&a, &b, true));
		assert!(is_changed(&a, &c, true));
	}

	#[test]
	fn test_file_and_directory_with_same_path() {
		let local = vec![FileSystemItem::directory("x")];
		let remote = vec![file("x", 1, 1)];
		let diff = DirectoryTreeDifference::new(&local, &remote, true);
		assert_eq!(names(&diff.remote_missing_directories), vec!["x"]);
		assert_eq!(names(&diff.local_missing_files), vec!["x"]);
	}

	#[test]
	fn test_swap_is_symmetric() {
		let local = vec![
			FileSystemItem::directory("a"),
			file("a/1", 1, 1),
			file("same", 4, 4),
			file("changed", 4, 4),
		];
		let remote = vec![
			FileSystemItem::directory("b"),
			file("b/2", 2, 2),
			file("same", 4, 4),
			file("changed", 5, 4),
		];
		let forward = DirectoryTreeDifference::new(&local, &remote, true);
		let backward = DirectoryTreeDifference::new(&remote, &local, true);
		assert_eq!(forward.local_missing_files, backward.remote_missing_files);
		assert_eq!(forward.local_missing_directories, backward.remote_missing_directories);
		assert_eq!(forward.remote_missing_files, backward.local_missing_files);
		assert_eq!(forward.remote_missing_directories, backward.local_missing_directories);
	}
}

// vim: ts=4
