//! Transfer progress accounting and stall detection
//!
//! Each connection owns one [`ProgressCounter`]. The sender and the builder
//! raise its maximum when a file is queued or started and advance it as
//! bytes move. The connection's watchdog uses [`ProgressCounter::is_stalled`]
//! to drop connections whose transfers stopped moving.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Point-in-time copy of a progress counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
	pub current: u64,
	pub maximum: u64,
	pub indeterminate: bool,
}

impl ProgressSnapshot {
	/// Completed fraction in `0.0..=1.0`, `None` when indeterminate
	pub fn ratio(&self) -> Option<f64> {
		if self.indeterminate {
			return None;
		}
		if self.maximum == 0 {
			return Some(1.0);
		}
		Some((self.current as f64 / self.maximum as f64).clamp(0.0, 1.0))
	}
}

#[derive(Debug)]
struct ProgressInner {
	current: u64,
	maximum: u64,
	indeterminate: bool,
	last_advance: Instant,
}

impl ProgressInner {
	fn in_flight(&self) -> bool {
		self.indeterminate || self.current != self.maximum
	}
}

/// Shared progress counter
///
/// `current` never decreases while work is in flight; a new batch of work
/// arriving after the counter went idle starts from zero again.
#[derive(Debug)]
pub struct ProgressCounter {
	inner: Mutex<ProgressInner>,
}

impl ProgressCounter {
	pub fn new() -> Self {
		ProgressCounter {
			inner: Mutex::new(ProgressInner {
				current: 0,
				maximum: 0,
				indeterminate: false,
				last_advance: Instant::now(),
			}),
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Announce `amount` more units of work
	pub fn add_maximum(&self, amount: u64) {
		let mut inner = self.lock();
		if !inner.in_flight() {
			inner.current = 0;
			inner.maximum = 0;
		}
		inner.maximum = inner.maximum.saturating_add(amount);
		inner.last_advance = Instant::now();
	}

	/// Record `amount` completed units, clamped to the maximum
	pub fn add_progress(&self, amount: u64) {
		let mut inner = self.lock();
		inner.current = inner.current.saturating_add(amount).min(inner.maximum);
		inner.last_advance = Instant::now();
	}

	/// Mark progress as unknown (e.g. a snapshot is being generated)
	pub fn set_indeterminate(&self, indeterminate: bool) {
		let mut inner = self.lock();
		inner.indeterminate = indeterminate;
		inner.last_advance = Instant::now();
	}

	pub fn snapshot(&self) -> ProgressSnapshot {
		let inner = self.lock();
		ProgressSnapshot {
			current: inner.current,
			maximum: inner.maximum,
			indeterminate: inner.indeterminate,
		}
	}

	/// Whether any accounted work is still outstanding
	pub fn in_flight(&self) -> bool {
		self.lock().in_flight()
	}

	/// Time since the counter last moved
	pub fn idle_for(&self) -> Duration {
		self.lock().last_advance.elapsed()
	}

	/// In flight and idle for at least `timeout`
	pub fn is_stalled(&self, timeout: Duration) -> bool {
		let inner = self.lock();
		inner.in_flight() && inner.last_advance.elapsed() >= timeout
	}
}

impl Default for ProgressCounter {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4
