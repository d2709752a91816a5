use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic id source for timers registered on one clock.
#[derive(Debug, Default, Clone)]
pub struct TimerIds {
	next: Arc<AtomicU64>,
}

impl TimerIds {
	/// Creates a new id source starting at 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next timer id.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Cancelable handle for one registered timer.
///
/// Clones share the same cancellation state. Dropping a handle does not
/// cancel the timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
	id: u64,
	cancel: CancellationToken,
}

impl TimerHandle {
	/// Creates a handle for timer `id` driven by `cancel`.
	pub fn new(id: u64, cancel: CancellationToken) -> Self {
		Self { id, cancel }
	}

	/// Returns the timer id.
	pub const fn id(&self) -> u64 {
		self.id
	}

	/// Returns true once the timer has been cancelled.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Cancels the timer. Idempotent.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Future resolving when the timer is cancelled.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}
}

impl PartialEq for TimerHandle {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for TimerHandle {}
