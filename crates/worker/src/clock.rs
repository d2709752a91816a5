use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::TaskClass;
use crate::token::{TimerHandle, TimerIds};

/// Callback invoked on every timer tick.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Shortest period a timer is allowed to run at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Timer service: repeating and one-shot callbacks that can be cancelled.
///
/// Callbacks never run inside `every` or `after` themselves; callers may
/// register timers while holding locks their callbacks take.
pub trait Clock: Send + Sync + 'static {
	/// Runs `callback` every `period`, first one period after registration.
	fn every(&self, period: Duration, callback: TimerCallback) -> TimerHandle;

	/// Runs `callback` once after `delay`.
	fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

	/// Cancels a timer registered on this clock. Idempotent.
	fn cancel(&self, handle: &TimerHandle) {
		handle.cancel();
	}
}

/// [`Clock`] backed by tokio timers.
///
/// Every timer runs on its own task and observes tokio's paused clock, so
/// tests can drive it with `tokio::time::advance`.
#[derive(Debug, Default, Clone)]
pub struct TokioClock {
	ids: TimerIds,
}

impl TokioClock {
	/// Creates a clock with a fresh timer id space.
	pub fn new() -> Self {
		Self::default()
	}
}

impl Clock for TokioClock {
	fn every(&self, period: Duration, mut callback: TimerCallback) -> TimerHandle {
		let period = period.max(MIN_PERIOD);
		let handle = TimerHandle::new(self.ids.next(), CancellationToken::new());
		let timer = handle.clone();
		let start = Instant::now() + period;

		tracing::trace!(timer = timer.id(), period_ms = period.as_millis() as u64, "worker.timer.every");
		crate::spawn(TaskClass::Timer, async move {
			let mut ticks = tokio::time::interval_at(start, period);
			ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				tokio::select! {
					biased;
					_ = timer.cancelled() => break,
					_ = ticks.tick() => callback(),
				}
			}
			tracing::trace!(timer = timer.id(), "worker.timer.stopped");
		});
		handle
	}

	fn after(&self, delay: Duration, mut callback: TimerCallback) -> TimerHandle {
		let handle = TimerHandle::new(self.ids.next(), CancellationToken::new());
		let timer = handle.clone();
		let deadline = Instant::now() + delay;

		tracing::trace!(timer = timer.id(), delay_ms = delay.as_millis() as u64, "worker.timer.after");
		crate::spawn(TaskClass::Timer, async move {
			tokio::select! {
				biased;
				_ = timer.cancelled() => {}
				_ = tokio::time::sleep_until(deadline) => callback(),
			}
		});
		handle
	}
}

#[cfg(test)]
mod tests;
