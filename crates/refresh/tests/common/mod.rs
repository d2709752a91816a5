use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adcadence_refresh::{AdNetwork, CommandQueue, RefreshScheduler, SchedulerConfig};
use adcadence_worker::{Clock, TimerCallback, TimerHandle, TimerIds};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	Slots(Vec<&'static str>),
	All,
}

pub fn slots(names: &[&'static str]) -> Call {
	Call::Slots(names.to_vec())
}

/// Ad network double recording every call in order.
#[derive(Default)]
pub struct Recorder {
	calls: Mutex<Vec<Call>>,
}

impl Recorder {
	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}
}

impl AdNetwork for Recorder {
	type Slot = &'static str;

	fn refresh_slots(&self, slots: &[Self::Slot]) {
		self.calls.lock().push(Call::Slots(slots.to_vec()));
	}

	fn refresh_all(&self) {
		self.calls.lock().push(Call::All);
	}
}

/// Ready gateway plus recorder.
pub fn ready_gateway() -> (CommandQueue<Recorder>, Arc<Recorder>) {
	let _ = tracing_subscriber::fmt::try_init();
	let network = Arc::new(Recorder::default());
	let gateway = CommandQueue::spawn(Arc::clone(&network));
	gateway.mark_ready();
	(gateway, network)
}

pub fn scheduler(config: &SchedulerConfig) -> (RefreshScheduler<Recorder>, Arc<Recorder>) {
	let (gateway, network) = ready_gateway();
	let scheduler = RefreshScheduler::new(config, gateway).expect("valid config");
	(scheduler, network)
}

pub async fn advance(ms: u64) {
	tokio::time::sleep(Duration::from_millis(ms)).await;
}

struct ManualTimer {
	handle: TimerHandle,
	period: Duration,
	repeat: bool,
	callback: Option<TimerCallback>,
}

/// Clock whose timers only fire when a test says so.
#[derive(Default)]
pub struct ManualClock {
	ids: TimerIds,
	timers: Mutex<HashMap<u64, ManualTimer>>,
}

impl ManualClock {
	fn register(&self, period: Duration, repeat: bool, callback: TimerCallback) -> TimerHandle {
		let handle = TimerHandle::new(self.ids.next(), CancellationToken::new());
		self.timers.lock().insert(
			handle.id(),
			ManualTimer {
				handle: handle.clone(),
				period,
				repeat,
				callback: Some(callback),
			},
		);
		handle
	}

	/// Periods of live timers, sorted.
	pub fn live_periods(&self) -> Vec<Duration> {
		let mut periods: Vec<_> = self
			.timers
			.lock()
			.values()
			.filter(|timer| !timer.handle.is_cancelled())
			.map(|timer| timer.period)
			.collect();
		periods.sort();
		periods
	}

	/// Fires every live timer with `period` once. Returns how many fired.
	pub fn fire(&self, period: Duration) -> usize {
		let ids: Vec<u64> = self
			.timers
			.lock()
			.iter()
			.filter(|(_, timer)| timer.period == period && !timer.handle.is_cancelled())
			.map(|(id, _)| *id)
			.collect();

		let mut fired = 0;
		for id in ids {
			// Callbacks may register timers, so none run under the lock.
			let Some(mut callback) = self.timers.lock().get_mut(&id).and_then(|timer| timer.callback.take()) else {
				continue;
			};
			callback();
			fired += 1;

			let mut timers = self.timers.lock();
			match timers.get_mut(&id) {
				Some(timer) if timer.repeat && !timer.handle.is_cancelled() => timer.callback = Some(callback),
				Some(_) => {
					timers.remove(&id);
				}
				None => {}
			}
		}
		fired
	}
}

impl Clock for ManualClock {
	fn every(&self, period: Duration, callback: TimerCallback) -> TimerHandle {
		self.register(period, true, callback)
	}

	fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
		self.register(delay, false, callback)
	}

	fn cancel(&self, handle: &TimerHandle) {
		handle.cancel();
		self.timers.lock().remove(&handle.id());
	}
}
