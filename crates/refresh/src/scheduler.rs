use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use adcadence_duration::{DurationSpec, format_duration};
use adcadence_gateway::{AdNetwork, CommandQueue};
use adcadence_worker::{Clock, TimerHandle, TokioClock};
use parking_lot::Mutex;

use crate::config::{positive_count, positive_period};
use crate::mechanism::{Mechanism, MechanismSet, Priority, parse_priority, select_enabled};
use crate::ticket::{RefreshTask, RefreshTicket};
use crate::{ConfigError, RefreshError, Result, SchedulerConfig};

/// Dedicated periodic timer for one slot.
struct SlotInterval<S> {
	period: Duration,
	timer: TimerHandle,
	/// Task handed out by a deferred registration, dispatched on the first tick.
	first: Option<RefreshTask<S>>,
}

struct State<S> {
	global_refresh: Option<Duration>,
	buffer_flush: Option<Duration>,
	barrier: Option<usize>,
	barrier_one_shot: bool,
	priorities: crate::Priorities,
	enabled: MechanismSet,
	refresh_timer: Option<TimerHandle>,
	flush_timer: Option<TimerHandle>,
	/// Buffered requests in arrival order. `None` entries are ghosts: requests
	/// already served by a timer whose positions still count toward a barrier.
	buffer: Vec<Option<RefreshTask<S>>>,
	slot_intervals: HashMap<S, SlotInterval<S>>,
	shut_down: bool,
}

impl<S> State<S> {
	fn has(&self, mechanism: Mechanism) -> bool {
		match mechanism {
			Mechanism::Refresh => self.global_refresh.is_some(),
			Mechanism::Interval => self.buffer_flush.is_some(),
			Mechanism::Barrier => self.barrier.is_some(),
		}
	}

	fn is_buffering(&self) -> bool {
		self.enabled.contains(Mechanism::Interval) || self.enabled.contains(Mechanism::Barrier)
	}

	/// Takes every real task out of the buffer. With the barrier enabled the
	/// buffer keeps its length as ghosts, otherwise it is emptied.
	fn vacate_buffer(&mut self) -> Vec<RefreshTask<S>> {
		if self.enabled.contains(Mechanism::Barrier) {
			self.buffer.iter_mut().filter_map(Option::take).collect()
		} else {
			mem::take(&mut self.buffer).into_iter().flatten().collect()
		}
	}

	/// Cancels every timer and drops every pending task.
	fn teardown(&mut self, clock: &dyn Clock) {
		self.shut_down = true;
		self.enabled = MechanismSet::default();
		for timer in [self.refresh_timer.take(), self.flush_timer.take()].into_iter().flatten() {
			clock.cancel(&timer);
		}
		for (_, interval) in self.slot_intervals.drain() {
			clock.cancel(&interval.timer);
		}
		self.buffer.clear();
	}
}

struct Inner<N: AdNetwork> {
	this: Weak<Inner<N>>,
	clock: Arc<dyn Clock>,
	gateway: CommandQueue<N>,
	state: Mutex<State<N::Slot>>,
}

impl<N: AdNetwork> Drop for Inner<N> {
	fn drop(&mut self) {
		self.state.get_mut().teardown(self.clock.as_ref());
	}
}

/// Decides when refresh requests for ad slots reach the ad network.
///
/// Cheap to clone; clones share one scheduler. Timers hold only weak
/// references, so the scheduler shuts down once the last handle is dropped.
pub struct RefreshScheduler<N: AdNetwork> {
	inner: Arc<Inner<N>>,
}

impl<N: AdNetwork> Clone for RefreshScheduler<N> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<N: AdNetwork> fmt::Debug for RefreshScheduler<N> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("RefreshScheduler")
			.field("global_refresh", &state.global_refresh)
			.field("buffer_flush", &state.buffer_flush)
			.field("barrier", &state.barrier)
			.field("enabled", &state.enabled)
			.field("buffered", &state.buffer.len())
			.field("slot_intervals", &state.slot_intervals.len())
			.field("shut_down", &state.shut_down)
			.finish()
	}
}

impl<N: AdNetwork> RefreshScheduler<N> {
	/// Creates a scheduler driven by tokio timers.
	pub fn new(config: &SchedulerConfig, gateway: CommandQueue<N>) -> std::result::Result<Self, ConfigError> {
		Self::with_clock(config, gateway, Arc::new(TokioClock::new()))
	}

	/// Creates a scheduler driven by `clock`.
	pub fn with_clock(config: &SchedulerConfig, gateway: CommandQueue<N>, clock: Arc<dyn Clock>) -> std::result::Result<Self, ConfigError> {
		let resolved = config.resolve()?;
		let state = State {
			global_refresh: resolved.global_refresh,
			buffer_flush: resolved.buffer_flush,
			barrier: resolved.barrier.map(|(count, _)| count),
			barrier_one_shot: resolved.barrier.is_none_or(|(_, one_shot)| one_shot),
			priorities: resolved.priorities,
			enabled: MechanismSet::default(),
			refresh_timer: None,
			flush_timer: None,
			buffer: Vec::new(),
			slot_intervals: HashMap::new(),
			shut_down: false,
		};

		let inner = Arc::new_cyclic(|this| Inner {
			this: this.clone(),
			clock,
			gateway,
			state: Mutex::new(state),
		});
		inner.prioritize(&mut inner.state.lock());

		Ok(Self { inner })
	}

	/// Requests a refresh of `slot`.
	///
	/// Without an `interval`, the request is dispatched now: sent straight to
	/// the gateway, or buffered while a buffering mechanism is enabled.
	///
	/// With an `interval`, the slot also gets a dedicated timer that requests
	/// a refresh on every tick. If `defer` is set, nothing is requested now and
	/// the returned ticket resolves with the first tick's dispatch.
	///
	/// Fails without changing any state when the interval is invalid, when the
	/// slot already has an interval, or after [`Self::shutdown`].
	pub fn schedule_refresh(&self, slot: N::Slot, interval: Option<DurationSpec>, defer: bool) -> Result<RefreshTicket> {
		let period = interval.as_ref().map(|spec| positive_period(spec, "slot refresh interval")).transpose()?;

		let mut state = self.inner.state.lock();
		if state.shut_down {
			return Err(RefreshError::ShutDown);
		}

		let (task, ticket) = RefreshTask::new(slot.clone());
		let Some(period) = period else {
			self.inner.dispatch_one(&mut state, task);
			return Ok(ticket);
		};

		if let Some(existing) = state.slot_intervals.get(&slot) {
			return Err(RefreshError::InvalidOperation(format!(
				"slot {slot:?} already refreshes every {}; cancel that interval first",
				format_duration(existing.period)
			)));
		}

		tracing::debug!(slot = ?slot, period = %format_duration(period), defer, "refresh.slot_interval.add");
		let timer = self.inner.start_slot_timer(slot.clone(), period);
		if defer {
			state.slot_intervals.insert(slot, SlotInterval { period, timer, first: Some(task) });
		} else {
			state.slot_intervals.insert(slot, SlotInterval { period, timer, first: None });
			self.inner.dispatch_one(&mut state, task);
		}
		Ok(ticket)
	}

	/// Requests a single refresh of `slot`.
	pub fn refresh(&self, slot: N::Slot) -> Result<RefreshTicket> {
		self.schedule_refresh(slot, None, false)
	}

	/// Cancels the dedicated timer of `slot`.
	///
	/// Requests already dispatched or buffered are unaffected. The ticket of a
	/// deferred registration whose first tick has not happened yet resolves
	/// with [`RefreshError::Cancelled`].
	pub fn cancel_slot_interval(&self, slot: &N::Slot) -> Result<()> {
		let mut state = self.inner.state.lock();
		let Some(interval) = state.slot_intervals.remove(slot) else {
			return Err(RefreshError::NoInterval(format!("{slot:?}")));
		};
		self.inner.clock.cancel(&interval.timer);
		tracing::debug!(slot = ?slot, "refresh.slot_interval.cancel");
		Ok(())
	}

	/// Returns true if `slot` has a dedicated timer.
	pub fn has_slot_interval(&self, slot: &N::Slot) -> bool {
		self.inner.state.lock().slot_intervals.contains_key(slot)
	}

	/// Returns the period of the dedicated timer of `slot`.
	pub fn slot_interval(&self, slot: &N::Slot) -> Option<Duration> {
		self.inner.state.lock().slot_intervals.get(slot).map(|interval| interval.period)
	}

	/// Installs (or changes) the buffer flush interval.
	pub fn set_buffer_flush_interval(&self, period: impl Into<DurationSpec>) -> std::result::Result<(), ConfigError> {
		let period = positive_period(&period.into(), "buffer flush interval")?;
		let mut state = self.inner.state.lock();
		state.buffer_flush = Some(period);
		// Restart a running timer on the new period.
		self.inner.disable(&mut state, Mechanism::Interval);
		self.inner.prioritize(&mut state);
		Ok(())
	}

	/// Uninstalls the buffer flush interval. Warns if none was set.
	pub fn clear_buffer_flush_interval(&self) {
		let mut state = self.inner.state.lock();
		if state.buffer_flush.take().is_none() {
			tracing::warn!("clear_buffer_flush_interval had no effect because no interval was set");
			return;
		}
		self.inner.prioritize(&mut state);
	}

	/// The installed buffer flush interval, enabled or not.
	pub fn buffer_flush_interval(&self) -> Option<Duration> {
		self.inner.state.lock().buffer_flush
	}

	/// Returns true if a buffer flush interval is installed.
	pub fn has_buffer_flush_interval(&self) -> bool {
		self.has(Mechanism::Interval)
	}

	/// Returns true if the buffer flush timer is running.
	pub fn buffer_flush_is_enabled(&self) -> bool {
		self.is_enabled(Mechanism::Interval)
	}

	/// Installs a buffer barrier of `count` requests.
	///
	/// A one-shot barrier uninstalls itself after its first flush; otherwise
	/// it stays until [`Self::clear_buffer_barrier`].
	pub fn set_buffer_barrier(&self, count: usize, one_shot: bool) -> std::result::Result<(), ConfigError> {
		let count = positive_count(count)?;
		let mut state = self.inner.state.lock();
		state.barrier = Some(count);
		state.barrier_one_shot = one_shot;
		self.inner.prioritize(&mut state);
		Ok(())
	}

	/// Uninstalls the buffer barrier. Warns if none was set.
	pub fn clear_buffer_barrier(&self) {
		let mut state = self.inner.state.lock();
		if !self.inner.clear_barrier(&mut state) {
			tracing::warn!("clear_buffer_barrier had no effect because no barrier was set");
		}
	}

	/// The installed barrier count, enabled or not.
	pub fn buffer_barrier(&self) -> Option<usize> {
		self.inner.state.lock().barrier
	}

	/// Returns true if a buffer barrier is installed.
	pub fn has_buffer_barrier(&self) -> bool {
		self.has(Mechanism::Barrier)
	}

	/// Returns true if the buffer barrier is enabled.
	pub fn barrier_is_enabled(&self) -> bool {
		self.is_enabled(Mechanism::Barrier)
	}

	/// Returns true if the barrier uninstalls itself after its first flush.
	pub fn barrier_is_one_shot(&self) -> bool {
		self.inner.state.lock().barrier_one_shot
	}

	/// Installs (or changes) the global refresh interval.
	pub fn set_global_refresh_interval(&self, period: impl Into<DurationSpec>) -> std::result::Result<(), ConfigError> {
		let period = positive_period(&period.into(), "global refresh interval")?;
		let mut state = self.inner.state.lock();
		state.global_refresh = Some(period);
		self.inner.disable(&mut state, Mechanism::Refresh);
		self.inner.prioritize(&mut state);
		Ok(())
	}

	/// Uninstalls the global refresh interval. Warns if none was set.
	pub fn clear_global_refresh_interval(&self) {
		let mut state = self.inner.state.lock();
		if state.global_refresh.take().is_none() {
			tracing::warn!("clear_global_refresh_interval had no effect because no interval was set");
			return;
		}
		self.inner.prioritize(&mut state);
	}

	/// The installed global refresh interval, enabled or not.
	pub fn global_refresh_interval(&self) -> Option<Duration> {
		self.inner.state.lock().global_refresh
	}

	/// Returns true if a global refresh interval is installed.
	pub fn has_global_refresh_interval(&self) -> bool {
		self.has(Mechanism::Refresh)
	}

	/// Returns true if the global refresh timer is running.
	pub fn global_refresh_is_enabled(&self) -> bool {
		self.is_enabled(Mechanism::Refresh)
	}

	/// Returns true while requests are buffered instead of sent right away.
	pub fn is_buffering(&self) -> bool {
		self.inner.state.lock().is_buffering()
	}

	/// Returns true if `mechanism` is installed. Installed mechanisms may
	/// still be disabled by a higher priority elsewhere.
	pub fn has(&self, mechanism: Mechanism) -> bool {
		self.inner.state.lock().has(mechanism)
	}

	/// Returns true if `mechanism` is installed and won prioritization.
	pub fn is_enabled(&self, mechanism: Mechanism) -> bool {
		self.inner.state.lock().enabled.contains(mechanism)
	}

	/// Sets the priority of `mechanism` and re-runs prioritization.
	pub fn set_priority(&self, mechanism: Mechanism, priority: Priority) {
		let mut state = self.inner.state.lock();
		state.priorities.set(mechanism, priority);
		self.inner.prioritize(&mut state);
	}

	/// Returns the priority of `mechanism`.
	pub fn priority(&self, mechanism: Mechanism) -> Priority {
		self.inner.state.lock().priorities.get(mechanism)
	}

	/// [`Self::set_priority`] for textual input. Nothing changes unless both
	/// the mechanism name and the priority parse.
	pub fn set_priority_by_name(&self, mechanism: &str, priority: &str) -> std::result::Result<(), ConfigError> {
		let mechanism: Mechanism = mechanism.parse()?;
		let priority = parse_priority(priority)?;
		self.set_priority(mechanism, priority);
		Ok(())
	}

	/// [`Self::priority`] for a textual mechanism name.
	pub fn priority_by_name(&self, mechanism: &str) -> std::result::Result<Priority, ConfigError> {
		Ok(self.priority(mechanism.parse()?))
	}

	/// Number of buffer entries, ghosts included.
	pub fn buffer_len(&self) -> usize {
		self.inner.state.lock().buffer.len()
	}

	/// The gateway this scheduler dispatches through.
	pub fn gateway(&self) -> &CommandQueue<N> {
		&self.inner.gateway
	}

	/// Cancels every timer and drops every request that has not been
	/// dispatched; their tickets resolve with [`RefreshError::Cancelled`].
	/// Later calls to [`Self::schedule_refresh`] fail with
	/// [`RefreshError::ShutDown`].
	pub fn shutdown(&self) {
		let mut state = self.inner.state.lock();
		if state.shut_down {
			return;
		}
		tracing::debug!(
			buffered = state.buffer.len(),
			slot_intervals = state.slot_intervals.len(),
			"refresh.shutdown"
		);
		state.teardown(self.inner.clock.as_ref());
	}

	/// Returns true after [`Self::shutdown`].
	pub fn is_shut_down(&self) -> bool {
		self.inner.state.lock().shut_down
	}
}

impl<N: AdNetwork> Inner<N> {
	/// Sends `task` to the gateway, or buffers it while buffering is enabled.
	fn dispatch_one(&self, state: &mut State<N::Slot>, task: RefreshTask<N::Slot>) {
		if !state.is_buffering() {
			self.send(vec![task]);
			return;
		}

		tracing::trace!(slot = ?task.slot(), buffered = state.buffer.len() + 1, "refresh.buffer.push");
		state.buffer.push(Some(task));

		if !state.enabled.contains(Mechanism::Barrier) {
			return;
		}
		let Some(count) = state.barrier else {
			return;
		};
		if state.buffer.len() >= count {
			tracing::debug!(barrier = count, one_shot = state.barrier_one_shot, "refresh.barrier.reached");
			let buffer = mem::take(&mut state.buffer);
			self.send(buffer.into_iter().flatten().collect());
			if state.barrier_one_shot {
				self.clear_barrier(state);
			}
		}
	}

	/// Uninstalls the barrier. Returns false if none was installed.
	fn clear_barrier(&self, state: &mut State<N::Slot>) -> bool {
		if state.barrier.take().is_none() {
			return false;
		}
		self.prioritize(state);
		true
	}

	/// Enqueues one refresh command for `tasks`, resolving them in order once
	/// it has run.
	fn send(&self, tasks: Vec<RefreshTask<N::Slot>>) {
		if tasks.is_empty() {
			return;
		}
		let slots: Vec<N::Slot> = tasks.iter().map(|task| task.slot().clone()).collect();
		tracing::debug!(slots = slots.len(), "refresh.dispatch");

		let enqueued = self.gateway.enqueue(move |network: &N| {
			network.refresh_slots(&slots);
			for task in tasks {
				task.resolve();
			}
		});
		if let Err(err) = enqueued {
			tracing::warn!(error = %err, "refresh.dispatch.rejected");
		}
	}

	/// Enqueues a refresh of every slot. `served` are buffered tasks whose
	/// slots this refresh covers.
	fn send_all(&self, served: Vec<RefreshTask<N::Slot>>) {
		tracing::debug!(served = served.len(), "refresh.dispatch.all");
		let enqueued = self.gateway.enqueue(move |network: &N| {
			network.refresh_all();
			for task in served {
				task.resolve();
			}
		});
		if let Err(err) = enqueued {
			tracing::warn!(error = %err, "refresh.dispatch.rejected");
		}
	}

	/// Enables the installed mechanisms with the highest priority and disables
	/// the rest.
	fn prioritize(&self, state: &mut State<N::Slot>) {
		let selected = if state.shut_down {
			MechanismSet::default()
		} else {
			select_enabled(|m| state.has(m), &state.priorities)
		};
		if selected.is_empty() && !state.shut_down {
			tracing::trace!("refresh.prioritize.none");
		}

		for mechanism in Mechanism::ALL {
			if selected.contains(mechanism) {
				self.enable(state, mechanism);
			} else {
				self.disable(state, mechanism);
			}
		}

		// Nothing would ever flush what is left once buffering stops.
		if !state.is_buffering() && !state.buffer.is_empty() {
			let stranded: Vec<_> = mem::take(&mut state.buffer).into_iter().flatten().collect();
			tracing::debug!(stranded = stranded.len(), "refresh.buffer.release");
			self.send(stranded);
		}
	}

	fn enable(&self, state: &mut State<N::Slot>, mechanism: Mechanism) {
		if state.enabled.contains(mechanism) {
			return;
		}
		match mechanism {
			Mechanism::Refresh => {
				let Some(period) = state.global_refresh else {
					return;
				};
				state.refresh_timer = Some(self.start_timer(period, Inner::on_global_refresh_tick));
			}
			Mechanism::Interval => {
				let Some(period) = state.buffer_flush else {
					return;
				};
				state.flush_timer = Some(self.start_timer(period, Inner::on_buffer_flush_tick));
			}
			Mechanism::Barrier => {}
		}
		state.enabled.insert(mechanism);
		tracing::debug!(mechanism = %mechanism, "refresh.mechanism.enabled");
	}

	fn disable(&self, state: &mut State<N::Slot>, mechanism: Mechanism) {
		if !state.enabled.contains(mechanism) {
			return;
		}
		let timer = match mechanism {
			Mechanism::Refresh => state.refresh_timer.take(),
			Mechanism::Interval => state.flush_timer.take(),
			Mechanism::Barrier => None,
		};
		if let Some(timer) = timer {
			self.clock.cancel(&timer);
		}
		state.enabled.remove(mechanism);
		tracing::debug!(mechanism = %mechanism, "refresh.mechanism.disabled");
	}

	fn start_timer(&self, period: Duration, on_tick: fn(&Inner<N>)) -> TimerHandle {
		let this = self.this.clone();
		self.clock.every(
			period,
			Box::new(move || {
				if let Some(inner) = this.upgrade() {
					on_tick(&inner);
				}
			}),
		)
	}

	fn start_slot_timer(&self, slot: N::Slot, period: Duration) -> TimerHandle {
		let this = self.this.clone();
		self.clock.every(
			period,
			Box::new(move || {
				if let Some(inner) = this.upgrade() {
					inner.on_slot_tick(&slot);
				}
			}),
		)
	}

	fn on_global_refresh_tick(&self) {
		let mut state = self.state.lock();
		if !state.enabled.contains(Mechanism::Refresh) {
			return;
		}
		let served = state.vacate_buffer();
		tracing::debug!(served = served.len(), buffered = state.buffer.len(), "refresh.global.tick");
		self.send_all(served);
	}

	fn on_buffer_flush_tick(&self) {
		let mut state = self.state.lock();
		if !state.enabled.contains(Mechanism::Interval) {
			return;
		}
		let tasks = state.vacate_buffer();
		tracing::trace!(flushed = tasks.len(), buffered = state.buffer.len(), "refresh.buffer.flush");
		self.send(tasks);
	}

	fn on_slot_tick(&self, slot: &N::Slot) {
		let mut state = self.state.lock();
		let Some(interval) = state.slot_intervals.get_mut(slot) else {
			return;
		};
		let task = interval.first.take().unwrap_or_else(|| RefreshTask::detached(slot.clone()));
		tracing::trace!(slot = ?slot, "refresh.slot_interval.tick");
		self.dispatch_one(&mut state, task);
	}
}
