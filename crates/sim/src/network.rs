use std::sync::atomic::{AtomicUsize, Ordering};

use adcadence_refresh::AdNetwork;
use tracing::info;

/// Ad network stand-in that logs and counts every call.
#[derive(Debug, Default)]
pub struct LogNetwork {
	slot_calls: AtomicUsize,
	slots_refreshed: AtomicUsize,
	page_refreshes: AtomicUsize,
}

/// Call counts of a [`LogNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStats {
	pub slot_calls: usize,
	pub slots_refreshed: usize,
	pub page_refreshes: usize,
}

impl LogNetwork {
	pub fn stats(&self) -> NetworkStats {
		NetworkStats {
			slot_calls: self.slot_calls.load(Ordering::Acquire),
			slots_refreshed: self.slots_refreshed.load(Ordering::Acquire),
			page_refreshes: self.page_refreshes.load(Ordering::Acquire),
		}
	}
}

impl AdNetwork for LogNetwork {
	type Slot = String;

	fn refresh_slots(&self, slots: &[Self::Slot]) {
		self.slot_calls.fetch_add(1, Ordering::AcqRel);
		self.slots_refreshed.fetch_add(slots.len(), Ordering::AcqRel);
		info!(?slots, "sim.network.refresh");
	}

	fn refresh_all(&self) {
		self.page_refreshes.fetch_add(1, Ordering::AcqRel);
		info!("sim.network.refresh_all");
	}
}
