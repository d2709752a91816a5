use std::fmt;
use std::hash::Hash;

/// The ad network library the scheduler refreshes slots through.
///
/// Implementations only issue the refresh calls. Whether an ad is actually
/// fetched or rendered afterwards is outside the scheduler's view.
pub trait AdNetwork: Send + Sync + 'static {
	/// Opaque handle for one ad placement.
	type Slot: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

	/// Refreshes the given slots in one request.
	fn refresh_slots(&self, slots: &[Self::Slot]);

	/// Refreshes every slot known to the network.
	fn refresh_all(&self);
}
