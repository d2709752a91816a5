/// Execution classes used for spawn logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Timer loops driving periodic or delayed callbacks.
	Timer,
	/// Command drain loops handing work to the ad network.
	Dispatch,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Timer => "timer",
			Self::Dispatch => "dispatch",
		}
	}
}
