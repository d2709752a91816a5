use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One of the three competing refresh-triggering policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
	/// Periodic refresh of every slot on the page.
	Refresh,
	/// Periodic flush of the request buffer.
	Interval,
	/// Flush of the request buffer once enough requests have arrived.
	Barrier,
}

impl Mechanism {
	/// All mechanisms, in prioritization order.
	pub const ALL: [Self; 3] = [Self::Refresh, Self::Interval, Self::Barrier];

	/// Lowercase name, as accepted by [`Mechanism::from_str`].
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Refresh => "refresh",
			Self::Interval => "interval",
			Self::Barrier => "barrier",
		}
	}

	const fn index(self) -> usize {
		match self {
			Self::Refresh => 0,
			Self::Interval => 1,
			Self::Barrier => 2,
		}
	}
}

impl fmt::Display for Mechanism {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Mechanism {
	type Err = ConfigError;

	/// Parses a mechanism name, ignoring ASCII case.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| ConfigError::InvalidMechanism(s.to_owned()))
	}
}

/// Mechanism priority. Higher wins; ties enable every tied mechanism.
pub type Priority = i32;

/// Parses a priority given as text.
pub fn parse_priority(raw: &str) -> Result<Priority, ConfigError> {
	raw.trim().parse().map_err(|_| ConfigError::InvalidPriority(raw.to_owned()))
}

/// Per-mechanism priorities. Every mechanism defaults to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Priorities {
	/// Priority of the global refresh timer.
	pub refresh: Priority,
	/// Priority of the buffer flush timer.
	pub interval: Priority,
	/// Priority of the buffer barrier.
	pub barrier: Priority,
}

impl Default for Priorities {
	fn default() -> Self {
		Self {
			refresh: 1,
			interval: 1,
			barrier: 1,
		}
	}
}

impl Priorities {
	/// Returns the priority of `mechanism`.
	pub const fn get(&self, mechanism: Mechanism) -> Priority {
		match mechanism {
			Mechanism::Refresh => self.refresh,
			Mechanism::Interval => self.interval,
			Mechanism::Barrier => self.barrier,
		}
	}

	/// Sets the priority of `mechanism`.
	pub fn set(&mut self, mechanism: Mechanism, priority: Priority) {
		match mechanism {
			Mechanism::Refresh => self.refresh = priority,
			Mechanism::Interval => self.interval = priority,
			Mechanism::Barrier => self.barrier = priority,
		}
	}
}

/// Set of mechanisms.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MechanismSet([bool; 3]);

impl MechanismSet {
	pub(crate) const fn contains(&self, mechanism: Mechanism) -> bool {
		self.0[mechanism.index()]
	}

	pub(crate) fn insert(&mut self, mechanism: Mechanism) {
		self.0[mechanism.index()] = true;
	}

	pub(crate) fn remove(&mut self, mechanism: Mechanism) {
		self.0[mechanism.index()] = false;
	}

	pub(crate) fn is_empty(&self) -> bool {
		!self.0.iter().any(|on| *on)
	}
}

impl FromIterator<Mechanism> for MechanismSet {
	fn from_iter<I: IntoIterator<Item = Mechanism>>(iter: I) -> Self {
		let mut set = Self::default();
		for mechanism in iter {
			set.insert(mechanism);
		}
		set
	}
}

/// Picks the mechanisms to enable: every installed mechanism whose priority
/// equals the maximum priority among installed mechanisms.
pub(crate) fn select_enabled(installed: impl Fn(Mechanism) -> bool, priorities: &Priorities) -> MechanismSet {
	let available: Vec<Mechanism> = Mechanism::ALL.into_iter().filter(|m| installed(*m)).collect();
	let Some(maximum) = available.iter().map(|m| priorities.get(*m)).max() else {
		return MechanismSet::default();
	};
	available.into_iter().filter(|m| priorities.get(*m) == maximum).collect()
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;
	use super::Mechanism::{Barrier, Interval, Refresh};

	fn select(installed: &[Mechanism], (refresh, interval, barrier): (Priority, Priority, Priority)) -> Vec<Mechanism> {
		let priorities = Priorities { refresh, interval, barrier };
		let set = select_enabled(|m| installed.contains(&m), &priorities);
		Mechanism::ALL.into_iter().filter(|m| set.contains(*m)).collect()
	}

	#[rstest]
	#[case(&[Refresh, Interval, Barrier], (1, 1, 1), &[Refresh, Interval, Barrier])]
	#[case(&[Refresh, Interval, Barrier], (2, 1, 1), &[Refresh])]
	#[case(&[Refresh, Interval, Barrier], (1, 3, 3), &[Interval, Barrier])]
	#[case(&[Refresh, Barrier], (1, 9, 1), &[Refresh, Barrier])]
	#[case(&[Interval], (5, -2, 5), &[Interval])]
	#[case(&[Refresh, Interval], (-1, -3, 0), &[Refresh])]
	#[case(&[], (1, 1, 1), &[])]
	fn enables_installed_mechanisms_at_max_priority(
		#[case] installed: &[Mechanism],
		#[case] priorities: (Priority, Priority, Priority),
		#[case] expected: &[Mechanism],
	) {
		assert_eq!(select(installed, priorities), expected);
	}

	#[test]
	fn empty_selection_is_empty_set() {
		assert!(select_enabled(|_| false, &Priorities::default()).is_empty());
	}

	#[rstest]
	#[case("refresh", Refresh)]
	#[case("INTERVAL", Interval)]
	#[case(" Barrier ", Barrier)]
	fn parses_mechanism_names(#[case] raw: &str, #[case] expected: Mechanism) {
		assert_eq!(raw.parse::<Mechanism>().ok(), Some(expected));
	}

	#[test]
	fn rejects_unknown_mechanism() {
		let err = "buffer".parse::<Mechanism>().expect_err("unknown tag");
		assert!(matches!(err, ConfigError::InvalidMechanism(ref tag) if tag == "buffer"));
	}

	#[test]
	fn priority_must_be_numeric() {
		assert_eq!(parse_priority(" -4 ").ok(), Some(-4));
		assert!(matches!(parse_priority("high"), Err(ConfigError::InvalidPriority(_))));
		assert!(matches!(parse_priority("1.5"), Err(ConfigError::InvalidPriority(_))));
	}
}
