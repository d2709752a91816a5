use std::path::Path;
use std::time::Duration;

use adcadence_duration::DurationSpec;
use serde::{Deserialize, Serialize};

use crate::mechanism::{Mechanism, Priorities, Priority};
use crate::ConfigError;

/// Scheduler configuration, usually loaded from TOML:
///
/// ```toml
/// global_refresh = "1h"
/// buffer_flush = "1s"
///
/// [barrier]
/// count = 3
/// one_shot = true
///
/// [priority]
/// refresh = 1
/// interval = 1
/// barrier = 1
/// ```
///
/// Every field is optional. An absent mechanism is not installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
	/// Period of the global refresh of every slot.
	pub global_refresh: Option<DurationSpec>,
	/// Period of the buffer flush timer.
	pub buffer_flush: Option<DurationSpec>,
	/// Count-based buffer barrier.
	pub barrier: Option<BarrierConfig>,
	/// Mechanism priorities.
	pub priority: Priorities,
}

/// Count-based buffer barrier settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BarrierConfig {
	/// Number of buffered requests that triggers a flush.
	pub count: usize,
	/// Uninstall the barrier after its first flush.
	#[serde(default = "one_shot_default")]
	pub one_shot: bool,
}

const fn one_shot_default() -> bool {
	true
}

impl SchedulerConfig {
	/// The defaults of the browser ad library: buffered requests are flushed
	/// every second and the whole page is refreshed every hour.
	pub fn page_defaults() -> Self {
		Self {
			global_refresh: Some(DurationSpec::from("1h")),
			buffer_flush: Some(DurationSpec::from("1s")),
			barrier: None,
			priority: Priorities::default(),
		}
	}

	/// Parses a TOML document.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&text)
	}

	/// Sets the global refresh period.
	#[must_use]
	pub fn with_global_refresh(mut self, period: impl Into<DurationSpec>) -> Self {
		self.global_refresh = Some(period.into());
		self
	}

	/// Sets the buffer flush period.
	#[must_use]
	pub fn with_buffer_flush(mut self, period: impl Into<DurationSpec>) -> Self {
		self.buffer_flush = Some(period.into());
		self
	}

	/// Installs a buffer barrier.
	#[must_use]
	pub fn with_barrier(mut self, count: usize, one_shot: bool) -> Self {
		self.barrier = Some(BarrierConfig { count, one_shot });
		self
	}

	/// Sets the priority of one mechanism.
	#[must_use]
	pub fn with_priority(mut self, mechanism: Mechanism, priority: Priority) -> Self {
		self.priority.set(mechanism, priority);
		self
	}

	/// Parses durations and checks value ranges.
	pub(crate) fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
		let global_refresh = self
			.global_refresh
			.as_ref()
			.map(|spec| positive_period(spec, "global refresh interval"))
			.transpose()?;
		let buffer_flush = self
			.buffer_flush
			.as_ref()
			.map(|spec| positive_period(spec, "buffer flush interval"))
			.transpose()?;
		let barrier = self.barrier.map(|b| positive_count(b.count).map(|count| (count, b.one_shot))).transpose()?;

		Ok(ResolvedConfig {
			global_refresh,
			buffer_flush,
			barrier,
			priorities: self.priority,
		})
	}
}

/// [`SchedulerConfig`] with parsed durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedConfig {
	pub global_refresh: Option<Duration>,
	pub buffer_flush: Option<Duration>,
	pub barrier: Option<(usize, bool)>,
	pub priorities: Priorities,
}

pub(crate) fn positive_period(spec: &DurationSpec, what: &'static str) -> Result<Duration, ConfigError> {
	let period = spec.to_duration()?;
	if period.is_zero() {
		return Err(ConfigError::Zero(what));
	}
	Ok(period)
}

pub(crate) fn positive_count(count: usize) -> Result<usize, ConfigError> {
	if count == 0 {
		return Err(ConfigError::Zero("buffer barrier count"));
	}
	Ok(count)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_full_document() {
		let config = SchedulerConfig::from_toml_str(
			r#"
			global_refresh = "1h"
			buffer_flush = 500

			[barrier]
			count = 3

			[priority]
			refresh = 2
			"#,
		)
		.expect("valid config");

		assert_eq!(config.global_refresh, Some(DurationSpec::from("1h")));
		assert_eq!(config.buffer_flush, Some(DurationSpec::Millis(500)));
		assert_eq!(config.barrier, Some(BarrierConfig { count: 3, one_shot: true }));
		assert_eq!(config.priority, Priorities {
			refresh: 2,
			interval: 1,
			barrier: 1
		});

		let resolved = config.resolve().expect("valid values");
		assert_eq!(resolved.global_refresh, Some(Duration::from_secs(3_600)));
		assert_eq!(resolved.buffer_flush, Some(Duration::from_millis(500)));
		assert_eq!(resolved.barrier, Some((3, true)));
	}

	#[test]
	fn empty_document_installs_nothing() {
		let config = SchedulerConfig::from_toml_str("").expect("valid config");
		assert_eq!(config, SchedulerConfig::default());
		let resolved = config.resolve().expect("valid values");
		assert_eq!(resolved.global_refresh, None);
		assert_eq!(resolved.buffer_flush, None);
		assert_eq!(resolved.barrier, None);
	}

	#[test]
	fn rejects_unknown_keys() {
		assert!(matches!(SchedulerConfig::from_toml_str("refresh_all = true"), Err(ConfigError::Toml(_))));
		assert!(matches!(SchedulerConfig::from_toml_str("[priority]\nbuffer = 2"), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn rejects_non_numeric_priority() {
		assert!(matches!(SchedulerConfig::from_toml_str("[priority]\nrefresh = \"high\""), Err(ConfigError::Toml(_))));
	}

	#[test]
	fn resolve_rejects_bad_values() {
		let bad_duration = SchedulerConfig::default().with_buffer_flush("soon");
		assert!(matches!(bad_duration.resolve(), Err(ConfigError::Duration(_))));

		let zero_period = SchedulerConfig::default().with_global_refresh(0u64);
		assert!(matches!(zero_period.resolve(), Err(ConfigError::Zero(_))));

		let zero_barrier = SchedulerConfig::default().with_barrier(0, true);
		assert!(matches!(zero_barrier.resolve(), Err(ConfigError::Zero(_))));
	}

	#[test]
	fn page_defaults_flush_every_second_and_refresh_hourly() {
		let resolved = SchedulerConfig::page_defaults().resolve().expect("valid defaults");
		assert_eq!(resolved.buffer_flush, Some(Duration::from_secs(1)));
		assert_eq!(resolved.global_refresh, Some(Duration::from_secs(3_600)));
		assert_eq!(resolved.barrier, None);
	}

	#[test]
	fn load_reports_missing_file_path() {
		let path = Path::new("/definitely/not/here/adcadence.toml");
		match SchedulerConfig::load(path) {
			Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
			other => panic!("expected Io error, got {other:?}"),
		}
	}
}
