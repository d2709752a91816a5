//! Human-readable durations for refresh intervals.
//!
//! A duration is either a bare number of milliseconds or a string of the form
//! `<int>` / `<int>(ms|s|min|h)`, e.g. `"1500"`, `"2s"`, `"5min"`, `"1h"`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;

pub use error::{DurationError, Result};

/// A duration as written by a user: raw milliseconds or a unit string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationSpec {
	/// Milliseconds.
	Millis(u64),
	/// Unparsed text such as `"2s"`.
	Text(String),
}

impl DurationSpec {
	/// Parses into a [`Duration`].
	pub fn to_duration(&self) -> Result<Duration> {
		parse(self)
	}
}

impl fmt::Display for DurationSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Millis(ms) => write!(f, "{ms}"),
			Self::Text(text) => f.write_str(text),
		}
	}
}

impl From<u64> for DurationSpec {
	fn from(ms: u64) -> Self {
		Self::Millis(ms)
	}
}

impl From<&str> for DurationSpec {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

impl From<String> for DurationSpec {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}

impl From<Duration> for DurationSpec {
	fn from(duration: Duration) -> Self {
		Self::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
	Millis,
	Seconds,
	Minutes,
	Hours,
}

impl Unit {
	fn from_suffix(suffix: &str) -> Option<Self> {
		match suffix {
			"" | "ms" => Some(Self::Millis),
			"s" => Some(Self::Seconds),
			"min" => Some(Self::Minutes),
			"h" => Some(Self::Hours),
			_ => None,
		}
	}

	const fn millis(self) -> u64 {
		match self {
			Self::Millis => 1,
			Self::Seconds => 1_000,
			Self::Minutes => 60 * 1_000,
			Self::Hours => 60 * 60 * 1_000,
		}
	}
}

/// Parses a [`DurationSpec`].
pub fn parse(spec: &DurationSpec) -> Result<Duration> {
	match spec {
		DurationSpec::Millis(ms) => Ok(Duration::from_millis(*ms)),
		DurationSpec::Text(text) => parse_str(text),
	}
}

/// Parses a duration string. Surrounding whitespace is ignored; anything else
/// outside `<int>(ms|s|min|h)?` is rejected.
pub fn parse_str(input: &str) -> Result<Duration> {
	let trimmed = input.trim();
	let split = trimmed.find(|c: char| !c.is_ascii_digit()).unwrap_or(trimmed.len());
	let (digits, suffix) = trimmed.split_at(split);
	if digits.is_empty() {
		return Err(DurationError::InvalidFormat(input.to_owned()));
	}

	let unit = Unit::from_suffix(suffix).ok_or_else(|| DurationError::InvalidFormat(input.to_owned()))?;
	// All-digit input only fails to parse on overflow.
	let value: u64 = digits.parse().map_err(|_| DurationError::Overflow(input.to_owned()))?;

	value
		.checked_mul(unit.millis())
		.map(Duration::from_millis)
		.ok_or_else(|| DurationError::Overflow(input.to_owned()))
}

/// Formats a duration using the largest unit that represents it exactly.
///
/// Sub-millisecond precision is dropped.
pub fn format_duration(duration: Duration) -> String {
	let ms = duration.as_millis();
	if ms == 0 {
		return "0ms".to_owned();
	}
	for unit in [Unit::Hours, Unit::Minutes, Unit::Seconds] {
		let per = u128::from(unit.millis());
		if ms % per == 0 {
			let suffix = match unit {
				Unit::Hours => "h",
				Unit::Minutes => "min",
				_ => "s",
			};
			return format!("{}{suffix}", ms / per);
		}
	}
	format!("{ms}ms")
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case("1500", 1_500)]
	#[case("250ms", 250)]
	#[case("2s", 2_000)]
	#[case("5min", 300_000)]
	#[case("1h", 3_600_000)]
	#[case("  3s ", 3_000)]
	#[case("0", 0)]
	fn parses_valid_strings(#[case] input: &str, #[case] expected_ms: u64) {
		assert_eq!(parse_str(input), Ok(Duration::from_millis(expected_ms)));
	}

	#[rstest]
	#[case("")]
	#[case("s")]
	#[case("2 s")]
	#[case("2sec")]
	#[case("abc5s")]
	#[case("5s later")]
	#[case("-5s")]
	#[case("1.5s")]
	fn rejects_malformed_strings(#[case] input: &str) {
		assert_eq!(parse_str(input), Err(DurationError::InvalidFormat(input.to_owned())));
	}

	#[test]
	fn overflow_is_reported() {
		let huge = "99999999999999999999";
		assert_eq!(parse_str(huge), Err(DurationError::Overflow(huge.to_owned())));

		let scaled = format!("{}h", u64::MAX / 1_000);
		assert!(matches!(parse_str(&scaled), Err(DurationError::Overflow(_))));
	}

	#[test]
	fn numeric_spec_is_milliseconds() {
		assert_eq!(parse(&DurationSpec::from(42u64)), Ok(Duration::from_millis(42)));
		assert_eq!(DurationSpec::from(Duration::from_secs(2)), DurationSpec::Millis(2_000));
	}

	#[test]
	fn deserializes_number_or_string() {
		#[derive(Deserialize)]
		struct Doc {
			a: DurationSpec,
			b: DurationSpec,
		}

		let doc: Doc = toml::from_str("a = 750\nb = \"2min\"").expect("valid toml");
		assert_eq!(doc.a, DurationSpec::Millis(750));
		assert_eq!(doc.b, DurationSpec::Text("2min".into()));
		assert_eq!(doc.b.to_duration(), Ok(Duration::from_secs(120)));
	}

	#[rstest]
	#[case(Duration::ZERO, "0ms")]
	#[case(Duration::from_millis(1_500), "1500ms")]
	#[case(Duration::from_secs(90), "90s")]
	#[case(Duration::from_secs(120), "2min")]
	#[case(Duration::from_secs(3_600), "1h")]
	fn formats_largest_exact_unit(#[case] duration: Duration, #[case] expected: &str) {
		assert_eq!(format_duration(duration), expected);
	}
}
