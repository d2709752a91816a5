use thiserror::Error;

/// Errors produced while parsing a duration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
	/// The string is neither `<int>` nor `<int>(ms|s|min|h)`.
	#[error("invalid duration '{0}' (expected <int> or <int>(ms|s|min|h))")]
	InvalidFormat(String),

	/// The value does not fit in 64-bit milliseconds.
	#[error("duration '{0}' is too large")]
	Overflow(String),
}

/// Result type for duration parsing.
pub type Result<T> = std::result::Result<T, DurationError>;
