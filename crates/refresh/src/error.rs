use std::path::PathBuf;

use adcadence_duration::DurationError;
use thiserror::Error;

/// Invalid scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The mechanism name is not one of `refresh`, `interval` or `barrier`.
	#[error("invalid mechanism '{0}' (expected refresh, interval or barrier)")]
	InvalidMechanism(String),

	/// The priority is not an integer.
	#[error("priority '{0}' is not a number")]
	InvalidPriority(String),

	/// A duration could not be parsed.
	#[error(transparent)]
	Duration(#[from] DurationError),

	/// A period or count that must be positive was zero.
	#[error("{0} must be greater than zero")]
	Zero(&'static str),

	/// The configuration file is not valid TOML for [`crate::SchedulerConfig`].
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},
}

/// Errors returned by [`crate::RefreshScheduler`] operations and tickets.
#[derive(Debug, Error)]
pub enum RefreshError {
	/// Invalid configuration value.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The slot has no dedicated refresh interval.
	#[error("no refresh interval registered for slot {0}")]
	NoInterval(String),

	/// The call conflicts with existing scheduler state.
	#[error("invalid operation: {0}")]
	InvalidOperation(String),

	/// The refresh was dropped before it reached the ad network.
	#[error("refresh cancelled before dispatch")]
	Cancelled,

	/// The scheduler has been shut down.
	#[error("refresh scheduler is shut down")]
	ShutDown,
}

impl From<DurationError> for RefreshError {
	fn from(err: DurationError) -> Self {
		Self::Config(ConfigError::Duration(err))
	}
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, RefreshError>;
