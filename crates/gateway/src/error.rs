use thiserror::Error;

/// Errors returned by the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GatewayError {
	/// The queue has been shut down and no longer accepts commands.
	#[error("command queue closed")]
	Closed,
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
