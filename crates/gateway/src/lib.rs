//! Gateway between the refresh scheduler and the ad network.
//!
//! The ad network is reached through [`AdNetwork`]; every call goes through a
//! [`CommandQueue`], which holds commands until the network library reports
//! ready and then runs them one at a time in arrival order.

#![warn(missing_docs)]

mod error;
mod network;
mod queue;

pub use error::{GatewayError, Result};
pub use network::AdNetwork;
pub use queue::{Command, CommandQueue};
