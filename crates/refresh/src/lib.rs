//! Refresh scheduling for ad slots.
//!
//! Every "refresh this slot" request goes through [`RefreshScheduler`], which
//! either dispatches it right away, holds it in a shared buffer, or attaches
//! it to a per-slot timer. Three mechanisms decide when the buffer is
//! flushed:
//!
//! * [`Mechanism::Refresh`]: a global timer refreshing every slot on the page
//! * [`Mechanism::Interval`]: a timer flushing the buffer
//! * [`Mechanism::Barrier`]: a flush once a number of requests have arrived
//!
//! Only installed mechanisms whose priority ties for the maximum are enabled.

#![warn(missing_docs)]

mod config;
mod error;
mod mechanism;
mod scheduler;
mod ticket;

pub use adcadence_duration::DurationSpec;
pub use adcadence_gateway::{AdNetwork, CommandQueue};
pub use config::{BarrierConfig, SchedulerConfig};
pub use error::{ConfigError, RefreshError, Result};
pub use mechanism::{Mechanism, Priorities, Priority, parse_priority};
pub use scheduler::RefreshScheduler;
pub use ticket::RefreshTicket;
