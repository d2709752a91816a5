//! Runtime primitives shared by the refresh scheduler and the command gateway.
//!
//! * [`spawn`]: runtime-aware task spawning tagged with a [`TaskClass`]
//! * [`Clock`]: repeating and one-shot callbacks with cancelable [`TimerHandle`]s
//! * [`TokioClock`]: the tokio-backed clock used outside of tests

mod class;
mod clock;
mod spawn;
mod token;

pub use class::TaskClass;
pub use clock::{Clock, TimerCallback, TokioClock};
pub use spawn::spawn;
pub use token::{TimerHandle, TimerIds};
