use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::RefreshError;

/// One pending refresh request for one slot.
#[derive(Debug)]
pub(crate) struct RefreshTask<S> {
	slot: S,
	done: oneshot::Sender<()>,
}

impl<S> RefreshTask<S> {
	/// Creates a task and the ticket its caller waits on.
	pub(crate) fn new(slot: S) -> (Self, RefreshTicket) {
		let (done, rx) = oneshot::channel();
		(Self { slot, done }, RefreshTicket { rx })
	}

	/// Creates a task nobody waits on, used for repeated per-slot ticks.
	pub(crate) fn detached(slot: S) -> Self {
		Self::new(slot).0
	}

	pub(crate) fn slot(&self) -> &S {
		&self.slot
	}

	/// Marks the task dispatched.
	pub(crate) fn resolve(self) {
		let _ = self.done.send(());
	}
}

/// Future returned by [`crate::RefreshScheduler::schedule_refresh`].
///
/// Resolves with `Ok(())` once the refresh command carrying the slot has run
/// on the gateway queue. Resolves with [`RefreshError::Cancelled`] when the
/// request is dropped first: scheduler shutdown, cancelling a deferred slot
/// interval, or a gateway shutdown.
#[derive(Debug)]
#[must_use = "a ticket does nothing unless awaited; drop it to ignore the outcome"]
pub struct RefreshTicket {
	rx: oneshot::Receiver<()>,
}

impl Future for RefreshTicket {
	type Output = Result<(), RefreshError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|res| res.map_err(|_| RefreshError::Cancelled))
	}
}
