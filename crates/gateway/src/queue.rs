use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use adcadence_worker::TaskClass;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{AdNetwork, GatewayError, Result};

/// One unit of work executed against the ad network.
pub type Command<N> = Box<dyn FnOnce(&N) + Send + 'static>;

struct QueueInner<N: AdNetwork> {
	network: Arc<N>,
	tx: mpsc::UnboundedSender<Command<N>>,
	ready: watch::Sender<bool>,
	pending: Arc<AtomicUsize>,
	cancel: CancellationToken,
}

/// FIFO command queue in front of an [`AdNetwork`].
///
/// Commands are accepted at any time but only run after [`Self::mark_ready`].
/// They run one at a time on a dispatch task, in the order they were
/// enqueued. A panicking command is logged and does not stop the queue.
pub struct CommandQueue<N: AdNetwork> {
	inner: Arc<QueueInner<N>>,
}

impl<N: AdNetwork> Clone for CommandQueue<N> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<N: AdNetwork> fmt::Debug for CommandQueue<N> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CommandQueue")
			.field("ready", &self.is_ready())
			.field("pending", &self.pending())
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl<N: AdNetwork> CommandQueue<N> {
	/// Creates a queue for `network` and starts its dispatch task.
	pub fn spawn(network: Arc<N>) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let (ready, ready_rx) = watch::channel(false);
		let pending = Arc::new(AtomicUsize::new(0));
		let cancel = CancellationToken::new();

		adcadence_worker::spawn(
			TaskClass::Dispatch,
			drain(Arc::clone(&network), rx, ready_rx, Arc::clone(&pending), cancel.clone()),
		);

		Self {
			inner: Arc::new(QueueInner {
				network,
				tx,
				ready,
				pending,
				cancel,
			}),
		}
	}

	/// Queues `command` behind everything enqueued before it.
	pub fn enqueue(&self, command: impl FnOnce(&N) + Send + 'static) -> Result<()> {
		if self.inner.cancel.is_cancelled() {
			return Err(GatewayError::Closed);
		}
		self.inner.pending.fetch_add(1, Ordering::AcqRel);
		if self.inner.tx.send(Box::new(command)).is_err() {
			// The drain task may already have reset the count.
			let _ = self.inner.pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
			return Err(GatewayError::Closed);
		}
		Ok(())
	}

	/// Signals that the network library has loaded. Held commands start
	/// running. Idempotent.
	pub fn mark_ready(&self) {
		if !self.inner.ready.send_replace(true) {
			tracing::debug!(pending = self.pending(), "gateway.ready");
		}
	}

	/// Returns true once [`Self::mark_ready`] has been called.
	pub fn is_ready(&self) -> bool {
		*self.inner.ready.borrow()
	}

	/// Number of commands enqueued but not yet run.
	pub fn pending(&self) -> usize {
		self.inner.pending.load(Ordering::Acquire)
	}

	/// Returns true after [`Self::shutdown`].
	pub fn is_closed(&self) -> bool {
		self.inner.cancel.is_cancelled()
	}

	/// Stops the dispatch task. Commands that have not run yet are dropped.
	pub fn shutdown(&self) {
		if !self.inner.cancel.is_cancelled() {
			tracing::debug!(dropped = self.pending(), "gateway.shutdown");
			self.inner.cancel.cancel();
		}
	}

	/// The network commands run against.
	pub fn network(&self) -> &Arc<N> {
		&self.inner.network
	}
}

async fn drain<N: AdNetwork>(
	network: Arc<N>,
	mut rx: mpsc::UnboundedReceiver<Command<N>>,
	mut ready: watch::Receiver<bool>,
	pending: Arc<AtomicUsize>,
	cancel: CancellationToken,
) {
	let became_ready = tokio::select! {
		biased;
		_ = cancel.cancelled() => false,
		res = ready.wait_for(|ready| *ready) => res.is_ok(),
	};

	if became_ready {
		loop {
			let command = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				msg = rx.recv() => {
					let Some(command) = msg else {
						break;
					};
					command
				}
			};
			pending.fetch_sub(1, Ordering::AcqRel);

			tracing::trace!(pending = pending.load(Ordering::Acquire), "gateway.command.run");
			if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| command(&network))) {
				tracing::error!(panic = %panic_message(payload.as_ref()), "gateway.command.panicked");
			}
		}
	}

	// Dropping the receiver drops every command still queued.
	rx.close();
	pending.store(0, Ordering::Release);
	tracing::debug!("gateway.drain.exit");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_owned()
	}
}
