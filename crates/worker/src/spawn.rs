use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(1)
			.thread_name("adcadence-timers")
			.build()
			.expect("failed to build adcadence global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task on the current runtime, or on a lazily built
/// process-wide runtime when called from outside one.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn spawn_outside_runtime_uses_global_runtime() {
		let handle = spawn(TaskClass::Dispatch, async { 7 });
		let (tx, rx) = std::sync::mpsc::channel();
		spawn(TaskClass::Dispatch, async move {
			let _ = tx.send(handle.await.ok());
		});
		assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(2)).ok().flatten(), Some(7));
	}
}
