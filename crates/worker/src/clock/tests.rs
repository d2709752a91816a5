use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

fn counter() -> (Arc<AtomicUsize>, TimerCallback) {
	let count = Arc::new(AtomicUsize::new(0));
	let hits = Arc::clone(&count);
	(
		count,
		Box::new(move || {
			hits.fetch_add(1, Ordering::SeqCst);
		}),
	)
}

#[tokio::test(start_paused = true)]
async fn every_ticks_once_per_period() {
	let clock = TokioClock::new();
	let (count, callback) = counter();
	let _timer = clock.every(Duration::from_millis(100), callback);

	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(count.load(Ordering::SeqCst), 0, "first tick is one period after registration");

	tokio::time::sleep(Duration::from_millis(300)).await;
	assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_repeating_timer() {
	let clock = TokioClock::new();
	let (count, callback) = counter();
	let timer = clock.every(Duration::from_millis(100), callback);

	tokio::time::sleep(Duration::from_millis(150)).await;
	clock.cancel(&timer);
	assert!(timer.is_cancelled());

	tokio::time::sleep(Duration::from_millis(500)).await;
	assert_eq!(count.load(Ordering::SeqCst), 1);

	// Cancelling twice is harmless.
	clock.cancel(&timer);
}

#[tokio::test(start_paused = true)]
async fn after_fires_exactly_once() {
	let clock = TokioClock::new();
	let (count, callback) = counter();
	let _timer = clock.after(Duration::from_millis(50), callback);

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(count.load(Ordering::SeqCst), 1);

	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_after_never_fires() {
	let clock = TokioClock::new();
	let (count, callback) = counter();
	let timer = clock.after(Duration::from_millis(50), callback);
	timer.cancel();

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn timer_ids_are_unique_per_clock() {
	let ids = TimerIds::new();
	let a = ids.next();
	let b = ids.next();
	assert_eq!(a, 1);
	assert_eq!(b, 2);

	let shared = ids.clone();
	assert_eq!(shared.next(), 3);
}

#[tokio::test(start_paused = true)]
async fn zero_period_is_clamped() {
	let clock = TokioClock::new();
	let (count, callback) = counter();
	let timer = clock.every(Duration::ZERO, callback);

	tokio::time::sleep(Duration::from_millis(5)).await;
	timer.cancel();
	let seen = count.load(Ordering::SeqCst);
	assert!((4..=5).contains(&seen), "expected ~5 ticks at the minimum period, got {seen}");
}
