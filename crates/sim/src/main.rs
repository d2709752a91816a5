//! Refresh scheduler simulator.
//!
//! Pretends to be an ad page: the ad library becomes ready after a delay,
//! slots ask for refreshes at a steady pace, and every call that reaches the
//! ad network is logged. Useful for watching how a scheduler config behaves.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adcadence_duration::{DurationError, format_duration, parse_str};
use adcadence_refresh::{CommandQueue, RefreshError, RefreshScheduler, SchedulerConfig};
use anyhow::Context as _;
use clap::Parser;
use tracing::info;

mod network;

use network::LogNetwork;

/// Simulator command line arguments.
#[derive(Parser, Debug)]
#[command(name = "adcadence-sim")]
#[command(about = "Drive the ad refresh scheduler against a simulated page")]
struct Args {
	/// Scheduler config (TOML). Defaults to a 1s buffer flush and a 1h page refresh
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Comma-separated slot names
	#[arg(short, long, value_delimiter = ',', default_value = "top,sidebar,footer")]
	slots: Vec<String>,

	/// How long to run
	#[arg(long, value_name = "DURATION", value_parser = parse_str, default_value = "10s")]
	run_for: Duration,

	/// Pause between two refresh requests
	#[arg(long, value_name = "DURATION", value_parser = parse_str, default_value = "300ms")]
	request_every: Duration,

	/// Delay before the ad library reports ready
	#[arg(long, value_name = "DURATION", value_parser = parse_str, default_value = "200ms")]
	ready_after: Duration,

	/// Dedicated slot timer, e.g. `top=30s`. Repeatable
	#[arg(long = "every", value_name = "SLOT=DURATION", value_parser = parse_slot_interval)]
	slot_intervals: Vec<(String, Duration)>,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

fn parse_slot_interval(raw: &str) -> Result<(String, Duration), String> {
	let (slot, period) = raw.split_once('=').ok_or_else(|| format!("expected SLOT=DURATION, got {raw:?}"))?;
	let slot = slot.trim();
	if slot.is_empty() {
		return Err(format!("missing slot name in {raw:?}"));
	}
	let period = parse_str(period).map_err(|err: DurationError| err.to_string())?;
	Ok((slot.to_owned(), period))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = match &args.config {
		Some(path) => SchedulerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
		None => SchedulerConfig::page_defaults(),
	};
	anyhow::ensure!(!args.slots.is_empty(), "at least one slot is required");
	info!(?config, slots = args.slots.len(), run_for = %format_duration(args.run_for), "starting adcadence-sim");

	let network = Arc::new(LogNetwork::default());
	let gateway = CommandQueue::spawn(Arc::clone(&network));
	let scheduler = RefreshScheduler::new(&config, gateway.clone()).context("building scheduler")?;

	let ready = gateway.clone();
	let ready_after = args.ready_after;
	tokio::spawn(async move {
		tokio::time::sleep(ready_after).await;
		ready.mark_ready();
	});

	for (slot, period) in &args.slot_intervals {
		let ticket = scheduler.schedule_refresh(slot.clone(), Some((*period).into()), true)?;
		tokio::spawn(watch_ticket(slot.clone(), ticket));
	}

	tokio::select! {
		_ = request_loop(&scheduler, &args.slots, args.request_every) => {}
		_ = tokio::time::sleep(args.run_for) => info!("run time elapsed"),
		res = tokio::signal::ctrl_c() => {
			res.context("waiting for ctrl-c")?;
			info!("interrupted");
		}
	}

	let buffered = scheduler.buffer_len();
	scheduler.shutdown();
	gateway.shutdown();

	let stats = network.stats();
	info!(
		slot_calls = stats.slot_calls,
		slots_refreshed = stats.slots_refreshed,
		page_refreshes = stats.page_refreshes,
		dropped = buffered,
		"simulation finished"
	);
	Ok(())
}

/// Requests a refresh of each slot in turn, forever.
async fn request_loop(scheduler: &RefreshScheduler<LogNetwork>, slots: &[String], every: Duration) {
	let mut ticks = tokio::time::interval(every);
	for slot in slots.iter().cycle() {
		ticks.tick().await;
		match scheduler.refresh(slot.clone()) {
			Ok(ticket) => {
				tokio::spawn(watch_ticket(slot.clone(), ticket));
			}
			Err(err) => {
				tracing::warn!(slot = %slot, error = %err, "sim.request.rejected");
				return;
			}
		}
	}
}

async fn watch_ticket(slot: String, ticket: adcadence_refresh::RefreshTicket) {
	match ticket.await {
		Ok(()) => tracing::debug!(slot = %slot, "sim.request.done"),
		Err(RefreshError::Cancelled) => tracing::debug!(slot = %slot, "sim.request.cancelled"),
		Err(err) => tracing::warn!(slot = %slot, error = %err, "sim.request.failed"),
	}
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_env("ADCADENCE_LOG")
			.or_else(|_| EnvFilter::try_from_default_env())
			.unwrap_or_else(|_| {
				if verbose {
					EnvFilter::new("adcadence=trace,debug")
				} else {
					EnvFilter::new("adcadence=debug,info")
				}
			})
	};

	// ADCADENCE_LOG_DIR writes a per-process log file instead of stderr.
	if let Some(log_dir) = std::env::var("ADCADENCE_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("adcadence-sim.{}.log", std::process::id()));
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_target(true);
			tracing_subscriber::registry().with(filter()).with(file_layer).init();
			tracing::info!(path = ?log_path, "sim tracing initialized");
			return;
		}
	}

	tracing_subscriber::registry().with(filter()).with(tracing_subscriber::fmt::layer()).init();
}
