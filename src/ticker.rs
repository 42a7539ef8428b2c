//! Named, cancellable periodic tasks.
//!
//! Each task runs on its own tokio task: it waits for its first-run instant, fires, then fires
//! again every cadence. Firings of one task never overlap. A firing runs as a separate spawned
//! task so a panic inside the work is contained and the schedule continues. The driver owns its
//! firing, so aborting the driver also aborts the work in flight.

// std
use std::{
	collections::HashMap,
	future::Future,
	mem,
	sync::atomic::{AtomicU64, Ordering},
};
// crates.io
use tokio::{
	sync::Mutex,
	task::{JoinHandle, JoinSet},
	time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Default bound on how long [`Ticker::close`] waits for tasks to stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for [`Ticker::run`].
#[derive(Clone, Debug, Default)]
pub struct TaskOptions {
	id: Option<String>,
	first_run: Option<DateTime<Utc>>,
}
impl TaskOptions {
	/// Options with a generated identifier and a first run one cadence from now.
	pub fn new() -> Self {
		Self::default()
	}

	/// Use a fixed identifier; at most one task per identifier is active.
	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());

		self
	}

	/// Fire first at `at` instead of one cadence from now; instants in the past fire immediately.
	pub fn first_run(mut self, at: DateTime<Utc>) -> Self {
		self.first_run = Some(at);

		self
	}
}

/// Handle identifying a running task.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle {
	id: String,
}
impl TaskHandle {
	/// Identifier of the task.
	pub fn id(&self) -> &str {
		&self.id
	}
}

/// Scheduler owning a table of periodic tasks.
#[derive(Debug)]
pub struct Ticker {
	state: Mutex<TickerState>,
	shutdown_timeout: Duration,
	next_id: AtomicU64,
}
impl Ticker {
	/// Create a ticker whose [`close`](Self::close) waits at most `shutdown_timeout`.
	pub fn new(shutdown_timeout: Duration) -> Result<Self> {
		if shutdown_timeout.is_zero() {
			return Err(Error::Validation {
				field: "shutdown_timeout",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(Self {
			state: Mutex::new(TickerState::default()),
			shutdown_timeout,
			next_id: AtomicU64::new(1),
		})
	}

	/// Start firing `work` every `cadence`.
	pub async fn run<F, Fut>(
		&self,
		cadence: Duration,
		work: F,
		options: TaskOptions,
	) -> Result<TaskHandle>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		if cadence.is_zero() {
			return Err(Error::Validation {
				field: "cadence",
				reason: "Must be greater than zero.".into(),
			});
		}

		let id = options
			.id
			.unwrap_or_else(|| format!("task-{}", self.next_id.fetch_add(1, Ordering::Relaxed)));
		let mut state = self.state.lock().await;

		if state.closed {
			return Err(Error::SchedulerClosed);
		}
		if state.tasks.get(&id).is_some_and(|task| !task.join.is_finished()) {
			return Err(Error::TaskExists(id));
		}

		let start = start_instant(options.first_run, cadence);
		let cancel = CancellationToken::new();
		let join = tokio::spawn(drive(id.clone(), cadence, start, cancel.clone(), work));

		tracing::debug!(
			task = %id,
			?cadence,
			first_run = ?options.first_run,
			"scheduled task armed"
		);

		state.tasks.insert(id.clone(), ScheduledTask { cancel, join });

		Ok(TaskHandle { id })
	}

	/// Whether a task with `id` is active.
	pub async fn is_running(&self, id: &str) -> bool {
		self.state.lock().await.tasks.get(id).is_some_and(|task| !task.join.is_finished())
	}

	/// Cancel one task and wait for its in-flight firing; returns whether it existed.
	pub async fn stop(&self, id: &str) -> Result<bool> {
		let task = { self.state.lock().await.tasks.remove(id) };
		let Some(task) = task else {
			return Ok(false);
		};
		let failures = self.wait_all(vec![(id.to_owned(), task)]).await;

		if failures.is_empty() {
			Ok(true)
		} else {
			Err(Error::Shutdown(failures.join("; ")))
		}
	}

	/// Cancel every task and wait for in-flight firings to finish.
	///
	/// No new tasks are accepted afterwards. Waiting is bounded by the shutdown timeout; tasks that
	/// do not stop in time are aborted and reported in the returned error. Calling this again is a
	/// no-op.
	pub async fn close(&self) -> Result<()> {
		let tasks = {
			let mut state = self.state.lock().await;

			state.closed = true;

			mem::take(&mut state.tasks)
		};

		if tasks.is_empty() {
			return Ok(());
		}

		let failures = self.wait_all(tasks.into_iter().collect()).await;

		if failures.is_empty() {
			tracing::debug!("ticker closed");

			Ok(())
		} else {
			Err(Error::Shutdown(failures.join("; ")))
		}
	}

	async fn wait_all(&self, tasks: Vec<(String, ScheduledTask)>) -> Vec<String> {
		for (_, task) in &tasks {
			task.cancel.cancel();
		}

		let deadline = Instant::now() + self.shutdown_timeout;
		let mut failures = Vec::new();

		for (id, mut task) in tasks {
			match time::timeout_at(deadline, &mut task.join).await {
				Ok(Ok(())) => {},
				Ok(Err(err)) => failures.push(format!("task '{id}' failed: {err}")),
				Err(_) => {
					task.join.abort();

					let _ = (&mut task.join).await;

					failures.push(format!(
						"task '{id}' did not stop within {:?}",
						self.shutdown_timeout
					));
				},
			}
		}

		failures
	}
}
impl Default for Ticker {
	fn default() -> Self {
		Self {
			state: Mutex::new(TickerState::default()),
			shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
			next_id: AtomicU64::new(1),
		}
	}
}

#[derive(Debug, Default)]
struct TickerState {
	closed: bool,
	tasks: HashMap<String, ScheduledTask>,
}

#[derive(Debug)]
struct ScheduledTask {
	cancel: CancellationToken,
	join: JoinHandle<()>,
}

async fn drive<F, Fut>(
	id: String,
	cadence: Duration,
	start: Instant,
	cancel: CancellationToken,
	work: F,
) where
	F: Fn() -> Fut + Send + Sync + 'static,
	Fut: Future<Output = ()> + Send + 'static,
{
	let work = Arc::new(work);
	let mut firings = JoinSet::new();
	let mut interval = time::interval_at(start, cadence);

	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			biased;
			_ = cancel.cancelled() => break,
			_ = interval.tick() => {},
		}

		tracing::debug!(task = %id, "firing scheduled task");

		let work = work.clone();

		firings.spawn(async move { work().await });

		if let Some(Err(err)) = firings.join_next().await {
			tracing::error!(task = %id, error = %err, "scheduled task firing aborted");
		}
	}

	tracing::debug!(task = %id, "scheduled task stopped");
}

fn start_instant(first_run: Option<DateTime<Utc>>, cadence: Duration) -> Instant {
	let now = Instant::now();

	match first_run {
		Some(at) => now + (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
		None => now + cadence,
	}
}
