//! Metrics helpers and per-backend telemetry bookkeeping.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_CLIENT_REQUESTS_TOTAL: &str = "azure_secrets_client_requests_total";
const METRIC_CLIENT_REBUILDS_TOTAL: &str = "azure_secrets_client_rebuilds_total";
const METRIC_CLIENT_REBUILD_DURATION: &str = "azure_secrets_client_rebuild_duration_seconds";
const METRIC_ROOT_ROTATIONS_TOTAL: &str = "azure_secrets_root_rotations_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for one backend instance.
#[derive(Debug, Default)]
pub struct BackendMetrics {
	client_hits: AtomicU64,
	client_misses: AtomicU64,
	rebuild_successes: AtomicU64,
	rebuild_errors: AtomicU64,
	rotation_successes: AtomicU64,
	rotation_errors: AtomicU64,
}
impl BackendMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a request served from the cached client.
	pub fn record_hit(&self) {
		self.client_hits.fetch_add(1, Ordering::Relaxed);
		metrics::counter!(METRIC_CLIENT_REQUESTS_TOTAL, outcome_labels("outcome", "hit").iter())
			.increment(1);
	}

	/// Record a request that had to take the rebuild path.
	pub fn record_miss(&self) {
		self.client_misses.fetch_add(1, Ordering::Relaxed);
		metrics::counter!(METRIC_CLIENT_REQUESTS_TOTAL, outcome_labels("outcome", "miss").iter())
			.increment(1);
	}

	/// Record a successful client rebuild and its latency.
	pub fn record_rebuild_success(&self, duration: Duration) {
		self.rebuild_successes.fetch_add(1, Ordering::Relaxed);
		metrics::counter!(METRIC_CLIENT_REBUILDS_TOTAL, outcome_labels("status", "success").iter())
			.increment(1);
		metrics::histogram!(METRIC_CLIENT_REBUILD_DURATION).record(duration.as_secs_f64());
	}

	/// Record a failed client rebuild.
	pub fn record_rebuild_error(&self) {
		self.rebuild_errors.fetch_add(1, Ordering::Relaxed);
		metrics::counter!(METRIC_CLIENT_REBUILDS_TOTAL, outcome_labels("status", "error").iter())
			.increment(1);
	}

	/// Record the outcome of a root credential rotation.
	pub fn record_rotation(&self, success: bool) {
		let status = if success {
			self.rotation_successes.fetch_add(1, Ordering::Relaxed);

			"success"
		} else {
			self.rotation_errors.fetch_add(1, Ordering::Relaxed);

			"error"
		};

		metrics::counter!(METRIC_ROOT_ROTATIONS_TOTAL, outcome_labels("status", status).iter())
			.increment(1);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> BackendMetricsSnapshot {
		BackendMetricsSnapshot {
			client_hits: self.client_hits.load(Ordering::Relaxed),
			client_misses: self.client_misses.load(Ordering::Relaxed),
			rebuild_successes: self.rebuild_successes.load(Ordering::Relaxed),
			rebuild_errors: self.rebuild_errors.load(Ordering::Relaxed),
			rotation_successes: self.rotation_successes.load(Ordering::Relaxed),
			rotation_errors: self.rotation_errors.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of backend telemetry counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendMetricsSnapshot {
	/// Requests served from the cached client.
	pub client_hits: u64,
	/// Requests that took the rebuild path.
	pub client_misses: u64,
	/// Successful client rebuilds.
	pub rebuild_successes: u64,
	/// Failed client rebuilds.
	pub rebuild_errors: u64,
	/// Successful root rotations.
	pub rotation_successes: u64,
	/// Failed root rotations.
	pub rotation_errors: u64,
}
impl BackendMetricsSnapshot {
	/// Ratio of cached-client hits over all client requests.
	pub fn hit_rate(&self) -> f64 {
		let total = self.client_hits + self.client_misses;

		if total == 0 { 0.0 } else { self.client_hits as f64 / total as f64 }
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder()?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

fn outcome_labels(key: &'static str, value: &'static str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new(key, value));

	labels
}
