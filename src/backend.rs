//! Backend lifecycle: configuration invalidation, scheduler arming, and teardown.
//!
//! The host constructs one [`Backend`] per mount, calls [`Backend::initialize`] once with its
//! storage handle, forwards key invalidations to [`Backend::invalidate`], and calls
//! [`Backend::cleanup`] once on shutdown.

// crates.io
use tokio::sync::MutexGuard;
// self
use crate::{
	_prelude::*,
	cache::{
		manager::ClientCache,
		state::{Client, DEFAULT_CLIENT_LIFETIME},
	},
	config::{self, CONFIG_STORAGE_KEY},
	locks::{DEFAULT_SHARD_COUNT, LockShards},
	metrics::{BackendMetrics, BackendMetricsSnapshot},
	provider::{
		PasswordCredential, PasswordPolicyGenerator, ProviderFactory, UnavailablePolicyGenerator,
	},
	rotation::{self, ROOT_ROTATION_TASK_ID, RootRotator},
	settings::{self, EnvLookup},
	storage::{SharedStorage, Storage},
	ticker::{DEFAULT_SHUTDOWN_TIMEOUT, TaskOptions, Ticker},
	wal,
};

/// Builder for [`Backend`].
pub struct BackendBuilder {
	provider_factory: Option<Arc<dyn ProviderFactory>>,
	policy_generator: Arc<dyn PasswordPolicyGenerator>,
	client_lifetime: Duration,
	shard_count: usize,
	shutdown_timeout: Duration,
	env_lookup: EnvLookup,
}
impl BackendBuilder {
	/// Create a builder with default options and no provider factory.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the factory used to construct provider handles (required).
	pub fn provider_factory<F>(mut self, factory: F) -> Self
	where
		F: ProviderFactory + 'static,
	{
		self.provider_factory = Some(Arc::new(factory));

		self
	}

	/// Set the host password-policy evaluator.
	pub fn policy_generator<G>(mut self, generator: G) -> Self
	where
		G: PasswordPolicyGenerator + 'static,
	{
		self.policy_generator = Arc::new(generator);

		self
	}

	/// Override how long a built client is served before being rebuilt.
	pub fn client_lifetime(mut self, value: Duration) -> Self {
		self.client_lifetime = value;

		self
	}

	/// Override the number of per-application lock shards.
	pub fn shard_count(mut self, value: usize) -> Self {
		self.shard_count = value;

		self
	}

	/// Override how long cleanup waits for scheduled work to stop.
	pub fn shutdown_timeout(mut self, value: Duration) -> Self {
		self.shutdown_timeout = value;

		self
	}

	/// Override where unset connection settings are looked up; defaults to the process environment.
	pub fn env_lookup<F>(mut self, lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String> + Send + Sync + 'static,
	{
		self.env_lookup = Arc::new(lookup);

		self
	}

	/// Validate the options and construct the backend.
	pub fn build(self) -> Result<Backend> {
		let provider_factory = self.provider_factory.ok_or_else(|| Error::Validation {
			field: "provider_factory",
			reason: "Must be configured.".into(),
		})?;

		if self.client_lifetime.is_zero() {
			return Err(Error::Validation {
				field: "client_lifetime",
				reason: "Must be greater than zero.".into(),
			});
		}

		let app_locks = Arc::new(LockShards::new(self.shard_count)?);
		let ticker = Ticker::new(self.shutdown_timeout)?;
		let metrics = BackendMetrics::new();
		let cache = Arc::new(
			ClientCache::new(
				provider_factory,
				self.policy_generator,
				self.client_lifetime,
				metrics.clone(),
			)
			.with_env_lookup(self.env_lookup),
		);

		Ok(Backend { cache, app_locks, ticker, metrics })
	}
}
impl Default for BackendBuilder {
	fn default() -> Self {
		Self {
			provider_factory: None,
			policy_generator: Arc::new(UnavailablePolicyGenerator),
			client_lifetime: DEFAULT_CLIENT_LIFETIME,
			shard_count: DEFAULT_SHARD_COUNT,
			shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
			env_lookup: settings::process_env(),
		}
	}
}

/// Backend core shared by request handlers.
#[derive(Debug)]
pub struct Backend {
	cache: Arc<ClientCache>,
	app_locks: Arc<LockShards>,
	ticker: Ticker,
	metrics: Arc<BackendMetrics>,
}
impl Backend {
	/// Create a [`BackendBuilder`].
	pub fn builder() -> BackendBuilder {
		BackendBuilder::new()
	}

	/// Arm automatic root rotation when the stored configuration schedules it.
	///
	/// A missing configuration or an unscheduled rotation leaves the scheduler unarmed. The
	/// schedule is read only here; a configuration written later takes effect on the next
	/// initialization.
	#[tracing::instrument(skip_all)]
	pub async fn initialize(&self, storage: SharedStorage) -> Result<()> {
		let Some(config) = config::load_config(storage.as_ref()).await? else {
			tracing::debug!("no configuration stored; root rotation not armed");

			return Ok(());
		};
		let Some((cadence, first_run)) = config.rotation_schedule() else {
			tracing::debug!("root rotation not scheduled");

			return Ok(());
		};
		let rotator = RootRotator::new(
			self.cache.clone(),
			self.app_locks.clone(),
			storage,
			self.metrics.clone(),
		);

		self.ticker
			.run(
				cadence,
				move || {
					let rotator = rotator.clone();

					async move { rotator.run_scheduled().await }
				},
				TaskOptions::new().id(ROOT_ROTATION_TASK_ID).first_run(first_run),
			)
			.await?;

		tracing::info!(?cadence, %first_run, "armed automatic root rotation");

		Ok(())
	}

	/// React to a storage key changing underneath the backend.
	pub async fn invalidate(&self, key: &str) {
		// TODO: re-arm the root rotation task here once rescheduling semantics for a changed
		// cadence are settled.
		if key == CONFIG_STORAGE_KEY {
			self.cache.reset().await;
		}
	}

	/// Stop scheduled work; failures are logged, never raised.
	pub async fn cleanup(&self) {
		if let Err(err) = self.ticker.close().await {
			tracing::error!(error = %err, "not all scheduled tasks closed cleanly");
		}
	}

	/// Cached provider client, rebuilt when missing or expired.
	pub async fn get_client(&self, storage: &dyn Storage) -> Result<Arc<Client>> {
		self.cache.get_client(storage).await
	}

	/// Drop the cached client and settings.
	pub async fn reset(&self) {
		self.cache.reset().await;
	}

	/// Lock shards serializing mutations per application object.
	pub fn app_locks(&self) -> &LockShards {
		&self.app_locks
	}

	/// Hold the lock for one application object while mutating it.
	pub async fn lock_application(&self, application_object_id: &str) -> MutexGuard<'_, ()> {
		self.app_locks.lock(application_object_id).await
	}

	/// Rotate the root credential now.
	pub async fn rotate_root(&self, storage: &dyn Storage) -> Result<PasswordCredential> {
		let outcome = rotation::rotate_root(&self.cache, &self.app_locks, storage).await;

		self.metrics.record_rotation(outcome.is_ok());

		outcome
	}

	/// Roll back a write-ahead-logged mutation.
	pub async fn wal_rollback(
		&self,
		storage: &dyn Storage,
		kind: &str,
		data: serde_json::Value,
	) -> Result<()> {
		wal::rollback(&self.cache, &self.app_locks, storage, kind, data).await
	}

	/// Whether automatic root rotation is armed.
	pub async fn rotation_armed(&self) -> bool {
		self.ticker.is_running(ROOT_ROTATION_TASK_ID).await
	}

	/// Point-in-time telemetry counters.
	pub fn metrics(&self) -> BackendMetricsSnapshot {
		self.metrics.snapshot()
	}
}
