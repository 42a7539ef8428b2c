//! Client cache manager: fast shared-lock hits, exclusive double-checked rebuilds.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::RwLock;
// self
use crate::{
	_prelude::*,
	cache::{entry::CacheEntry, state::Client},
	config::{self, BackendConfig},
	metrics::BackendMetrics,
	provider::{PasswordPolicyGenerator, Passwords, ProviderFactory},
	settings::{self, ConnectionSettings, EnvLookup},
	storage::Storage,
};

/// Lazily rebuilt provider client shared by request handlers.
///
/// Readers holding a valid client never block each other. A rebuild holds the exclusive lock for
/// its whole duration, so concurrent misses produce one provider construction and a reset issued
/// mid-rebuild takes effect after it.
pub struct ClientCache {
	entry: RwLock<CacheEntry>,
	arrivals: AtomicU64,
	factory: Arc<dyn ProviderFactory>,
	policy_generator: Arc<dyn PasswordPolicyGenerator>,
	lifetime: Duration,
	metrics: Arc<BackendMetrics>,
	env: EnvLookup,
}
impl ClientCache {
	/// Build an empty cache.
	pub fn new(
		factory: Arc<dyn ProviderFactory>,
		policy_generator: Arc<dyn PasswordPolicyGenerator>,
		lifetime: Duration,
		metrics: Arc<BackendMetrics>,
	) -> Self {
		Self {
			entry: RwLock::new(CacheEntry::new()),
			arrivals: AtomicU64::new(0),
			factory,
			policy_generator,
			lifetime,
			metrics,
			env: settings::process_env(),
		}
	}

	/// Replace the source consulted for settings the configuration leaves unset.
	pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
		self.env = env;

		self
	}

	/// Return the cached client, rebuilding it when missing or expired.
	///
	/// Rebuild failures are returned as [`Error::Rebuild`]; callers that were already waiting on
	/// the failed rebuild receive the same error instead of retrying it.
	#[tracing::instrument(skip_all)]
	pub async fn get_client(&self, storage: &dyn Storage) -> Result<Arc<Client>> {
		let arrival = self.arrivals.fetch_add(1, Ordering::SeqCst);

		if let Some(client) = self.entry.read().await.valid_client(Instant::now()) {
			self.metrics.record_hit();

			return Ok(client);
		}

		self.metrics.record_miss();

		let mut entry = self.entry.write().await;

		if let Some(client) = entry.valid_client(Instant::now()) {
			return Ok(client);
		}
		if let Some(error) = entry.failure_for(arrival) {
			return Err(Error::Rebuild(error));
		}

		let started = Instant::now();

		match self.build(entry.settings(), storage).await {
			Ok(client) => {
				entry.commit(client.clone());
				self.metrics.record_rebuild_success(started.elapsed());

				tracing::debug!(lifetime = ?self.lifetime, "rebuilt provider client");

				Ok(client)
			},
			Err(err) => {
				tracing::warn!(error = %err, "failed to rebuild provider client");

				self.metrics.record_rebuild_error();

				let error = entry.fail(err, self.arrivals.load(Ordering::SeqCst));

				Err(Error::Rebuild(error))
			},
		}
	}

	/// Drop the cached client and settings; the next request rebuilds both.
	pub async fn reset(&self) {
		self.entry.write().await.reset();

		tracing::debug!("provider client cache reset");
	}

	/// Whether a valid client is currently cached.
	pub async fn is_valid(&self) -> bool {
		self.entry.read().await.valid_client(Instant::now()).is_some()
	}

	/// Settings retained for the next rebuild, if any.
	pub async fn settings(&self) -> Option<Arc<ConnectionSettings>> {
		self.entry.read().await.settings()
	}

	async fn build(
		&self,
		settings: Option<Arc<ConnectionSettings>>,
		storage: &dyn Storage,
	) -> Result<Arc<Client>> {
		let config = config::load_config(storage).await?.unwrap_or_else(BackendConfig::default);
		let settings = match settings {
			Some(settings) => settings,
			None => {
				let derived =
					ConnectionSettings::from_config_with(&config, |name| (self.env)(name))?;

				Arc::new(derived)
			},
		};
		let passwords = Passwords {
			policy_generator: self.policy_generator.clone(),
			policy_name: config.password_policy().map(str::to_owned),
		};
		let provider = self.factory.new_provider(
			settings.clone(),
			config.use_microsoft_graph_api,
			passwords.clone(),
		)?;

		Ok(Arc::new(Client {
			provider,
			settings,
			expiration: Instant::now() + self.lifetime,
			passwords,
		}))
	}
}
impl std::fmt::Debug for ClientCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClientCache")
			.field("entry", &self.entry)
			.field("lifetime", &self.lifetime)
			.finish_non_exhaustive()
	}
}
