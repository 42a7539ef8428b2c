//! Cache entry holding the client, its settings, and the last rebuild failure.

// self
use crate::{_prelude::*, cache::state::Client, settings::ConnectionSettings};

/// Mutable cache contents guarded by the cache's reader/writer lock.
#[derive(Debug, Default)]
pub struct CacheEntry {
	client: Option<Arc<Client>>,
	settings: Option<Arc<ConnectionSettings>>,
	failure: Option<RebuildFailure>,
}
impl CacheEntry {
	/// Create an empty entry.
	pub fn new() -> Self {
		Self::default()
	}

	/// The cached client, if present and valid at `now`.
	pub fn valid_client(&self, now: Instant) -> Option<Arc<Client>> {
		self.client.as_ref().filter(|client| client.is_valid_at(now)).cloned()
	}

	/// Settings retained from the last successful build.
	pub fn settings(&self) -> Option<Arc<ConnectionSettings>> {
		self.settings.clone()
	}

	/// Failure that a caller arriving with ticket `arrival` should share instead of retrying.
	///
	/// Only callers that arrived before the failing attempt finished share its error.
	pub fn failure_for(&self, arrival: u64) -> Option<Arc<Error>> {
		self.failure
			.as_ref()
			.filter(|failure| arrival < failure.completed_at)
			.map(|failure| failure.error.clone())
	}

	/// Install a freshly built client and retain its settings.
	pub fn commit(&mut self, client: Arc<Client>) {
		self.settings = Some(client.settings.clone());
		self.client = Some(client);
		self.failure = None;
	}

	/// Record a failed rebuild, leaving client and settings untouched.
	pub fn fail(&mut self, error: Error, completed_at: u64) -> Arc<Error> {
		let error = Arc::new(error);

		self.failure = Some(RebuildFailure { error: error.clone(), completed_at });

		error
	}

	/// Drop the client, the settings, and any recorded failure.
	pub fn reset(&mut self) {
		self.client = None;
		self.settings = None;
		self.failure = None;
	}
}

#[derive(Debug)]
struct RebuildFailure {
	error: Arc<Error>,
	completed_at: u64,
}
