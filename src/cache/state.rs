//! Cached client handed to request handlers.

// self
use crate::{
	_prelude::*,
	provider::{Passwords, Provider},
	settings::ConnectionSettings,
};

/// Lifetime of a cached client before it is rebuilt.
pub const DEFAULT_CLIENT_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Authenticated provider handle with the settings it was built from.
///
/// Always replaced as a whole; never updated in place.
#[derive(Clone, Debug)]
pub struct Client {
	/// Handle to the remote identity service.
	pub provider: Arc<dyn Provider>,
	/// Settings the provider was built from.
	pub settings: Arc<ConnectionSettings>,
	/// Monotonic deadline after which the client must be rebuilt.
	pub expiration: Instant,
	/// Password-generation context passed to the provider.
	pub passwords: Passwords,
}
impl Client {
	/// Whether the client may still be served at `now`.
	pub fn is_valid_at(&self, now: Instant) -> bool {
		now < self.expiration
	}

	/// Whether the client may still be served.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(Instant::now())
	}
}
