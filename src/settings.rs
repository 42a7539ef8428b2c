//! Connection settings derived from the configuration record.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use url::Url;
// self
use crate::{
	_prelude::*,
	config::{BackendConfig, CloudEnvironment},
};

/// Environment variable consulted when `subscription_id` is not configured.
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
/// Environment variable consulted when `tenant_id` is not configured.
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable consulted when `client_id` is not configured.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable consulted when `client_secret` is not configured.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Environment variable consulted when `environment` is not configured.
pub const ENV_ENVIRONMENT: &str = "AZURE_ENVIRONMENT";

/// Source for settings the configuration leaves unset, keyed by environment variable name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// [`EnvLookup`] reading the process environment.
pub fn process_env() -> EnvLookup {
	Arc::new(|name: &str| std::env::var(name).ok())
}

/// Resolved parameters needed to authenticate against Azure.
///
/// Immutable once built; the client cache shares one instance across rebuilds until the
/// configuration changes.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
	/// Subscription the managed credentials are scoped to.
	pub subscription_id: String,
	/// Directory (tenant) identifier.
	pub tenant_id: String,
	/// Root application (client) identifier; empty selects ambient credentials.
	pub client_id: String,
	/// Root application secret; empty selects ambient credentials.
	pub client_secret: String,
	/// Cloud the account lives in.
	pub environment: CloudEnvironment,
	/// Microsoft Graph endpoint for [`Self::environment`].
	pub graph_endpoint: Url,
}
impl ConnectionSettings {
	/// Derive settings from `config`, falling back to the process environment.
	pub fn from_config(config: &BackendConfig) -> Result<Self> {
		let env = process_env();

		Self::from_config_with(config, |name| env(name))
	}

	/// Derive settings from `config`, falling back to `lookup` for unset fields.
	pub fn from_config_with<F>(config: &BackendConfig, lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let pick = |configured: &str, name: &str| {
			if configured.is_empty() {
				lookup(name).unwrap_or_default()
			} else {
				configured.to_owned()
			}
		};
		let subscription_id = pick(&config.subscription_id, ENV_SUBSCRIPTION_ID);
		let tenant_id = pick(&config.tenant_id, ENV_TENANT_ID);
		let client_id = pick(&config.client_id, ENV_CLIENT_ID);
		let client_secret = pick(&config.client_secret, ENV_CLIENT_SECRET);
		let environment = CloudEnvironment::from_name(&pick(&config.environment, ENV_ENVIRONMENT))?;

		if subscription_id.is_empty() {
			return Err(Error::MissingSetting("subscription_id"));
		}
		if tenant_id.is_empty() {
			return Err(Error::MissingSetting("tenant_id"));
		}

		Ok(Self {
			subscription_id,
			tenant_id,
			client_id,
			client_secret,
			graph_endpoint: environment.graph_endpoint()?,
			environment,
		})
	}
}
impl Debug for ConnectionSettings {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ConnectionSettings")
			.field("subscription_id", &self.subscription_id)
			.field("tenant_id", &self.tenant_id)
			.field("client_id", &self.client_id)
			.field("client_secret", &if self.client_secret.is_empty() { "" } else { "<redacted>" })
			.field("environment", &self.environment)
			.field("graph_endpoint", &self.graph_endpoint.as_str())
			.finish()
	}
}
