//! Persisted backend configuration and its validation.
//!
//! The record is owned by the host's configuration endpoints; this crate reads it when building
//! clients and arming the rotation scheduler, and writes it back only after rotating the root
//! credential.

// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, storage::Storage};

/// Storage key holding the configuration record.
pub const CONFIG_STORAGE_KEY: &str = "config";
/// Default lifetime of a freshly minted root password.
pub const DEFAULT_ROOT_PASSWORD_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 182);
/// Environment name used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "AzurePublicCloud";

/// Azure cloud an account lives in, with the Graph endpoint it talks to.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudEnvironment {
	/// Global Azure.
	#[default]
	AzurePublicCloud,
	/// Azure Government.
	AzureUSGovernmentCloud,
	/// Azure operated by 21Vianet.
	AzureChinaCloud,
	/// Azure Germany.
	AzureGermanCloud,
}
impl CloudEnvironment {
	/// Resolve an environment name, ignoring case.
	pub fn from_name(name: &str) -> Result<Self> {
		match name.trim().to_ascii_uppercase().as_str() {
			"" | "AZUREPUBLICCLOUD" => Ok(Self::AzurePublicCloud),
			"AZUREUSGOVERNMENTCLOUD" => Ok(Self::AzureUSGovernmentCloud),
			"AZURECHINACLOUD" => Ok(Self::AzureChinaCloud),
			"AZUREGERMANCLOUD" => Ok(Self::AzureGermanCloud),
			_ => Err(Error::Validation {
				field: "environment",
				reason: format!("Unknown Azure environment '{name}'."),
			}),
		}
	}

	/// Microsoft Graph endpoint for this cloud.
	pub fn graph_endpoint(self) -> Result<Url> {
		let raw = match self {
			Self::AzurePublicCloud => "https://graph.microsoft.com/",
			Self::AzureUSGovernmentCloud => "https://graph.microsoft.us/",
			Self::AzureChinaCloud => "https://microsoftgraph.chinacloudapi.cn/",
			Self::AzureGermanCloud => "https://graph.microsoft.de/",
		};

		Ok(Url::parse(raw)?)
	}
}

/// Backend configuration record stored under [`CONFIG_STORAGE_KEY`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
	/// Subscription the managed credentials are scoped to.
	#[serde(default)]
	pub subscription_id: String,
	/// Directory (tenant) identifier.
	#[serde(default)]
	pub tenant_id: String,
	/// Application (client) identifier of the root credential.
	#[serde(default)]
	pub client_id: String,
	/// Secret of the root credential.
	#[serde(default)]
	pub client_secret: String,
	/// Azure environment name; empty selects [`DEFAULT_ENVIRONMENT`].
	#[serde(default)]
	pub environment: String,
	/// Name of the host password policy used when generating passwords.
	#[serde(default)]
	pub password_policy: String,
	/// Whether the provider should target the Microsoft Graph API.
	#[serde(default)]
	pub use_microsoft_graph_api: bool,
	/// Lifetime applied to newly minted root passwords.
	#[serde(default = "default_root_password_ttl")]
	pub root_password_ttl: Duration,
	/// Interval between automatic root rotations; zero disables rotation.
	#[serde(default)]
	pub root_rotation_cadence: Duration,
	/// When the next automatic root rotation is due; absent means not scheduled.
	#[serde(default)]
	pub next_root_rotation_time: Option<DateTime<Utc>>,
}
impl BackendConfig {
	/// Validate the record against its documented constraints.
	pub fn validate(&self) -> Result<()> {
		if !self.environment.is_empty() {
			CloudEnvironment::from_name(&self.environment)?;
		}
		if self.root_password_ttl.is_zero() {
			return Err(Error::Validation {
				field: "root_password_ttl",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.next_root_rotation_time.is_some() && self.root_rotation_cadence.is_zero() {
			return Err(Error::Validation {
				field: "root_rotation_cadence",
				reason: "Must be set when next_root_rotation_time is scheduled.".into(),
			});
		}

		Ok(())
	}

	/// Rotation cadence and first-run instant, when automatic rotation is configured.
	pub fn rotation_schedule(&self) -> Option<(Duration, DateTime<Utc>)> {
		let first_run = self.next_root_rotation_time?;

		if self.root_rotation_cadence.is_zero() {
			return None;
		}

		Some((self.root_rotation_cadence, first_run))
	}

	/// Password policy name, if one is configured.
	pub fn password_policy(&self) -> Option<&str> {
		Some(self.password_policy.as_str()).filter(|name| !name.is_empty())
	}
}
impl Default for BackendConfig {
	fn default() -> Self {
		Self {
			subscription_id: String::new(),
			tenant_id: String::new(),
			client_id: String::new(),
			client_secret: String::new(),
			environment: String::new(),
			password_policy: String::new(),
			use_microsoft_graph_api: false,
			root_password_ttl: DEFAULT_ROOT_PASSWORD_TTL,
			root_rotation_cadence: Duration::ZERO,
			next_root_rotation_time: None,
		}
	}
}

/// Load the configuration record; an absent record yields `None`.
pub async fn load_config(storage: &dyn Storage) -> Result<Option<BackendConfig>> {
	match storage.get(CONFIG_STORAGE_KEY).await? {
		Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
		None => Ok(None),
	}
}

/// Validate and persist the configuration record.
pub async fn save_config(storage: &dyn Storage, config: &BackendConfig) -> Result<()> {
	config.validate()?;

	let raw = serde_json::to_vec(config)?;

	storage.put(CONFIG_STORAGE_KEY, raw).await
}

fn default_root_password_ttl() -> Duration {
	DEFAULT_ROOT_PASSWORD_TTL
}
