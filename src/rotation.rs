//! Root credential rotation.

// self
use crate::{
	_prelude::*,
	cache::manager::ClientCache,
	config::{self, BackendConfig},
	locks::LockShards,
	metrics::BackendMetrics,
	provider::PasswordCredential,
	storage::{SharedStorage, Storage},
};

/// Identifier of the scheduled root rotation task.
pub const ROOT_ROTATION_TASK_ID: &str = "root-creds";

/// Replace the root application's password and persist the new secret.
///
/// The new password is added and persisted before the old ones are removed, so a failure part
/// way through never leaves the backend without a working secret. The application, the stored
/// configuration, and the client are all re-read under the application's lock, so overlapping
/// rotations each see the previous one's password and leave exactly one live.
#[tracing::instrument(skip_all)]
pub async fn rotate_root(
	cache: &ClientCache,
	locks: &LockShards,
	storage: &dyn Storage,
) -> Result<PasswordCredential> {
	let config = config::load_config(storage).await?.ok_or(Error::NotConfigured)?;
	let client = cache.get_client(storage).await?;
	let client_id = root_client_id(&config, &client.settings.client_id)?;
	let object_id = client.provider.get_application(&client_id).await?.object_id;
	let _guard = locks.lock(&object_id).await;
	let mut config = config::load_config(storage).await?.ok_or(Error::NotConfigured)?;
	let client = cache.get_client(storage).await?;
	let client_id = root_client_id(&config, &client.settings.client_id)?;
	let application = client.provider.get_application(&client_id).await?;
	let now = Utc::now();
	let ttl = TimeDelta::from_std(config.root_password_ttl).map_err(|err| Error::Validation {
		field: "root_password_ttl",
		reason: err.to_string(),
	})?;
	let credential = client
		.provider
		.add_application_password(
			&application.object_id,
			&format!("root-rotation-{}", now.format("%Y%m%dT%H%M%SZ")),
			now + ttl,
		)
		.await?;
	let secret = credential.secret_text.clone().ok_or_else(|| {
		Error::Provider("New root password was returned without its secret.".into())
	})?;

	config.client_id = client_id;
	config.client_secret = secret;

	if !config.root_rotation_cadence.is_zero() {
		let cadence = TimeDelta::from_std(config.root_rotation_cadence).map_err(|err| {
			Error::Validation { field: "root_rotation_cadence", reason: err.to_string() }
		})?;

		config.next_root_rotation_time = Some(now + cadence);
	}

	config::save_config(storage, &config).await?;

	for stale in
		application.password_credentials.iter().filter(|old| old.key_id != credential.key_id)
	{
		if let Err(err) = client
			.provider
			.remove_application_password(&application.object_id, &stale.key_id)
			.await
		{
			tracing::warn!(
				key_id = %stale.key_id,
				error = %err,
				"failed to remove superseded root password"
			);
		}
	}

	// The next holder of this lock must authenticate with the new secret.
	cache.reset().await;

	tracing::info!(
		application = %application.object_id,
		key_id = %credential.key_id,
		next_rotation = ?config.next_root_rotation_time,
		"rotated root credential"
	);

	Ok(credential)
}

fn root_client_id(config: &BackendConfig, fallback: &str) -> Result<String> {
	let client_id = if config.client_id.is_empty() { fallback } else { &config.client_id };

	if client_id.is_empty() {
		return Err(Error::MissingSetting("client_id"));
	}

	Ok(client_id.to_owned())
}

/// Scheduled rotation bound to the storage handle seen at initialization.
#[derive(Clone, Debug)]
pub struct RootRotator {
	cache: Arc<ClientCache>,
	locks: Arc<LockShards>,
	storage: SharedStorage,
	metrics: Arc<BackendMetrics>,
}
impl RootRotator {
	/// Bind the rotation to its collaborators.
	pub fn new(
		cache: Arc<ClientCache>,
		locks: Arc<LockShards>,
		storage: SharedStorage,
		metrics: Arc<BackendMetrics>,
	) -> Self {
		Self { cache, locks, storage, metrics }
	}

	/// Rotate once, containing and logging any failure; the next firing retries.
	pub async fn run_scheduled(&self) {
		match rotate_root(&self.cache, &self.locks, self.storage.as_ref()).await {
			Ok(_) => self.metrics.record_rotation(true),
			Err(err) => {
				self.metrics.record_rotation(false);

				tracing::error!(error = %err, "automatic root rotation failed");
			},
		}
	}
}
