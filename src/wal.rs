//! Write-ahead-log entries for remote mutations and their rollback.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, cache::manager::ClientCache, locks::LockShards, storage::Storage};

/// Minimum age before the host may roll back an entry; role assignment can take minutes.
pub const WAL_ROLLBACK_MIN_AGE: Duration = Duration::from_secs(10 * 60);
/// Kind tag for [`WalEntry::ApplicationPassword`].
pub const WAL_KIND_APPLICATION_PASSWORD: &str = "application-password";

/// Password added to an application whose outcome may be uncertain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationPasswordWal {
	/// Directory object identifier of the application.
	pub application_object_id: String,
	/// Identifier of the password credential to remove on rollback.
	pub key_id: String,
}

/// Remote mutation recorded before it is attempted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalEntry {
	/// An application password was (possibly) created.
	ApplicationPassword(ApplicationPasswordWal),
}
impl WalEntry {
	/// Kind tag the host stores alongside the entry data.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ApplicationPassword(_) => WAL_KIND_APPLICATION_PASSWORD,
		}
	}

	/// Entry data as stored by the host.
	pub fn data(&self) -> Result<serde_json::Value> {
		match self {
			Self::ApplicationPassword(entry) => Ok(serde_json::to_value(entry)?),
		}
	}

	/// Decode an entry from its kind tag and data.
	pub fn decode(kind: &str, data: serde_json::Value) -> Result<Self> {
		match kind {
			WAL_KIND_APPLICATION_PASSWORD =>
				Ok(Self::ApplicationPassword(serde_json::from_value(data)?)),
			other => Err(Error::UnknownWalKind(other.to_owned())),
		}
	}
}

/// Undo a logged mutation under the same per-application lock as forward mutations.
#[tracing::instrument(skip(cache, locks, storage, data))]
pub async fn rollback(
	cache: &ClientCache,
	locks: &LockShards,
	storage: &dyn Storage,
	kind: &str,
	data: serde_json::Value,
) -> Result<()> {
	match WalEntry::decode(kind, data)? {
		WalEntry::ApplicationPassword(entry) => {
			let client = cache.get_client(storage).await?;
			let _guard = locks.lock(&entry.application_object_id).await;

			client
				.provider
				.remove_application_password(&entry.application_object_id, &entry.key_id)
				.await?;

			tracing::debug!(
				application = %entry.application_object_id,
				key_id = %entry.key_id,
				"rolled back application password"
			);

			Ok(())
		},
	}
}
