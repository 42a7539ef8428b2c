//! Durable key/value storage interface consumed by the backend.
//!
//! The host owns persistence; the backend only reads its configuration record and writes it back
//! after a root rotation.

// std
use std::collections::BTreeMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
// self
use crate::_prelude::*;

/// Storage handle shared between request handlers and scheduled work.
pub type SharedStorage = Arc<dyn Storage>;

/// Host-provided key/value storage.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
	/// Read the raw value stored under `key`.
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

	/// Write `value` under `key`, replacing any previous value.
	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

	/// Remove `key`; removing an absent key is not an error.
	async fn delete(&self, key: &str) -> Result<()>;

	/// List keys beginning with `prefix`, in lexical order.
	async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process [`Storage`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
	entries: RwLock<BTreeMap<String, Vec<u8>>>,
}
impl InMemoryStorage {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Create an empty store already wrapped for sharing.
	pub fn shared() -> SharedStorage {
		Arc::new(Self::new())
	}
}
#[async_trait]
impl Storage for InMemoryStorage {
	async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
		self.entries.write().await.insert(key.to_owned(), value);

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		self.entries.write().await.remove(key);

		Ok(())
	}

	async fn list(&self, prefix: &str) -> Result<Vec<String>> {
		let entries = self.entries.read().await;

		Ok(entries.keys().filter(|key| key.starts_with(prefix)).cloned().collect())
	}
}
