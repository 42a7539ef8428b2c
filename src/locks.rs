//! Fixed-size lock shards keyed by identity strings.
//!
//! Two operations on the same identity always land on the same shard. Unrelated identities may
//! share a shard and contend with each other; the shard array never grows, so the mapping is stable
//! for the lifetime of the set.

// crates.io
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard};
// self
use crate::_prelude::*;

/// Default number of shards.
pub const DEFAULT_SHARD_COUNT: usize = 256;

/// Pre-allocated set of independent mutexes.
#[derive(Debug)]
pub struct LockShards {
	shards: Box<[Mutex<()>]>,
}
impl LockShards {
	/// Create a set with `count` shards.
	pub fn new(count: usize) -> Result<Self> {
		if count == 0 {
			return Err(Error::Validation {
				field: "shard_count",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(Self { shards: (0..count).map(|_| Mutex::new(())).collect() })
	}

	/// Number of shards in the set.
	pub fn len(&self) -> usize {
		self.shards.len()
	}

	/// Whether the set holds no shards; never true for a constructed set.
	pub fn is_empty(&self) -> bool {
		self.shards.is_empty()
	}

	/// Index of the shard guarding `identity`.
	pub fn shard_index(&self, identity: &str) -> usize {
		let digest = Sha256::digest(identity.as_bytes());
		let mut prefix = [0u8; 8];

		prefix.copy_from_slice(&digest[..8]);

		(u64::from_be_bytes(prefix) % self.shards.len() as u64) as usize
	}

	/// Shard guarding `identity`.
	pub fn lock_for(&self, identity: &str) -> &Mutex<()> {
		&self.shards[self.shard_index(identity)]
	}

	/// Acquire the shard guarding `identity`; released when the guard drops.
	pub async fn lock(&self, identity: &str) -> MutexGuard<'_, ()> {
		tracing::trace!(identity, shard = self.shard_index(identity), "acquiring identity lock");

		self.lock_for(identity).lock().await
	}
}
impl Default for LockShards {
	fn default() -> Self {
		Self { shards: (0..DEFAULT_SHARD_COUNT).map(|_| Mutex::new(())).collect() }
	}
}
