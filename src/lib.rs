//! Core of a dynamic Azure credential backend: a lazily rebuilt provider client cache,
//! per-application lock shards for non-idempotent remote mutations, and a cancellable scheduler
//! that rotates the root credential.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod locks;
pub mod metrics;
pub mod provider;
pub mod rotation;
pub mod settings;
pub mod storage;
pub mod ticker;
pub mod wal;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	backend::{Backend, BackendBuilder},
	cache::state::Client,
	config::BackendConfig,
	error::{Error, Result},
	locks::LockShards,
	provider::{
		Application, PasswordCredential, PasswordPolicyGenerator, Passwords, Provider,
		ProviderFactory,
	},
	settings::ConnectionSettings,
	storage::{InMemoryStorage, SharedStorage, Storage},
	ticker::{TaskHandle, TaskOptions, Ticker},
	wal::{ApplicationPasswordWal, WalEntry},
};
