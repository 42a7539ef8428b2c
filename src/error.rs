//! Crate-wide error types and `Result` alias.

// self
use crate::_prelude::*;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Azure secrets backend core.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Backend is not configured.")]
	NotConfigured,
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Missing required setting '{0}'.")]
	MissingSetting(&'static str),
	#[error("Password policy error: {0}")]
	PasswordPolicy(String),
	#[error("Provider error: {0}")]
	Provider(String),
	#[error("Client rebuild failed: {0}")]
	Rebuild(Arc<Error>),
	#[error("Scheduler is closed; no new tasks accepted.")]
	SchedulerClosed,
	#[error("Shutdown incomplete: {0}")]
	Shutdown(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Task '{0}' is already scheduled.")]
	TaskExists(String),
	#[error("Unknown WAL entry kind '{0}'.")]
	UnknownWalKind(String),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
#[cfg(feature = "prometheus")]
impl From<metrics_exporter_prometheus::BuildError> for Error {
	fn from(value: metrics_exporter_prometheus::BuildError) -> Self {
		Self::Metrics(value.to_string())
	}
}
