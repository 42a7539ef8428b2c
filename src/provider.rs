//! Capabilities supplied by the host: the remote identity provider, its factory, and password
//! generation.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use async_trait::async_trait;
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, settings::ConnectionSettings};

/// Length of passwords generated without a named policy.
pub const PASSWORD_LENGTH: usize = 36;

/// Password credential attached to an application registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordCredential {
	/// Identifier of the credential within the application.
	pub key_id: String,
	/// Human-readable label.
	pub display_name: String,
	/// Secret value; only populated in the response that created it.
	pub secret_text: Option<String>,
	/// When the credential stops being accepted.
	pub end_date_time: DateTime<Utc>,
}

/// Application registration as seen by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Application {
	/// Directory object identifier; the target of password mutations.
	pub object_id: String,
	/// Application (client) identifier.
	pub app_id: String,
	/// Password credentials currently attached.
	pub password_credentials: Vec<PasswordCredential>,
}

/// Authenticated handle to the remote identity-management service.
///
/// Password mutations against one application patch a single document remotely; callers
/// serialize them through [`crate::locks::LockShards`].
#[async_trait]
pub trait Provider: Send + Sync + Debug {
	/// Look up an application by its client identifier.
	async fn get_application(&self, client_id: &str) -> Result<Application>;

	/// Add a password credential to the application.
	async fn add_application_password(
		&self,
		application_object_id: &str,
		display_name: &str,
		end_date_time: DateTime<Utc>,
	) -> Result<PasswordCredential>;

	/// Remove a password credential from the application.
	async fn remove_application_password(
		&self,
		application_object_id: &str,
		key_id: &str,
	) -> Result<()>;
}

/// Builds provider handles for the client cache.
pub trait ProviderFactory: Send + Sync {
	/// Construct a provider from resolved settings.
	fn new_provider(
		&self,
		settings: Arc<ConnectionSettings>,
		use_microsoft_graph_api: bool,
		passwords: Passwords,
	) -> Result<Arc<dyn Provider>>;
}
impl<F> ProviderFactory for F
where
	F: Fn(Arc<ConnectionSettings>, bool, Passwords) -> Result<Arc<dyn Provider>> + Send + Sync,
{
	fn new_provider(
		&self,
		settings: Arc<ConnectionSettings>,
		use_microsoft_graph_api: bool,
		passwords: Passwords,
	) -> Result<Arc<dyn Provider>> {
		self(settings, use_microsoft_graph_api, passwords)
	}
}

/// Host password-policy evaluator.
#[async_trait]
pub trait PasswordPolicyGenerator: Send + Sync {
	/// Generate a password that satisfies the named policy.
	async fn generate_password_from_policy(&self, policy_name: &str) -> Result<String>;
}

/// Evaluator used when the host does not provide one; every named policy fails.
#[derive(Clone, Debug, Default)]
pub struct UnavailablePolicyGenerator;
#[async_trait]
impl PasswordPolicyGenerator for UnavailablePolicyGenerator {
	async fn generate_password_from_policy(&self, policy_name: &str) -> Result<String> {
		Err(Error::PasswordPolicy(format!(
			"Policy '{policy_name}' cannot be evaluated without a policy generator."
		)))
	}
}

/// Password-generation context handed to providers.
#[derive(Clone)]
pub struct Passwords {
	/// Evaluator for named policies.
	pub policy_generator: Arc<dyn PasswordPolicyGenerator>,
	/// Configured policy, if any.
	pub policy_name: Option<String>,
}
impl Passwords {
	/// Generate a password from the configured policy, or a random base62 string.
	pub async fn generate(&self) -> Result<String> {
		match &self.policy_name {
			Some(name) => self.policy_generator.generate_password_from_policy(name).await,
			None => Ok(random_base62(PASSWORD_LENGTH)),
		}
	}
}
impl Debug for Passwords {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("Passwords").field("policy_name", &self.policy_name).finish_non_exhaustive()
	}
}

fn random_base62(len: usize) -> String {
	rand::rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}
