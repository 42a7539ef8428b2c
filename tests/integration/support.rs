//! In-memory stand-in for the remote directory service.

// std
use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use async_trait::async_trait;
use azure_secrets::{
	Application, Backend, BackendConfig, ConnectionSettings, Error, PasswordCredential, Passwords,
	Provider, ProviderFactory, Result, config,
};
use chrono::{DateTime, TimeDelta, Utc};

pub const ROOT_CLIENT_ID: &str = "root-client";
pub const ROOT_OBJECT_ID: &str = "root-object";

#[derive(Debug, Default)]
pub struct Directory {
	apps: Mutex<HashMap<String, Application>>,
	next_key: AtomicUsize,
	in_flight: Mutex<HashMap<String, usize>>,
	pub overlaps: AtomicUsize,
	pub patch_delay: Duration,
	pub factory_calls: AtomicUsize,
}
impl Directory {
	pub fn with_root_app() -> Arc<Self> {
		Self::with_patch_delay(Duration::ZERO)
	}

	pub fn with_patch_delay(patch_delay: Duration) -> Arc<Self> {
		let directory = Self { patch_delay, ..Default::default() };

		directory.insert_app(ROOT_OBJECT_ID, ROOT_CLIENT_ID, &["old-key"]);

		Arc::new(directory)
	}

	pub fn insert_app(&self, object_id: &str, app_id: &str, keys: &[&str]) {
		let password_credentials = keys
			.iter()
			.map(|key| PasswordCredential {
				key_id: (*key).to_owned(),
				display_name: (*key).to_owned(),
				secret_text: None,
				end_date_time: Utc::now() + TimeDelta::days(30),
			})
			.collect();

		let app = Application {
			object_id: object_id.to_owned(),
			app_id: app_id.to_owned(),
			password_credentials,
		};

		self.apps.lock().expect("apps").insert(object_id.to_owned(), app);
	}

	pub fn key_ids(&self, object_id: &str) -> Vec<String> {
		self.apps
			.lock()
			.expect("apps")
			.get(object_id)
			.map(|app| app.password_credentials.iter().map(|c| c.key_id.clone()).collect())
			.unwrap_or_default()
	}

	async fn patch<T>(
		&self,
		object_id: &str,
		apply: impl FnOnce(&mut Application) -> Result<T>,
	) -> Result<T> {
		{
			let mut in_flight = self.in_flight.lock().expect("in flight");
			let count = in_flight.entry(object_id.to_owned()).or_default();

			*count += 1;

			if *count > 1 {
				self.overlaps.fetch_add(1, Ordering::SeqCst);
			}
		}

		if !self.patch_delay.is_zero() {
			tokio::time::sleep(self.patch_delay).await;
		}

		let outcome = {
			let mut apps = self.apps.lock().expect("apps");

			match apps.get_mut(object_id) {
				Some(app) => apply(app),
				None => Err(Error::Provider(format!("application '{object_id}' not found"))),
			}
		};

		*self.in_flight.lock().expect("in flight").entry(object_id.to_owned()).or_default() -= 1;

		outcome
	}
}

#[derive(Debug)]
pub struct FakeProvider {
	directory: Arc<Directory>,
}
#[async_trait]
impl Provider for FakeProvider {
	async fn get_application(&self, client_id: &str) -> Result<Application> {
		self.directory
			.apps
			.lock()
			.expect("apps")
			.values()
			.find(|app| app.app_id == client_id)
			.cloned()
			.ok_or_else(|| Error::Provider(format!("no application with client id '{client_id}'")))
	}

	async fn add_application_password(
		&self,
		application_object_id: &str,
		display_name: &str,
		end_date_time: DateTime<Utc>,
	) -> Result<PasswordCredential> {
		let n = self.directory.next_key.fetch_add(1, Ordering::SeqCst);
		let credential = PasswordCredential {
			key_id: format!("key-{n}"),
			display_name: display_name.to_owned(),
			secret_text: Some(format!("secret-{n}")),
			end_date_time,
		};

		self.directory
			.patch(application_object_id, |app| {
				let stored = PasswordCredential { secret_text: None, ..credential.clone() };

				app.password_credentials.push(stored);

				Ok(())
			})
			.await?;

		Ok(credential)
	}

	async fn remove_application_password(
		&self,
		application_object_id: &str,
		key_id: &str,
	) -> Result<()> {
		self.directory
			.patch(application_object_id, |app| {
				app.password_credentials.retain(|c| c.key_id != key_id);

				Ok(())
			})
			.await
	}
}

#[derive(Debug)]
pub struct FakeFactory {
	directory: Arc<Directory>,
}
impl ProviderFactory for FakeFactory {
	fn new_provider(
		&self,
		_: Arc<ConnectionSettings>,
		_: bool,
		_: Passwords,
	) -> Result<Arc<dyn Provider>> {
		self.directory.factory_calls.fetch_add(1, Ordering::SeqCst);

		Ok(Arc::new(FakeProvider { directory: self.directory.clone() }))
	}
}

pub fn backend(directory: &Arc<Directory>) -> Backend {
	Backend::builder()
		.provider_factory(FakeFactory { directory: directory.clone() })
		.env_lookup(|_| None)
		.build()
		.expect("backend")
}

pub fn root_config() -> BackendConfig {
	BackendConfig {
		subscription_id: "sub".into(),
		tenant_id: "tenant".into(),
		client_id: ROOT_CLIENT_ID.into(),
		client_secret: "initial-secret".into(),
		..Default::default()
	}
}

pub async fn stored_config(storage: &dyn azure_secrets::Storage) -> BackendConfig {
	config::load_config(storage).await.expect("load").expect("config present")
}
