// std
use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};
// crates.io
use azure_secrets::{ApplicationPasswordWal, Error, InMemoryStorage, WalEntry, config};
use chrono::Utc;
// self
use crate::support::{self, Directory, ROOT_CLIENT_ID, ROOT_OBJECT_ID};

#[tokio::test]
async fn manual_rotation_replaces_root_password() {
	let _ = tracing_subscriber::fmt::try_init();
	let directory = Directory::with_root_app();
	let backend = support::backend(&directory);
	let storage = InMemoryStorage::shared();
	let mut config = support::root_config();

	config.root_rotation_cadence = Duration::from_secs(24 * 3_600);

	config::save_config(storage.as_ref(), &config).await.expect("save");

	let before = backend.get_client(storage.as_ref()).await.expect("client");
	let credential = backend.rotate_root(storage.as_ref()).await.expect("rotate");
	let stored = support::stored_config(storage.as_ref()).await;

	assert_eq!(credential.key_id, "key-0");
	assert!(credential.display_name.starts_with("root-rotation-"));
	assert!(credential.end_date_time > Utc::now());
	assert_eq!(directory.key_ids(ROOT_OBJECT_ID), ["key-0"]);
	assert_eq!(stored.client_id, ROOT_CLIENT_ID);
	assert_eq!(stored.client_secret, "secret-0");
	assert!(stored.next_root_rotation_time.expect("next rotation") > Utc::now());
	assert_eq!(backend.metrics().rotation_successes, 1);

	let after = backend.get_client(storage.as_ref()).await.expect("client");

	assert!(!Arc::ptr_eq(&before, &after));
	assert_eq!(after.settings.client_secret, "secret-0");
}

#[tokio::test]
async fn rotation_without_cadence_keeps_schedule_unset() {
	let directory = Directory::with_root_app();
	let backend = support::backend(&directory);
	let storage = InMemoryStorage::shared();

	config::save_config(storage.as_ref(), &support::root_config()).await.expect("save");
	backend.rotate_root(storage.as_ref()).await.expect("rotate");

	assert!(support::stored_config(storage.as_ref()).await.next_root_rotation_time.is_none());
}

#[tokio::test]
async fn rotation_requires_configuration() {
	let directory = Directory::with_root_app();
	let backend = support::backend(&directory);
	let storage = InMemoryStorage::shared();

	assert!(matches!(backend.rotate_root(storage.as_ref()).await, Err(Error::NotConfigured)));
	assert_eq!(backend.metrics().rotation_errors, 1);
	assert_eq!(directory.factory_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rollback_removes_logged_password() {
	let directory = Directory::with_root_app();
	let backend = support::backend(&directory);
	let storage = InMemoryStorage::shared();

	directory.insert_app("app-object", "app-client", &["keep", "orphan"]);
	config::save_config(storage.as_ref(), &support::root_config()).await.expect("save");

	let entry = WalEntry::ApplicationPassword(ApplicationPasswordWal {
		application_object_id: "app-object".into(),
		key_id: "orphan".into(),
	});

	backend
		.wal_rollback(storage.as_ref(), entry.kind(), entry.data().expect("data"))
		.await
		.expect("rollback");

	assert_eq!(directory.key_ids("app-object"), ["keep"]);
}

#[tokio::test]
async fn rollback_rejects_unknown_kinds() {
	let directory = Directory::with_root_app();
	let backend = support::backend(&directory);
	let storage = InMemoryStorage::shared();

	config::save_config(storage.as_ref(), &support::root_config()).await.expect("save");

	assert!(matches!(
		backend.wal_rollback(storage.as_ref(), "role-assignment", serde_json::json!({})).await,
		Err(Error::UnknownWalKind(_))
	));
	assert_eq!(directory.factory_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rollbacks_serialize_per_application() {
	let directory = Directory::with_patch_delay(Duration::from_millis(20));
	let backend = Arc::new(support::backend(&directory));
	let storage = InMemoryStorage::shared();
	let keys = ["k0", "k1", "k2", "k3", "k4", "k5"];

	directory.insert_app("app-object", "app-client", &keys);
	config::save_config(storage.as_ref(), &support::root_config()).await.expect("save");

	let rollbacks = keys.map(|key| {
		let backend = backend.clone();
		let storage = storage.clone();
		let entry = WalEntry::ApplicationPassword(ApplicationPasswordWal {
			application_object_id: "app-object".into(),
			key_id: key.into(),
		});

		tokio::spawn(async move {
			backend.wal_rollback(storage.as_ref(), entry.kind(), entry.data().expect("data")).await
		})
	});

	for rollback in rollbacks {
		rollback.await.expect("join").expect("rollback");
	}

	assert!(directory.key_ids("app-object").is_empty());
	assert_eq!(directory.overlaps.load(Ordering::SeqCst), 0);
	assert_eq!(directory.factory_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_rotations_leave_one_live_password() {
	let directory = Directory::with_patch_delay(Duration::from_millis(50));
	let backend = Arc::new(support::backend(&directory));
	let storage = InMemoryStorage::shared();

	config::save_config(storage.as_ref(), &support::root_config()).await.expect("save");

	let rotations = [(), ()].map(|_| {
		let backend = backend.clone();
		let storage = storage.clone();

		tokio::spawn(async move { backend.rotate_root(storage.as_ref()).await })
	});

	for rotation in rotations {
		rotation.await.expect("join").expect("rotate");
	}

	let live = directory.key_ids(ROOT_OBJECT_ID);

	assert_eq!(live.len(), 1, "live root passwords: {live:?}");
	assert_eq!(
		support::stored_config(storage.as_ref()).await.client_secret,
		live[0].replace("key-", "secret-")
	);
	assert_eq!(directory.overlaps.load(Ordering::SeqCst), 0);
	assert_eq!(backend.metrics().rotation_successes, 2);
}
