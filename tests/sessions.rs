//! Session lifecycle properties: minting, expiry, caps and persistence
//! of the server state that backs them.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use lily::access::AccessSettings;
use lily::auth::session::{SessionList, DEFAULT_GEN_LIMIT};
use lily::auth::user::{User, UserList};
use lily::drive::node::Directory;
use lily::drive::Drive;
use lily::error::Error;
use lily::server::config::{load_manifest, save_manifest, Config};
use lily::server::Server;

#[tokio::test]
async fn test_minted_id_not_previously_present() {
    let list = SessionList::new(DEFAULT_GEN_LIMIT);
    let mut seen = std::collections::HashSet::new();
    for _ in 0..64 {
        let session = list.create("lily", Duration::from_secs(60), 0).await.unwrap();
        assert!(seen.insert(session.id().await));
    }
}

#[tokio::test]
async fn test_expiry_sweep_removes_and_auth_fails() {
    let list = SessionList::new(DEFAULT_GEN_LIMIT);
    let session = list.create("lily", Duration::from_millis(5), 0).await.unwrap();
    let id = session.id().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(list.expire_sessions().await, 1);
    assert!(matches!(list.get(id).await, Err(Error::SessionNotFound)));
}

#[tokio::test]
async fn test_cap_plus_one_fails() {
    let list = SessionList::new(DEFAULT_GEN_LIMIT);
    let cap = 4usize;
    for _ in 0..cap {
        list.create("lily", Duration::ZERO, cap).await.unwrap();
    }
    assert!(matches!(
        list.create("lily", Duration::ZERO, cap).await,
        Err(Error::PerUserLimitReached)
    ));
}

#[tokio::test]
async fn test_refresh_extends_expiry() {
    let list = SessionList::new(DEFAULT_GEN_LIMIT);
    let session = list.create("lily", Duration::from_millis(60), 0).await.unwrap();

    // keep authenticating past the original deadline
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        session.authenticate().await.unwrap();
    }
    assert!(!session.should_expire().await);
}

#[tokio::test]
async fn test_server_state_survives_manifest_round_trip() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join(".server.lily");

    let mut config = Config::new("persisted");
    config.file_path = manifest.clone();
    config.port = 4433;
    let users = UserList::new();
    users.add(User::new("admin", "admin", 5).unwrap()).await.unwrap();
    users.add(User::new("ada", "pw", 2).unwrap()).await.unwrap();
    save_manifest(&config, &users).await.unwrap();

    let (config, users) = load_manifest(&manifest).await.unwrap();
    assert_eq!(config.name, "persisted");
    assert_eq!(config.port, 4433);
    assert_eq!(users.usernames().await, vec!["admin", "ada"]);
    assert!(users.get("ada").await.unwrap().verify_password("pw").await.is_ok());
}

#[tokio::test]
async fn test_server_persists_dirty_drive() {
    let dir = TempDir::new().unwrap();
    let host = TempDir::new().unwrap();
    let manifest = dir.path().join(".server.lily");

    let mut config = Config::new("persisted");
    config.file_path = manifest.clone();
    let users = UserList::new();
    users.add(User::new("admin", "admin", 5).unwrap()).await.unwrap();

    let server = Server::new(config, users);
    let root = Directory::new_root(AccessSettings::new(1, 1).unwrap(), "admin");
    let drive = Arc::new(Drive::new("main", host.path(), root));
    let drive_file = dir.path().join("main.drive").display().to_string();
    server.insert_drive("main", Arc::clone(&drive), &drive_file).await.unwrap();

    lily::drive::ops::create_dirs(
        &drive,
        &["docs".to_string()],
        None,
        true,
        "admin",
        false,
    )
    .await
    .unwrap();
    assert!(drive.is_dirty().await);

    server.persist().await.unwrap();
    assert!(!drive.is_dirty().await);
    assert!(std::path::Path::new(&drive_file).is_file());

    // a fresh server loads the persisted drive back
    let (config, users) = load_manifest(&manifest).await.unwrap();
    let restored = Server::new(config, users);
    restored.load_drives().await.unwrap();
    let drive = restored.get_drive("main").await.unwrap();
    assert!(drive.dir_by_path("docs").await.is_ok());
}
