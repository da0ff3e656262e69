//! End-to-end protocol scenarios: a request frame goes in through the
//! connection handler, a response frame comes out.

use std::io::Cursor;
use std::sync::Arc;

use bson::{doc, Document};
use tempfile::TempDir;

use lily::access::AccessSettings;
use lily::auth::user::{User, UserList};
use lily::drive::node::Directory;
use lily::drive::Drive;
use lily::server::config::Config;
use lily::server::{conn, Server};
use lily::wire::chunk::{ChunkHandler, ChunkInfo};
use lily::wire::request::{build_request, AuthRequest};
use lily::wire::response::{parse_status, Status};
use lily::wire::stream::{DataStream, MemoryStream};

const EMPTY_ENVELOPE: &[u8] = &[0x00, 0x00, b'E', b'N', b'D'];

async fn test_server(host: &TempDir) -> Arc<Server> {
    let mut config = Config::new("testserver");
    config.allow_non_expiring_sessions = true;
    config.allow_change_session_expiration = true;

    let users = UserList::new();
    users.add(User::new("admin", "admin", 5).unwrap()).await.unwrap();
    users.set_dirty(false).await;

    let server = Server::new(config, users);
    let root = Directory::new_root(AccessSettings::new(1, 1).unwrap(), "admin");
    let drive = Arc::new(Drive::new("main", host.path(), root));
    let drive_file = host.path().join("main.drive").display().to_string();
    server.insert_drive("main", drive, &drive_file).await.unwrap();
    server
}

fn admin_auth() -> AuthRequest {
    AuthRequest::User { username: "admin".to_string(), password: "admin".to_string() }
}

/// Sends one request and returns the parsed status plus any response
/// chunk payloads.
async fn roundtrip(
    server: &Arc<Server>,
    auth: &AuthRequest,
    command: &str,
    args: Document,
    request_envelope: &[u8],
) -> (Status, Vec<(String, Vec<u8>)>) {
    let mut frame = build_request(auth, command, &args).unwrap();
    frame.extend_from_slice(request_envelope);

    let mut stream = MemoryStream::new(frame);
    conn::handle(Arc::clone(server), &mut stream).await;

    let mut response = MemoryStream::new(stream.into_output());
    let mut preamble = [0u8; 5];
    response.read_exact(&mut preamble).await.unwrap();
    assert_eq!(&preamble, b"LILY0");

    let mut chunks = Vec::new();
    {
        let mut reader = ChunkHandler::new(&mut response);
        let header = reader.read_header().await.unwrap();
        for info in &header {
            for _ in 0..info.num_chunks {
                chunks.push((info.name.clone(), reader.read_chunk(&info.name).await.unwrap()));
            }
        }
    }

    let mut len_bytes = [0u8; 2];
    response.read_exact(&mut len_bytes).await.unwrap();
    let mut block = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
    response.read_exact(&mut block).await.unwrap();
    let mut full = len_bytes.to_vec();
    full.extend_from_slice(&block);
    (parse_status(&mut Cursor::new(full)).unwrap(), chunks)
}

#[tokio::test]
async fn test_ping_with_null_auth() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    let (status, chunks) =
        roundtrip(&server, &AuthRequest::Null, "ping", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 0);
    assert_eq!(status.message, "");
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn test_unknown_command() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    let (status, _) =
        roundtrip(&server, &admin_auth(), "teleport", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 1);
}

#[tokio::test]
async fn test_fs_command_needs_auth() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    let (status, _) = roundtrip(
        &server,
        &AuthRequest::Null,
        "list",
        doc! { "drive": "main", "path": "" },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 4);
}

#[tokio::test]
async fn test_bad_password_rejected() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    let auth = AuthRequest::User { username: "admin".into(), password: "nope".into() };
    let (status, _) = roundtrip(&server, &auth, "ping", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 4);
}

#[tokio::test]
async fn test_login_then_session_auth() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "login",
        doc! { "sessionexpiration": 0i64 },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);
    let id = status.data.get_binary_generic("id").unwrap();
    assert_eq!(id.len(), 16);

    let mut session_id = [0u8; 16];
    session_id.copy_from_slice(id);
    let session_auth =
        AuthRequest::Session { username: "admin".to_string(), id: session_id };
    let (status, _) = roundtrip(&server, &session_auth, "info", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 0);
    assert_eq!(status.data.get_str("name").unwrap(), "testserver");

    // logout kills the session; reuse fails with code 12
    let (status, _) =
        roundtrip(&server, &session_auth, "logout", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 0);
    let (status, _) = roundtrip(&server, &session_auth, "info", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 12);
}

#[tokio::test]
async fn test_non_expiring_login_disallowed() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    server.config().write().await.allow_non_expiring_sessions = false;

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "login",
        doc! { "sessionexpiration": 0i64 },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 5);
}

#[tokio::test]
async fn test_create_then_list() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "createdirs",
        doc! { "drive": "main", "paths": ["a", "b", "c"], "useparentsettings": true },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "list",
        doc! { "drive": "main", "path": "." },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);
    let entries = status.data.get_array("entries").unwrap();
    let names: Vec<&str> = entries
        .iter()
        .map(|e| e.as_document().unwrap().get_str("name").unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    for entry in entries {
        let entry = entry.as_document().unwrap();
        assert!(!entry.get_bool("isfile").unwrap());
        assert_eq!(entry.get_str("lasteditor").unwrap(), "admin");
    }
}

#[tokio::test]
async fn test_read_partial_chunks() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "createfiles",
        doc! { "drive": "main", "paths": ["foo"], "useparentsettings": true },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);
    std::fs::write(host.path().join("foo"), b"hello world").unwrap();

    let (status, chunks) = roundtrip(
        &server,
        &admin_auth(),
        "readfiles",
        doc! {
            "drive": "main",
            "paths": ["foo"],
            "starts": [0i64],
            "ends": [-1i64],
            "chunksize": 6i64,
        },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0], ("foo".to_string(), b"hello ".to_vec()));
    assert_eq!(chunks[1], ("foo".to_string(), b"world".to_vec()));
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;

    roundtrip(
        &server,
        &admin_auth(),
        "createfiles",
        doc! { "drive": "main", "paths": ["data.bin"], "useparentsettings": true },
        EMPTY_ENVELOPE,
    )
    .await;

    // client-side envelope: two chunks of the payload
    let payload = b"the quick brown fox jumps over the lazy dog";
    let envelope = {
        let mut out = MemoryStream::default();
        {
            let mut writer = ChunkHandler::new(&mut out);
            writer.write_header(&[ChunkInfo::new("data.bin", 2)]).await.unwrap();
            writer.write_chunk("data.bin", &payload[..20]).await.unwrap();
            writer.write_chunk("data.bin", &payload[20..]).await.unwrap();
        }
        out.into_output()
    };

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "writefiles",
        doc! {
            "drive": "main",
            "paths": ["data.bin"],
            "starts": [0i64],
            "clears": [false],
        },
        &envelope,
    )
    .await;
    assert_eq!(status.code, 0);
    assert_eq!(std::fs::read(host.path().join("data.bin")).unwrap(), payload);

    let (status, chunks) = roundtrip(
        &server,
        &admin_auth(),
        "readfiles",
        doc! {
            "drive": "main",
            "paths": ["data.bin"],
            "starts": [0i64],
            "ends": [-1i64],
            "chunksize": 7i64,
        },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);
    let collected: Vec<u8> = chunks.into_iter().flat_map(|(_, data)| data).collect();
    assert_eq!(collected, payload);
}

#[tokio::test]
async fn test_rename_preserves_settings() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;

    let settings = doc! {
        "accessclearance": 2i32,
        "modifyclearance": 3i32,
        "accesswhitelist": ["lily"],
    };
    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "createfiles",
        doc! { "drive": "main", "paths": ["a"], "settings": [settings] },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "renamefiles",
        doc! { "drive": "main", "paths": ["a"], "newnames": ["b"] },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);

    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "getsettings",
        doc! { "drive": "main", "path": "b" },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 0);
    let restored = status.data.get_document("settings").unwrap();
    assert_eq!(restored.get_i32("accessclearance").unwrap(), 2);
    assert_eq!(restored.get_i32("modifyclearance").unwrap(), 3);
    let whitelist = restored.get_array("accesswhitelist").unwrap();
    assert_eq!(whitelist.len(), 1);
}

#[tokio::test]
async fn test_drive_not_found() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    let (status, _) = roundtrip(
        &server,
        &admin_auth(),
        "list",
        doc! { "drive": "ghost", "path": "" },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 13);
}

#[tokio::test]
async fn test_admin_command_requires_clearance() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    server
        .users()
        .add(User::new("guest", "guest", 1).unwrap())
        .await
        .unwrap();

    let guest = AuthRequest::User { username: "guest".into(), password: "guest".into() };
    let (status, _) = roundtrip(
        &server,
        &guest,
        "adduser",
        doc! { "username": "x", "password": "x", "clearance": 1i32 },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 7);
}

#[tokio::test]
async fn test_clearance_gates_fs_access() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    // raise the root's bar above the guest's clearance
    let drive = server.get_drive("main").await.unwrap();
    drive
        .root()
        .write()
        .await
        .set_settings(AccessSettings::new(3, 3).unwrap());
    server
        .users()
        .add(User::new("guest", "guest", 1).unwrap())
        .await
        .unwrap();

    let guest = AuthRequest::User { username: "guest".into(), password: "guest".into() };
    let (status, _) = roundtrip(
        &server,
        &guest,
        "list",
        doc! { "drive": "main", "path": "" },
        EMPTY_ENVELOPE,
    )
    .await;
    assert_eq!(status.code, 7);
}

#[tokio::test]
async fn test_user_not_found() {
    let host = TempDir::new().unwrap();
    let server = test_server(&host).await;
    let auth = AuthRequest::User { username: "nobody".into(), password: "x".into() };
    let (status, _) = roundtrip(&server, &auth, "ping", doc! {}, EMPTY_ENVELOPE).await;
    assert_eq!(status.code, 8);
}
