//! Integration tests for the crawler
//!
//! These tests run the full crawl cycle against a wiremock protocol gateway.

use channel_graph::config::parse_config;
use channel_graph::crawler::{import_document, run_crawl};
use channel_graph::storage::{CrawlOutcome, EdgeKind, RunStatus, SqliteStorage, Storage};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a config pointing at `gateway`, with one session file per name
fn create_test_config(
    gateway: &str,
    workdir: &TempDir,
    sessions: &[&str],
) -> channel_graph::Config {
    let session_dir = workdir.path().join("sessions");
    std::fs::create_dir_all(&session_dir).unwrap();
    for name in sessions {
        std::fs::write(session_dir.join(format!("{}.session", name)), b"").unwrap();
    }

    let toml = format!(
        r#"
categories = ["lang"]

[crawler]
workers = 1
dequeue-timeout-ms = 100
backoff-unit-ms = 1

[sessions]
directory = "{sessions}"
startup-delay-min-ms = 0
startup-delay-max-ms = 0
acquire-poll-ms = 5

[gateway]
base-url = "{gateway}"
api-id = 1
api-hash = "test"
request-timeout-secs = 5

[output]
database-path = "{database}"
"#,
        sessions = session_dir.display(),
        gateway = gateway,
        database = workdir.path().join("graph.db").display(),
    );
    parse_config(&toml).unwrap()
}

fn entity_json(id: i64, username: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "access_hash": id * 10,
        "title": title,
        "username": username,
        "date": "2021-03-04T05:06:07Z"
    })
}

async fn mount_call(server: &MockServer, session: &str, call: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/sessions/{}/call/{}", session, call)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_session(server: &MockServer, session: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/sessions/{}/connect", session)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/sessions/{}/authorized", session)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "authorized": true })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/sessions/{}/disconnect", session)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

/// `rustlang` recommends `ferris` and reposts from channel 44 (`crab`)
async fn mount_channel_world(server: &MockServer, session: &str) {
    mount_session(server, session).await;

    mount_call(
        server,
        session,
        "resolve_username",
        entity_json(42, "rustlang", "Rust"),
    )
    .await;
    mount_call(server, session, "get_channel", entity_json(44, "crab", "Crab")).await;

    for (id, username, title, subscribers) in [
        (42, "rustlang", "Rust", 1000),
        (44, "crab", "Crab", 30),
    ] {
        Mock::given(method("POST"))
            .and(path(format!("/sessions/{}/call/get_full_channel", session)))
            .and(body_partial_json(json!({ "channel": { "channel_id": id } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chats": [entity_json(id, username, title)],
                "full_chat": { "participants_count": subscribers }
            })))
            .mount(server)
            .await;
    }

    mount_call(
        server,
        session,
        "get_channel_recommendations",
        json!({ "chats": [entity_json(43, "ferris", "Ferris")] }),
    )
    .await;
    mount_call(
        server,
        session,
        "get_messages",
        json!({
            "messages": [
                { "id": 1, "text": "hello" },
                { "id": 2, "fwd_from": { "channel_id": 44 } }
            ]
        }),
    )
    .await;
}

#[tokio::test]
async fn test_full_crawl_against_gateway() {
    let server = MockServer::start().await;
    mount_channel_world(&server, "alpha").await;

    let workdir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &workdir, &["alpha"]);
    let db_path = workdir.path().join("graph.db");

    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        let document: BTreeMap<String, Vec<String>> =
            [("lang".to_string(), vec!["@RustLang".to_string()])]
                .into_iter()
                .collect();
        let report = import_document(&mut storage, &document).unwrap();
        assert_eq!(report.linked, 1);
    }

    let summary = run_crawl(config, "hash", false, &[]).await.unwrap();
    assert_eq!(summary.done, 1);
    assert_eq!(summary.messages_appended, 2);
    assert!(summary.is_complete());

    let storage = SqliteStorage::new(&db_path).unwrap();
    let alpha = storage
        .get_channel("https://t.me/rustlang")
        .unwrap()
        .expect("crawled channel stored");
    assert_eq!(alpha.channel_id, Some(42));
    assert_eq!(alpha.subscribers, Some(1000));
    assert_eq!(alpha.name.as_deref(), Some("Rust"));

    let similar = storage.list_edges(EdgeKind::Similar).unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0].target, "https://t.me/ferris");

    let related = storage.list_edges(EdgeKind::Related).unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].target, "https://t.me/crab");

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    let outcomes = storage.get_outcomes(run.id).unwrap();
    assert_eq!(outcomes["https://t.me/rustlang"], CrawlOutcome::Done);

    // Disconnect is sent when the run closes the pool
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .any(|r| r.url.path() == "/sessions/alpha/disconnect"));
}

#[tokio::test]
async fn test_banned_gateway_session_interrupts_run() {
    let server = MockServer::start().await;
    mount_session(&server, "alpha").await;
    Mock::given(method("POST"))
        .and(path("/sessions/alpha/call/resolve_username"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "USER_DEACTIVATED_BAN" })),
        )
        .mount(&server)
        .await;

    let workdir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &workdir, &["alpha"]);
    let db_path = workdir.path().join("graph.db");
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        storage.add_category_link("lang", "https://t.me/rustlang").unwrap();
    }

    let summary = run_crawl(config, "hash", false, &[]).await.unwrap();
    assert_eq!(summary.bans, 1);
    assert_eq!(summary.deferred, 1);
    assert!(!summary.is_complete());

    let storage = SqliteStorage::new(&db_path).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    assert_eq!(
        storage.get_outcomes(run.id).unwrap()["https://t.me/rustlang"],
        CrawlOutcome::Deferred
    );
}

#[tokio::test]
async fn test_interrupted_run_resumes_on_next_crawl() {
    let workdir = TempDir::new().unwrap();
    let db_path = workdir.path().join("graph.db");

    // First crawl: the only session is banned before doing anything
    {
        let server = MockServer::start().await;
        mount_session(&server, "alpha").await;
        Mock::given(method("POST"))
            .and(path("/sessions/alpha/call/resolve_username"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "error": "ACCOUNT_BANNED" })),
            )
            .mount(&server)
            .await;

        let config = create_test_config(&server.uri(), &workdir, &["alpha"]);
        {
            let mut storage = SqliteStorage::new(&db_path).unwrap();
            storage.add_category_link("lang", "https://t.me/rustlang").unwrap();
        }
        let summary = run_crawl(config, "hash", false, &[]).await.unwrap();
        assert_eq!(summary.deferred, 1);
    }

    // Second crawl against a healthy gateway picks the same run back up
    let server = MockServer::start().await;
    mount_channel_world(&server, "alpha").await;
    let config = create_test_config(&server.uri(), &workdir, &["alpha"]);
    let summary = run_crawl(config, "hash", false, &[]).await.unwrap();
    assert_eq!(summary.done, 1);

    let storage = SqliteStorage::new(&db_path).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.id, 1);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        storage.get_outcomes(run.id).unwrap()["https://t.me/rustlang"],
        CrawlOutcome::Done
    );
}

#[test]
fn test_sessions_discovered_from_directory() {
    let dir = TempDir::new().unwrap();
    for name in ["b", "a"] {
        std::fs::write(dir.path().join(format!("{}.session", name)), b"").unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

    let names = channel_graph::session::discover_sessions(Path::new(dir.path())).unwrap();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
}
