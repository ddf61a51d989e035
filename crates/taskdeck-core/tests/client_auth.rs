//! Session/token lifecycle against a mock server: bearer attachment, the
//! 401 refresh-and-retry-once path, refresh deduplication and logout.

use std::sync::Arc;

use mockito::Matcher;
use taskdeck_core::client::ApiClient;
use taskdeck_core::error::ApiError;
use taskdeck_core::query::TaskQuery;
use taskdeck_core::session::{
    FileStorage, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN, KEY_USER, MemoryStorage, Session,
    SessionStore, StoragePort, User,
};

fn empty_page_body() -> String {
    serde_json::json!({
        "code": 200,
        "timestamp": "2024-07-01T12:00:00Z",
        "message": "No tasks found for this user.",
        "response": {
            "currentPage": 0,
            "totalPages": 0,
            "totalElements": 0,
            "pageSize": 10,
            "data": []
        }
    })
    .to_string()
}

fn session_with(access: &str, refresh: &str) -> Session {
    Session {
        user: User {
            first_name: None,
            last_name: None,
            email: "a@b.com".to_string(),
        },
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
    }
}

fn client_for(server: &mockito::ServerGuard) -> (Arc<ApiClient>, Arc<SessionStore>) {
    let sessions = Arc::new(SessionStore::open(Box::new(MemoryStorage::default())));
    let client =
        Arc::new(ApiClient::new(&server.url(), Arc::clone(&sessions)).expect("client"));
    (client, sessions)
}

#[tokio::test]
async fn task_requests_carry_the_stored_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("acc-1", "ref-1"))
        .expect("establish");

    let mock = server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_header("authorization", "Bearer acc-1")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(empty_page_body())
        .create_async()
        .await;

    client
        .fetch_tasks(&TaskQuery::default())
        .await
        .expect("fetch");
    mock.assert_async().await;
}

#[tokio::test]
async fn auth_endpoints_never_carry_a_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("acc-1", "ref-1"))
        .expect("establish");

    let mock = server
        .mock("POST", "/api/task-management/auth/v1/authenticate")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body(
            serde_json::json!({
                "status": 200,
                "message": "User Authenticated Successfully",
                "accessToken": "acc-2",
                "refreshToken": "ref-2"
            })
            .to_string(),
        )
        .create_async()
        .await;

    client.login("a@b.com", "secret").await.expect("login");
    mock.assert_async().await;
}

#[tokio::test]
async fn a_401_triggers_one_refresh_and_one_replay() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("stale", "ref-1"))
        .expect("establish");

    let rejected = server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_header("authorization", "Bearer stale")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":401,"message":"Authentication failed: token expired"}"#)
        .expect(1)
        .create_async()
        .await;

    let refresh = server
        .mock("POST", "/api/task-management/auth/v1/refresh-token")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::JsonString(r#"{"refreshToken":"ref-1"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"accessToken":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;

    let replayed = server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_header("authorization", "Bearer fresh")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(empty_page_body())
        .expect(1)
        .create_async()
        .await;

    client
        .fetch_tasks(&TaskQuery::default())
        .await
        .expect("fetch after refresh");

    rejected.assert_async().await;
    refresh.assert_async().await;
    replayed.assert_async().await;
    assert_eq!(sessions.access_token().as_deref(), Some("fresh"));
    assert_eq!(sessions.refresh_token().as_deref(), Some("ref-1"));
}

#[tokio::test]
async fn the_replay_happens_at_most_once() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("acc-1", "ref-1"))
        .expect("establish");

    // Original request and exactly one replay, never more.
    let tasks = server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":401,"message":"Authentication failed: bad token"}"#)
        .expect(2)
        .create_async()
        .await;

    let refresh = server
        .mock("POST", "/api/task-management/auth/v1/refresh-token")
        .with_status(200)
        .with_body(r#"{"accessToken":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;

    let err = client
        .fetch_tasks(&TaskQuery::default())
        .await
        .expect_err("second 401 surfaces");
    assert_eq!(err.status(), Some(401));

    tasks.assert_async().await;
    refresh.assert_async().await;
}

#[tokio::test]
async fn refresh_failure_clears_the_session() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("stale", "ref-1"))
        .expect("establish");

    server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":401,"message":"Authentication failed"}"#)
        .create_async()
        .await;

    server
        .mock("POST", "/api/task-management/auth/v1/refresh-token")
        .with_status(401)
        .with_body(r#"{"status":401,"message":"Invalid token: expired"}"#)
        .create_async()
        .await;

    let err = client
        .fetch_tasks(&TaskQuery::default())
        .await
        .expect_err("refresh rejected");
    assert!(matches!(err, ApiError::SessionExpired));
    assert!(sessions.session().is_none());
}

#[tokio::test]
async fn concurrent_401s_share_a_single_refresh() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("stale", "ref-1"))
        .expect("establish");

    let rejected = server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_header("authorization", "Bearer stale")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":401,"message":"Authentication failed"}"#)
        .expect_at_least(1)
        .expect_at_most(2)
        .create_async()
        .await;

    let refresh = server
        .mock("POST", "/api/task-management/auth/v1/refresh-token")
        .with_status(200)
        .with_body(r#"{"accessToken":"fresh"}"#)
        .expect(1)
        .create_async()
        .await;

    let replayed = server
        .mock("GET", "/api/task-management/v1/tasks")
        .match_header("authorization", "Bearer fresh")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(empty_page_body())
        .expect_at_least(1)
        .expect_at_most(2)
        .create_async()
        .await;

    let query = TaskQuery::default();
    let (left, right) = tokio::join!(client.fetch_tasks(&query), client.fetch_tasks(&query));
    left.expect("first concurrent fetch");
    right.expect("second concurrent fetch");

    rejected.assert_async().await;
    refresh.assert_async().await;
    replayed.assert_async().await;
    assert_eq!(sessions.access_token().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn login_persists_to_both_store_and_storage() {
    let mut server = mockito::Server::new_async().await;
    let temp = tempfile::tempdir().expect("tempdir");

    let storage = FileStorage::open(temp.path()).expect("storage");
    let sessions = Arc::new(SessionStore::open(Box::new(storage)));
    let client = ApiClient::new(&server.url(), Arc::clone(&sessions)).expect("client");

    server
        .mock("POST", "/api/task-management/auth/v1/authenticate")
        .match_body(Matcher::JsonString(
            r#"{"email":"a@b.com","password":"secret"}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"accessToken":"acc","refreshToken":"ref"}"#)
        .create_async()
        .await;

    let session = client.login("a@b.com", "secret").await.expect("login");
    assert_eq!(session.user.email, "a@b.com");
    assert_eq!(sessions.access_token().as_deref(), Some("acc"));

    // The persisted copy must match what the store holds.
    let reopened = FileStorage::open(temp.path()).expect("reopen");
    assert_eq!(reopened.get(KEY_ACCESS_TOKEN).as_deref(), Some("acc"));
    assert_eq!(reopened.get(KEY_REFRESH_TOKEN).as_deref(), Some("ref"));
    let user: serde_json::Value =
        serde_json::from_str(&reopened.get(KEY_USER).expect("user key")).expect("json");
    assert_eq!(user["email"], "a@b.com");
}

#[tokio::test]
async fn failed_logout_keeps_the_session() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("acc-1", "ref-1"))
        .expect("establish");

    server
        .mock("POST", "/api/task-management/auth/v1/logout")
        .with_status(500)
        .with_body(r#"{"code":500,"message":"Unexpected server error: db down"}"#)
        .create_async()
        .await;

    client.logout().await.expect_err("logout fails");
    assert!(sessions.session().is_some(), "session must survive a failed logout");
}

#[tokio::test]
async fn successful_logout_clears_the_session() {
    let mut server = mockito::Server::new_async().await;
    let (client, sessions) = client_for(&server);
    sessions
        .establish(session_with("acc-1", "ref-1"))
        .expect("establish");

    server
        .mock("POST", "/api/task-management/auth/v1/logout")
        .match_header("authorization", "Bearer acc-1")
        .match_body(Matcher::JsonString(r#"{"refreshToken":"ref-1"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"code":200,"message":"Logout successful"}"#)
        .create_async()
        .await;

    client.logout().await.expect("logout");
    assert!(sessions.session().is_none());
}
