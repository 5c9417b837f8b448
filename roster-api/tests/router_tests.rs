//! Router tests for the Roster API
//!
//! Drives the full router with `oneshot` against fake backends:
//! - `/status` stays up while both backends are down
//! - store failures map to the database error page
//! - cache failures are invisible to the client
//! - the session cookie carries the visit count across requests
//! - instances sharing the cache server share session counts

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use roster_api::{build_session_store, create_router, AppState};
use roster_core::{RowSet, SessionBackend, StoreError, TableName};
use roster_storage::{CacheClient, RecordStore, RedisSessionStore, SessionStore};
use roster_test_utils::fixtures::{employee_rows, test_config};
use roster_test_utils::{InMemoryCache, InMemorySessionStore, ScriptedRecordStore, UnreachableCache};
use tower::ServiceExt;

const DB_ERROR_BODY: &str = "<h3>Database Connection Error</h3><p>Please try again later.</p>";
const APP_ERROR_BODY: &str = "<h3>Application Error</h3><p>An unexpected error occurred.</p>";

fn app_with(store: Arc<dyn RecordStore>, cache: Arc<dyn CacheClient>) -> Router {
    app_with_sessions(store, cache, Arc::new(InMemorySessionStore::new()))
}

fn app_with_sessions(
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheClient>,
    sessions: Arc<dyn SessionStore>,
) -> Router {
    let state = AppState::from_config(&test_config(), store, cache, sessions).unwrap();
    create_router(state)
}

struct Reply {
    status: StatusCode,
    set_cookie: Option<String>,
    body: String,
}

impl Reply {
    /// The `name=value` pair of the Set-Cookie header.
    fn cookie_pair(&self) -> String {
        let set_cookie = self.set_cookie.as_deref().expect("expected Set-Cookie");
        set_cookie.split(';').next().unwrap().to_string()
    }
}

async fn get(app: &Router, path: &str, cookie: Option<&str>) -> Reply {
    let mut request = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    let response = app
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|value| value.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        set_cookie,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

// ============================================================================
// /status
// ============================================================================

#[tokio::test]
async fn test_status_ok_with_backends_down() {
    let store = Arc::new(ScriptedRecordStore::failing(StoreError::connection("refused")));
    let cache = Arc::new(UnreachableCache::new());
    let app = app_with(store.clone(), cache.clone());

    let reply = get(&app, "/status", None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, "ok");
    assert_eq!(store.calls(), 0);
    assert_eq!(cache.calls(), 0);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let app = app_with(
        Arc::new(ScriptedRecordStore::returning(employee_rows())),
        Arc::new(InMemoryCache::new()),
    );
    assert_eq!(get(&app, "/nope", None).await.status, StatusCode::NOT_FOUND);
}

// ============================================================================
// / with backend failures
// ============================================================================

#[tokio::test]
async fn test_store_down_renders_database_error() {
    let store = Arc::new(ScriptedRecordStore::failing(StoreError::connection("refused")));
    let app = app_with(store, Arc::new(InMemoryCache::new()));

    let reply = get(&app, "/", None).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, DB_ERROR_BODY);
    assert!(reply.set_cookie.is_some());
}

#[tokio::test]
async fn test_cache_down_still_renders_rows() {
    let store = Arc::new(ScriptedRecordStore::returning(employee_rows()));
    let app = app_with(store.clone(), Arc::new(UnreachableCache::new()));

    for _ in 0..2 {
        let reply = get(&app, "/", None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("Ada Lovelace"));
        assert!(reply.body.contains("grace@example.com"));
    }
    assert_eq!(store.calls(), 2);
}

struct PanickingStore;

#[async_trait]
impl RecordStore for PanickingStore {
    async fn fetch_all(&self, _table: &TableName) -> Result<RowSet, StoreError> {
        panic!("store exploded");
    }
}

#[tokio::test]
async fn test_handler_panic_renders_application_error() {
    let app = app_with(Arc::new(PanickingStore), Arc::new(InMemoryCache::new()));

    let reply = get(&app, "/", None).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body, APP_ERROR_BODY);
}

// ============================================================================
// / happy path
// ============================================================================

#[tokio::test]
async fn test_second_request_served_from_cache() {
    let store = Arc::new(ScriptedRecordStore::returning(employee_rows()));
    let cache = Arc::new(InMemoryCache::new());
    let app = app_with(store.clone(), cache.clone());

    let first = get(&app, "/", None).await;
    let second = get(&app, "/", None).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(store.calls(), 1);
    assert_eq!(cache.write_count(), 1);
    assert!(second.body.contains("Served by test-host (version 9.9)"));
}

#[tokio::test]
async fn test_visits_count_up_within_session() {
    let app = app_with(
        Arc::new(ScriptedRecordStore::returning(employee_rows())),
        Arc::new(InMemoryCache::new()),
    );

    let first = get(&app, "/", None).await;
    assert!(first.body.contains("Visits this session: 1"));
    let cookie = first.cookie_pair();
    assert!(cookie.starts_with("session="));

    for expected in 2..=4 {
        let reply = get(&app, "/", Some(&cookie)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply
            .body
            .contains(&format!("Visits this session: {}", expected)));
        assert!(reply.set_cookie.is_none());
    }
}

#[tokio::test]
async fn test_sessions_do_not_share_counts() {
    let app = app_with(
        Arc::new(ScriptedRecordStore::returning(employee_rows())),
        Arc::new(InMemoryCache::new()),
    );

    let alice = get(&app, "/", None).await.cookie_pair();
    get(&app, "/", Some(&alice)).await;
    let bob = get(&app, "/", None).await;

    assert!(bob.body.contains("Visits this session: 1"));
    assert_ne!(bob.cookie_pair(), alice);
}

#[tokio::test]
async fn test_tampered_cookie_starts_new_session() {
    let app = app_with(
        Arc::new(ScriptedRecordStore::returning(employee_rows())),
        Arc::new(InMemoryCache::new()),
    );

    let cookie = get(&app, "/", None).await.cookie_pair();
    get(&app, "/", Some(&cookie)).await;

    let mut forged = cookie.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == 'a' { 'b' } else { 'a' });

    let reply = get(&app, "/", Some(&forged)).await;
    assert!(reply.body.contains("Visits this session: 1"));
    assert!(reply.set_cookie.is_some());
    assert_ne!(reply.cookie_pair(), cookie);
}

// ============================================================================
// shared sessions
// ============================================================================

#[tokio::test]
async fn test_instances_sharing_cache_share_visit_counts() {
    let shared = Arc::new(InMemoryCache::new());
    let instance = || {
        app_with_sessions(
            Arc::new(ScriptedRecordStore::returning(employee_rows())),
            shared.clone(),
            Arc::new(RedisSessionStore::new(
                shared.clone(),
                std::time::Duration::from_secs(600),
            )),
        )
    };
    let (web_1, web_2) = (instance(), instance());

    let cookie = get(&web_1, "/", None).await.cookie_pair();
    let second = get(&web_2, "/", Some(&cookie)).await;
    let third = get(&web_1, "/", Some(&cookie)).await;

    assert!(second.body.contains("Visits this session: 2"));
    assert!(third.body.contains("Visits this session: 3"));
}

#[tokio::test]
async fn test_redis_sessions_fall_back_when_redis_is_down() {
    let dead_port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut config = test_config();
    config.cache.host = "127.0.0.1".to_string();
    config.cache.port = dead_port;
    config.cache.timeout = std::time::Duration::from_millis(200);
    assert_eq!(config.session.backend, SessionBackend::Redis);

    let app = app_with_sessions(
        Arc::new(ScriptedRecordStore::returning(employee_rows())),
        Arc::new(UnreachableCache::new()),
        build_session_store(&config),
    );

    let first = get(&app, "/", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert!(first.body.contains("Visits this session: 1"));

    let second = get(&app, "/", Some(&first.cookie_pair())).await;
    assert_eq!(second.status, StatusCode::OK);
    assert!(second.body.contains("Visits this session: 2"));
}

#[tokio::test]
async fn test_cookieless_requests_keep_session_store_bounded() {
    let sessions = Arc::new(InMemorySessionStore::with_limits(
        std::time::Duration::from_secs(3600),
        50,
    ));
    let app = app_with_sessions(
        Arc::new(ScriptedRecordStore::returning(employee_rows())),
        Arc::new(InMemoryCache::new()),
        sessions.clone(),
    );

    for _ in 0..1_000 {
        assert_eq!(get(&app, "/", None).await.status, StatusCode::OK);
    }
    assert_eq!(sessions.len(), 50);
}
