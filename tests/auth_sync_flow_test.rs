// End-to-end authorization and sync flow against a mock upstream:
// register → authorize → partial-failure sync → revoke → delete.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use fanpulse::config::{DouyinConfig, SyncConfig};
use fanpulse::douyin::{AuthFlow, MetricsClient};
use fanpulse::store::{
    AuthStatus, Database, EmployeeStore, NewEmployee, SettingsStore, SnapshotStore,
    SyncRecordStore, TokenStore, VideoStore,
};
use fanpulse::sync::SyncOrchestrator;

struct TestApp {
    employees: EmployeeStore,
    tokens: TokenStore,
    snapshots: SnapshotStore,
    auth: AuthFlow,
    orchestrator: SyncOrchestrator,
}

fn build_app(server_url: &str) -> TestApp {
    let db = Database::open(":memory:").unwrap();
    let key = BASE64.encode([9u8; 32]);

    let employees = EmployeeStore::new(db.clone());
    let tokens = TokenStore::new(db.clone(), &key).unwrap();
    let snapshots = SnapshotStore::new(db.clone());
    let videos = VideoStore::new(db.clone());
    let sync_records = SyncRecordStore::new(db.clone());
    let settings = SettingsStore::new(db);

    let douyin = DouyinConfig {
        client_key: "awtest".to_string(),
        client_secret: "secret".to_string(),
        redirect_uri: "https://dash.example.com/auth/callback".to_string(),
        api_base: server_url.to_string(),
        ..Default::default()
    };

    let auth = AuthFlow::new(douyin);
    let metrics = MetricsClient::new(server_url, 7);

    let orchestrator = SyncOrchestrator::new(
        employees.clone(),
        tokens.clone(),
        snapshots.clone(),
        videos,
        sync_records,
        settings,
        auth.clone(),
        metrics,
        SyncConfig {
            batch_pause_ms: 0,
            ..Default::default()
        },
    );

    TestApp {
        employees,
        tokens,
        snapshots,
        auth,
        orchestrator,
    }
}

fn metric_ok(field: &str, value: i64) -> String {
    format!(r#"{{"err_no": 0, "err_msg": "", "data": {{"{}": {}}}}}"#, field, value)
}

#[tokio::test]
async fn test_full_lifecycle() {
    let mut server = mockito::Server::new_async().await;

    // Token exchange succeeds with the provider's nested envelope
    let _m1 = server
        .mock("POST", "/oauth/access_token/")
        .with_status(200)
        .with_body(
            r#"{
                "data": {
                    "error_code": 0,
                    "access_token": "act.zhang",
                    "refresh_token": "rft.zhang",
                    "open_id": "open_zhang",
                    "scope": "user_info,data.external.user",
                    "expires_in": 1296000,
                    "refresh_expires_in": 2592000
                },
                "message": "success"
            }"#,
        )
        .create_async()
        .await;

    // Five metrics succeed, the likes endpoint is down
    let _m2 = server
        .mock("POST", "/data/external/user/fans/")
        .with_status(200)
        .with_body(metric_ok("fans_count", 12000))
        .create_async()
        .await;
    let _m3 = server
        .mock("POST", "/data/external/user/like/")
        .with_status(200)
        .with_body(r#"{"err_no": 20028001005, "err_msg": "system busy"}"#)
        .create_async()
        .await;
    let _m4 = server
        .mock("POST", "/data/external/user/comment/")
        .with_status(200)
        .with_body(metric_ok("comment_count", 88))
        .create_async()
        .await;
    let _m5 = server
        .mock("POST", "/data/external/user/share/")
        .with_status(200)
        .with_body(metric_ok("share_count", 31))
        .create_async()
        .await;
    let _m6 = server
        .mock("GET", "/data/external/user/profile/")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(metric_ok("home_pv", 540))
        .create_async()
        .await;
    let _m7 = server
        .mock("POST", "/data/external/user/item/")
        .with_status(200)
        .with_body(metric_ok("video_count", 12))
        .create_async()
        .await;
    let _m8 = server
        .mock("POST", "/video/list/")
        .with_status(200)
        .with_body(
            r#"{
                "extra": {"error_code": 0},
                "data": {
                    "list": [{
                        "item_id": "vid_1",
                        "title": "office tour",
                        "cover": "",
                        "statistics": {"play_count": 400, "digg_count": 20,
                                       "comment_count": 4, "share_count": 1},
                        "create_time": 1700000000,
                        "duration": 30
                    }],
                    "cursor": 1,
                    "has_more": false
                }
            }"#,
        )
        .create_async()
        .await;

    let app = build_app(&server.url());

    // 1. Register: status starts pending
    let employee = app
        .employees
        .add(NewEmployee {
            name: "Zhang".to_string(),
            department: "marketing".to_string(),
            position: "creator".to_string(),
            douyin_account: "zhang_dy".to_string(),
        })
        .unwrap();
    assert_eq!(employee.auth_status, AuthStatus::Pending);

    // 2. The authorization URL carries the employee id as state
    let url = app.auth.authorize_url(&employee.id);
    assert!(url.contains(&format!("state={}", employee.id)));

    // 3. Exchange the callback code; the token write authorizes the employee
    let grant = app.auth.exchange_code("abc123").await.unwrap();
    app.tokens.save(&employee.id, &grant).unwrap();

    let employee_now = app.employees.get(&employee.id).unwrap().unwrap();
    assert_eq!(employee_now.auth_status, AuthStatus::Authorized);
    let token = app.tokens.get(&employee.id).unwrap().unwrap();
    assert_eq!(token.open_id, "open_zhang");

    // 4. Sync: fans lands, likes keeps its prior value (zero), one failure reported
    let outcome = app.orchestrator.sync_employee(&employee.id).await.unwrap();
    assert_eq!(outcome.succeeded, 5);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("likes:"));

    let synced = app.employees.get(&employee.id).unwrap().unwrap();
    assert_eq!(synced.counters.fans_count, 12000);
    assert_eq!(synced.counters.like_count, 0);
    assert_eq!(synced.counters.video_count, 12);
    assert!(synced.last_sync_time.is_some());

    let snapshot = app.snapshots.latest(&employee.id).unwrap().unwrap();
    assert_eq!(snapshot.counters.fans_count, 12000);

    // 5. Revoke: token row gone, employee revoked
    app.tokens.delete(&employee.id).unwrap();
    let revoked = app.employees.get(&employee.id).unwrap().unwrap();
    assert_eq!(revoked.auth_status, AuthStatus::Revoked);
    assert!(app.tokens.get(&employee.id).unwrap().is_none());

    // 6. Delete: everything scoped to the employee disappears
    app.employees.delete(&employee.id).unwrap();
    assert!(app.employees.get(&employee.id).unwrap().is_none());
    assert!(app.tokens.get(&employee.id).unwrap().is_none());
    assert!(app.snapshots.history(&employee.id, 30).unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_failure_leaves_employee_pending() {
    let mut server = mockito::Server::new_async().await;
    let _m9 = server
        .mock("POST", "/oauth/access_token/")
        .with_status(200)
        .with_body(r#"{"data": {"error_code": 10008, "description": "authorization code expired"}}"#)
        .create_async()
        .await;

    let app = build_app(&server.url());
    let employee = app
        .employees
        .add(NewEmployee {
            name: "Li".to_string(),
            department: String::new(),
            position: String::new(),
            douyin_account: "li_dy".to_string(),
        })
        .unwrap();

    let err = app.auth.exchange_code("stale").await.unwrap_err();
    assert_eq!(err.to_string(), "authorization code expired");

    // No token write happened, so the status never moved
    let unchanged = app.employees.get(&employee.id).unwrap().unwrap();
    assert_eq!(unchanged.auth_status, AuthStatus::Pending);
    assert!(app.tokens.get(&employee.id).unwrap().is_none());
}
