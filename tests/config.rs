use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use registry_guard::{
    app::{AppState, build_router},
    config::{ConfigError, ReloadPolicy},
    config_store::ConfigStore,
    upstream::Upstream,
};
use std::{
    io::Write,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tempfile::NamedTempFile;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

fn write_config(file: &mut NamedTempFile, body: &str, bump: u64) {
    let handle = file.as_file_mut();
    handle.set_len(0).expect("truncate");
    let mut writer = file.reopen().expect("reopen");
    writer.write_all(body.as_bytes()).expect("write");
    writer.flush().expect("flush");
    writer
        .set_modified(SystemTime::now() + Duration::from_secs(bump))
        .expect("mtime");
}

fn users(registry: &str, password: &str) -> String {
    format!(
        "registry: {registry}\nusers:\n  - name: alice\n    password: {password}\n    role: admin\n"
    )
}

async fn status_for(app: &axum::Router, password: &str) -> StatusCode {
    let req = Request::builder()
        .uri("/v2/")
        .header(
            header::AUTHORIZATION,
            format!("Basic {}", B64.encode(format!("alice:{password}"))),
        )
        .body(Body::empty())
        .expect("request");
    app.clone().oneshot(req).await.expect("response").status()
}

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

#[test]
fn duplicate_user_names_abort_loading() {
    let mut file = NamedTempFile::new().expect("temp file");
    write_config(
        &mut file,
        concat!(
            "users:\n",
            "  - name: alice\n    password: one\n    role: admin\n",
            "  - name: alice\n    password: two\n    role: reader\n",
        ),
        0,
    );
    let err = ConfigStore::open(Some(file.path().to_path_buf()), ReloadPolicy::Static)
        .expect_err("duplicate user");
    assert!(matches!(err, ConfigError::DuplicateUser(name) if name == "alice"));
}

#[tokio::test]
async fn on_change_policy_picks_up_edited_file() {
    let server = backend().await;
    let mut file = NamedTempFile::new().expect("temp file");
    write_config(&mut file, &users(&server.uri(), "first"), 0);
    let store = ConfigStore::open(Some(file.path().to_path_buf()), ReloadPolicy::OnChange)
        .expect("open");
    let app = build_router(AppState::new(Arc::new(store), Upstream::new().expect("client")));

    assert_eq!(status_for(&app, "first").await, StatusCode::OK);

    write_config(&mut file, &users(&server.uri(), "second"), 5);
    assert_eq!(status_for(&app, "first").await, StatusCode::UNAUTHORIZED);
    assert_eq!(status_for(&app, "second").await, StatusCode::OK);
}

#[tokio::test]
async fn broken_edit_keeps_serving_previous_snapshot() {
    let server = backend().await;
    let mut file = NamedTempFile::new().expect("temp file");
    write_config(&mut file, &users(&server.uri(), "first"), 0);
    let store = ConfigStore::open(Some(file.path().to_path_buf()), ReloadPolicy::OnChange)
        .expect("open");
    let app = build_router(AppState::new(Arc::new(store), Upstream::new().expect("client")));

    write_config(&mut file, "users: [not closed", 5);
    assert_eq!(status_for(&app, "first").await, StatusCode::OK);
}

#[tokio::test]
async fn static_policy_ignores_edits_until_reload() {
    let server = backend().await;
    let mut file = NamedTempFile::new().expect("temp file");
    write_config(&mut file, &users(&server.uri(), "first"), 0);
    let store = Arc::new(
        ConfigStore::open(Some(file.path().to_path_buf()), ReloadPolicy::Static).expect("open"),
    );
    let app = build_router(AppState::new(store.clone(), Upstream::new().expect("client")));

    write_config(&mut file, &users(&server.uri(), "second"), 5);
    assert_eq!(status_for(&app, "first").await, StatusCode::OK);

    store.reload().await.expect("reload");
    assert_eq!(status_for(&app, "first").await, StatusCode::UNAUTHORIZED);
    assert_eq!(status_for(&app, "second").await, StatusCode::OK);
}
