use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use tower::ServiceExt;

use crate::auth::{encode_credential, registry_auth_for, Authenticator, Credential};
use crate::runtime::testing::{FakeRuntime, PullBehaviour};
use crate::server::build_router;
use crate::server::settings::ServerSettings;
use crate::server::state::AppState;

const BOUNDARY: &str = "imgtar-test-boundary";

const DOCKER_CONFIG: &[u8] = br#"{"auths": {
    "test.io": {"username": "test", "password": "test"},
    "https://index.docker.io/v1/": {"auth": "ZG9ja2VyOmRvY2tlcg=="}
}}"#;

fn app(runtime: &Arc<FakeRuntime>) -> Router {
    app_with(runtime, ServerSettings::default())
}

fn app_with(runtime: &Arc<FakeRuntime>, settings: ServerSettings) -> Router {
    build_router(AppState::new(runtime.clone(), settings))
}

fn multipart(parts: &[(&str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, content) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/tar")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn error_message(response: axum::response::Response) -> String {
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    body["error"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_get_tar_streams_archive() {
    let runtime = Arc::new(FakeRuntime::new().with_archive(&[b"tar ", b"bytes"]));

    let response = app(&runtime)
        .oneshot(get("/tar?image=busybox&image=%20alpine%20&image=%23skipped"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/x-tar");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"images.tar\""
    );
    assert_eq!(body_bytes(response).await, runtime.archive_bytes());
    assert_eq!(
        runtime.save_calls(),
        vec![vec!["busybox".to_string(), "alpine".to_string()]]
    );

    let anonymous = encode_credential(&Credential::default()).unwrap();
    assert!(runtime
        .pull_calls()
        .iter()
        .all(|(_, registry_auth)| registry_auth == &anonymous));
}

#[tokio::test]
async fn test_get_tar_without_image_parameter() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime).oneshot(get("/tar")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(response).await.contains("image"));
    assert!(runtime.pull_calls().is_empty());
}

#[tokio::test]
async fn test_get_tar_with_only_comments() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime)
        .oneshot(get("/tar?image=%23busybox&image=%20"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(runtime.pull_calls().is_empty());
}

#[tokio::test]
async fn test_get_tar_invalid_reference() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime)
        .oneshot(get("/tar?image=Busybox"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(response)
        .await
        .starts_with("invalid reference format"));
    assert!(runtime.save_calls().is_empty());
}

#[tokio::test]
async fn test_post_tar_uses_uploaded_credentials() {
    let runtime = Arc::new(FakeRuntime::new());
    let images = b"# registry mirror test\nbusybox\n\nopen.io/busybox\n  test.io/busybox  \n";

    let response = app(&runtime)
        .oneshot(multipart(&[
            ("images.txt", images),
            ("config.json", DOCKER_CONFIG),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"test tar");

    let authenticator = Authenticator::from_slice(DOCKER_CONFIG).unwrap();
    let pulls = runtime.pull_calls();
    assert_eq!(pulls.len(), 3);
    for (image, registry_auth) in pulls {
        assert_eq!(
            registry_auth,
            registry_auth_for(&authenticator, &image).unwrap(),
            "{image}"
        );
    }
    assert_eq!(
        runtime.save_calls(),
        vec![vec![
            "busybox".to_string(),
            "open.io/busybox".to_string(),
            "test.io/busybox".to_string(),
        ]]
    );
}

#[tokio::test]
async fn test_post_tar_without_config_pulls_anonymously() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime)
        .oneshot(multipart(&[("images.txt", b"test.io/busybox\n")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        runtime.pull_calls(),
        vec![(
            "test.io/busybox".to_string(),
            encode_credential(&Credential::default()).unwrap()
        )]
    );
}

#[tokio::test]
async fn test_post_tar_missing_image_list() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime)
        .oneshot(multipart(&[("config.json", DOCKER_CONFIG)]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(response).await.contains("images.txt"));
}

#[tokio::test]
async fn test_post_tar_invalid_config() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime)
        .oneshot(multipart(&[
            ("images.txt", b"busybox\n"),
            ("config.json", b"{\"auths\": "),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(runtime.pull_calls().is_empty());
}

#[tokio::test]
async fn test_post_tar_empty_image_list() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime)
        .oneshot(multipart(&[("images.txt", b"\n# nothing\n")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pull_failure_status_and_no_save() {
    let runtime = Arc::new(FakeRuntime::new().with_pull(
        "test.io/missing",
        PullBehaviour::FailInProgress(
            std::time::Duration::ZERO,
            "manifest for test.io/missing:latest not found".into(),
        ),
    ));

    let response = app(&runtime)
        .oneshot(get("/tar?image=busybox&image=test.io/missing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        error_message(response).await,
        "pulling test.io/missing failed: manifest for test.io/missing:latest not found"
    );
    assert!(runtime.save_calls().is_empty());
}

#[tokio::test]
async fn test_save_failure_is_reported_before_streaming() {
    let runtime = Arc::new(FakeRuntime::new().with_save_error("Cannot connect to the Docker daemon"));

    let response = app(&runtime)
        .oneshot(get("/tar?image=busybox"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(response)
        .await
        .starts_with("saving images failed"));
}

#[tokio::test]
async fn test_upload_limit() {
    let runtime = Arc::new(FakeRuntime::new());
    let settings = ServerSettings {
        max_upload_bytes: 128,
        ..Default::default()
    };
    let images = "busybox\n".repeat(64);

    let response = app_with(&runtime, settings)
        .oneshot(multipart(&[("images.txt", images.as_bytes())]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(runtime.pull_calls().is_empty());
}

#[tokio::test]
async fn test_health() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");
}

#[tokio::test]
async fn test_index_without_base_url() {
    let runtime = Arc::new(FakeRuntime::new());

    let response = app(&runtime).oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("action=\"/tar\""));

    let response = app(&runtime).oneshot(get("/sub/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_routes_under_base_url() {
    let runtime = Arc::new(FakeRuntime::new());
    let settings = ServerSettings {
        base_url: "/sub".into(),
        ..Default::default()
    };
    let app = app_with(&runtime, settings);

    let response = app.clone().oneshot(get("/sub")).await.unwrap();
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/sub/");

    let response = app.clone().oneshot(get("/sub/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(html.contains("action=\"/sub/tar\""));

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.clone().oneshot(get("/sub/style.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");

    let response = app.clone().oneshot(get("/sub/index.html.tera")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/sub/tar?image=busybox")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
