//! HTTP tests: drive the router end to end with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use raclette_cache::{build_router, AppState, StoreRepository};
use raclette_store::{Options, TransactionDb};
use tempfile::TempDir;
use tower::util::ServiceExt;

const BOUNDARY: &str = "raclette-test-boundary";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_app(overwrite_existing: bool, max_payload_bytes: u64) -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = TransactionDb::open(dir.path(), &Options::default().set_create_if_missing(true)).unwrap();
    let repo = StoreRepository::new(store, overwrite_existing, max_payload_bytes);
    let state = AppState::new(Arc::new(repo), max_payload_bytes);
    (build_router(state), dir)
}

/// One multipart part: (field name, optional filename, data)
type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n", name, f).as_bytes(),
            ),
            None => body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n", name).as_bytes()),
        }
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn post_parts(key: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/raclette/{}", key))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn post_file(key: &str, data: &[u8]) -> Request<Body> {
    post_parts(key, &[("value", Some("blob.bin"), data)])
}

fn get(key: &str) -> Request<Body> {
    Request::builder().uri(format!("/raclette/{}", key)).body(Body::empty()).unwrap()
}

fn delete(key: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/raclette/{}", key))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_then_find() {
    let (app, _dir) = test_app(true, 1024);

    let (status, body) = send(&app, post_file("Key1", b"Some text information")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let response = app.clone().oneshot(get("Key1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"Some text information");
}

#[tokio::test]
async fn binary_payload_is_preserved() {
    let (app, _dir) = test_app(true, 1024);
    let data: Vec<u8> = (0..=255u8).collect();
    assert_eq!(send(&app, post_file("bin", &data)).await.0, StatusCode::OK);
    assert_eq!(send(&app, get("bin")).await, (StatusCode::OK, data));
}

#[tokio::test]
async fn find_absent_is_not_found() {
    let (app, _dir) = test_app(true, 1024);
    let (status, _) = send(&app, get("missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_then_find() {
    let (app, _dir) = test_app(true, 1024);
    send(&app, post_file("k", b"v")).await;

    assert_eq!(send(&app, delete("k")).await.0, StatusCode::OK);
    assert_eq!(send(&app, get("k")).await.0, StatusCode::NOT_FOUND);
    // Absent delete still succeeds
    assert_eq!(send(&app, delete("k")).await.0, StatusCode::OK);
}

#[tokio::test]
async fn overwrite_enabled_replaces() {
    let (app, _dir) = test_app(true, 1024);
    send(&app, post_file("k", b"first")).await;
    assert_eq!(send(&app, post_file("k", b"second")).await.0, StatusCode::OK);
    assert_eq!(send(&app, get("k")).await.1, b"second");
}

#[tokio::test]
async fn overwrite_disabled_conflicts() {
    let (app, _dir) = test_app(false, 1024);
    assert_eq!(send(&app, post_file("Key1", b"first")).await.0, StatusCode::OK);

    let (status, body) = send(&app, post_file("Key1", b"second")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error["error"].as_str().unwrap().contains("Key1"));

    assert_eq!(send(&app, get("Key1")).await.1, b"first");
}

#[tokio::test]
async fn oversized_payload_rejected() {
    let (app, _dir) = test_app(true, 16);
    let (status, _) = send(&app, post_file("big", &[b'x'; 100])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(send(&app, get("big")).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn file_part_preferred_over_plain_field() {
    let (app, _dir) = test_app(true, 1024);
    let request = post_parts("k", &[("meta", None, &b"ignored"[..]), ("value", Some("v.bin"), &b"chosen"[..])]);
    assert_eq!(send(&app, request).await.0, StatusCode::OK);
    assert_eq!(send(&app, get("k")).await.1, b"chosen");
}

#[tokio::test]
async fn first_part_used_without_filename() {
    let (app, _dir) = test_app(true, 1024);
    let request = post_parts("k", &[("a", None, &b"one"[..]), ("b", None, &b"two"[..])]);
    assert_eq!(send(&app, request).await.0, StatusCode::OK);
    assert_eq!(send(&app, get("k")).await.1, b"one");
}

#[tokio::test]
async fn non_multipart_body_rejected() {
    let (app, _dir) = test_app(true, 1024);
    let request = Request::builder()
        .method("POST")
        .uri("/raclette/k")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("raw"))
        .unwrap();
    assert_eq!(send(&app, request).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, get("k")).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_entries() {
    let (app, _dir) = test_app(true, 1024);
    send(&app, post_file("a", b"1")).await;
    send(&app, post_file("b", b"2")).await;

    let (status, body) = send(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["entries"], 2);
}
