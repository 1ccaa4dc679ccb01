mod support;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tower::ServiceExt;

use rollcall::application::{
    attendance::AttendanceService,
    concat::ConcatService,
    masterlist::MasterListService,
    render::{BatchRenderer, JobTimings},
};
use rollcall::infra::{
    http::{AppState, REQUEST_ID_HEADER, build_router},
    pdf::LopdfMerger,
};

use support::{FakeEngine, fast_timings, labelled_pdf, page_labels, renderer, renderer_with};

const BODY_LIMIT: usize = 4 * 1024 * 1024;

fn app(engine: &FakeEngine) -> Router {
    app_with(engine, renderer(engine))
}

fn app_with(engine: &FakeEngine, renderer: BatchRenderer) -> Router {
    let merger = Arc::new(LopdfMerger);
    let state = AppState {
        attendance: Arc::new(AttendanceService::new(renderer, merger.clone())),
        concat: Arc::new(ConcatService::new(merger)),
        masterlist: Arc::new(MasterListService::new(Arc::new(engine.clone()))),
    };
    build_router(state, BODY_LIMIT)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), BODY_LIMIT)
        .await
        .expect("body")
        .to_vec()
}

async fn error_body(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("error json")
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app(&FakeEngine::new())
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(error_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn attendance_returns_an_inline_pdf() {
    let engine = FakeEngine::new();
    let response = app(&engine)
        .oneshot(post_json(
            "/api/attendance-pdf",
            json!({
                "filename": "Level 1 AM",
                "rosters": [
                    { "template": "Advanced", "roster": { "code": "A-1", "students": [{ "name": "Ada" }] } },
                    { "template": "Unknown", "roster": { "code": "B-2", "students": [{ "name": "Grace" }] } }
                ]
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "inline; filename=\"attendance-Level-1-AM.pdf\""
    );

    let bytes = body_bytes(response).await;
    assert_eq!(page_labels(&bytes), ["A-1-p1", "B-2-p1"]);
}

#[tokio::test]
async fn attendance_validation_error_is_positional() {
    let engine = FakeEngine::new();
    let response = app(&engine)
        .oneshot(post_json(
            "/api/attendance-pdf",
            json!({
                "rosters": [
                    { "template": "Advanced", "roster": { "code": "A-1" } },
                    { "template": "", "roster": { "code": "B-2" } }
                ]
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_input");
    assert!(
        body["error"]["hint"]
            .as_str()
            .is_some_and(|hint| hint.starts_with("item 2:"))
    );
    assert_eq!(engine.log.launches(), 0);
}

#[tokio::test]
async fn attendance_timeout_is_a_gateway_timeout() {
    let engine = FakeEngine::new().with_capture_delay_for("SLOW-1", Duration::from_millis(300));
    let timings = JobTimings {
        job_timeout: Duration::from_millis(100),
        ..fast_timings()
    };
    let response = app_with(&engine, renderer_with(&engine, timings))
        .oneshot(post_json(
            "/api/attendance-pdf",
            json!({ "template": "Advanced", "roster": { "code": "SLOW-1", "students": [{ "name": "Ada" }] } }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "render_timeout");
    assert_eq!(
        body["error"]["hint"],
        "item 1: render timed out after 100ms"
    );
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let response = app(&FakeEngine::new())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/attendance-pdf")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{ not json"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn concat_json_merges_in_order() {
    let first = STANDARD.encode(labelled_pdf("X", 2));
    let second = format!(
        "data:application/pdf;base64,{}",
        STANDARD.encode(labelled_pdf("Y", 1))
    );

    let response = app(&FakeEngine::new())
        .oneshot(post_json(
            "/api/concat-pdf",
            json!({ "pdfs": [first, second] }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"combined.pdf\""
    );
    assert_eq!(page_labels(&body_bytes(response).await), ["X-p1", "X-p2", "Y-p1"]);
}

#[tokio::test]
async fn concat_rejects_bad_entries_by_position() {
    let good = STANDARD.encode(labelled_pdf("X", 1));
    let response = app(&FakeEngine::new())
        .oneshot(post_json(
            "/api/concat-pdf",
            json!({ "pdfs": [good, "%%% not base64 %%%"] }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(
        body["error"]["hint"],
        "item 2: validation failed: invalid base64 pdf payload"
    );
}

#[tokio::test]
async fn concat_requires_documents() {
    let response = app(&FakeEngine::new())
        .oneshot(post_json("/api/concat-pdf", json!({ "pdfs": [] })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(response).await["error"]["hint"],
        "validation failed: missing pdfs"
    );
}

#[tokio::test]
async fn concat_accepts_multipart_uploads() {
    let boundary = "rollcall-boundary";
    let mut body = Vec::new();
    for (label, pages) in [("M", 1), ("N", 2)] {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"pdfs\"; filename=\"{label}.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&labelled_pdf(label, pages));
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"filename\"\r\n\r\nweek one\r\n--{boundary}--\r\n"
        )
        .as_bytes(),
    );

    let response = app(&FakeEngine::new())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/concat-pdf")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"week-one.pdf\""
    );
    assert_eq!(page_labels(&body_bytes(response).await), ["M-p1", "N-p1", "N-p2"]);
}

#[tokio::test]
async fn masterlist_requires_rosters() {
    let engine = FakeEngine::new();
    let response = app(&engine)
        .oneshot(post_json("/api/masterlist-pdf", json!({ "rosters": [] })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_body(response).await["error"]["hint"],
        "validation failed: no rosters to process"
    );
    assert_eq!(engine.log.launches(), 0);
}

#[tokio::test]
async fn masterlist_returns_a_dated_pdf() {
    let response = app(&FakeEngine::new())
        .oneshot(post_json(
            "/api/masterlist-pdf",
            json!({
                "rosters": [
                    { "code": "A-1", "time": "9:00 AM", "students": [{ "name": "Ada", "phone": "555-0100" }] }
                ],
                "options": { "time_headers": true }
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .expect("ascii header")
        .to_string();
    assert!(disposition.starts_with("inline; filename=\"MasterList_"));
    assert!(!body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let minted = app(&FakeEngine::new())
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let id = minted.headers()[&REQUEST_ID_HEADER]
        .to_str()
        .expect("ascii id");
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let echoed = app(&FakeEngine::new())
        .oneshot(post_json("/api/concat-pdf", json!({ "pdfs": [] })))
        .await
        .expect("response");
    assert!(echoed.headers().contains_key(&REQUEST_ID_HEADER));

    let supplied = app(&FakeEngine::new())
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header(REQUEST_ID_HEADER, "front-desk-7")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(supplied.headers()[&REQUEST_ID_HEADER], "front-desk-7");
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let response = app(&FakeEngine::new())
        .oneshot(
            Request::builder()
                .uri("/api/nope")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_body(response).await["error"]["code"], "not_found");
}
