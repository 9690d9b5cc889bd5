use axum::body::Body;
use axum::http::StatusCode;

use super::*;
use crate::error::ErrorCode;
use crate::routes::test_support::MultipartBuilder;

async fn decode(builder: MultipartBuilder) -> FormData {
    let req = builder.into_request("/", "127.0.0.1");
    FormData::from_request(req, &()).await.expect("form decodes")
}

fn post(content_type: &str, body: &str) -> Request {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body.to_owned()))
        .expect("request should build")
}

#[tokio::test]
async fn text_fields_and_both_file_field_names() {
    let form = decode(
        MultipartBuilder::new()
            .text("prompt", "Summarize")
            .file("files", "a.pdf", "application/pdf", b"%PDF-a")
            .file("files[]", "b.txt", "text/plain", b"hello"),
    )
    .await;

    assert_eq!(form.required("prompt").unwrap(), "Summarize");
    assert_eq!(form.files.len(), 2);
    assert_eq!(form.files[0].filename, "a.pdf");
    assert_eq!(form.files[0].data, b"%PDF-a");
    assert_eq!(form.files[1].content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn blank_required_field_is_rejected() {
    let form = decode(MultipartBuilder::new().text("message", "   ")).await;
    let err = form.required("message").unwrap_err();
    assert_eq!(err.to_string(), "message is required");
    assert!(form.required("prompt").is_err());
}

#[tokio::test]
async fn malformed_session_id_reads_as_absent() {
    let id = Uuid::new_v4();
    let good = decode(MultipartBuilder::new().text("session_id", &id.to_string())).await;
    assert_eq!(good.session_id(), Some(id));

    let bad = decode(MultipartBuilder::new().text("session_id", "not-a-uuid")).await;
    assert_eq!(bad.session_id(), None);

    let blank = decode(MultipartBuilder::new().text("session_id", "")).await;
    assert_eq!(blank.session_id(), None);
}

#[tokio::test]
async fn urlencoded_body_is_accepted() {
    let req = post("application/x-www-form-urlencoded", "message=hello%20there&session_id=");
    let form = FormData::from_request(req, &()).await.expect("form decodes");
    assert_eq!(form.required("message").unwrap(), "hello there");
    assert_eq!(form.session_id(), None);
    assert!(form.files.is_empty());
}

#[tokio::test]
async fn json_object_is_accepted() {
    let req = post("application/json", r#"{"title": "  Renamed  ", "count": 3, "missing": null}"#);
    let form = FormData::from_request(req, &()).await.expect("form decodes");
    assert_eq!(form.required("title").unwrap(), "Renamed");
    assert_eq!(form.text("count"), Some("3"));
    assert_eq!(form.text("missing"), None);
}

#[tokio::test]
async fn broken_multipart_is_a_validation_error() {
    let req = post("multipart/form-data", "message=hello");
    let err = FormData::from_request(req, &()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.error_code(), "E_VALIDATION");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let err = FormData::from_request(post("application/json", "{not json"), &()).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}
