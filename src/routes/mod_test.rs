use axum::http::StatusCode;

use super::*;
use crate::llm::types::{LlmError, Part};
use crate::state::test_helpers::{ScriptedLlm, test_app_state, test_app_state_with_llm};
use test_support::{MultipartBuilder, get, send};

#[tokio::test]
async fn health_endpoints() {
    let router = app(test_app_state());
    let (status, body) = send(&router, get("/health", "10.0.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send(&router, get("/healthz", "10.0.0.1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, get("/", "10.0.0.1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn three_public_chats_then_quota_rejection() {
    let router = app(test_app_state_with_llm(ScriptedLlm::new(vec![])));

    for expected_remaining in [2, 1, 0] {
        let req = MultipartBuilder::new().text("message", "hello").into_request("/chat/public", "1.2.3.4");
        let (status, body) = send(&router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rate_limit"]["remaining_requests"], expected_remaining);
        assert_eq!(body["has_document_context"], false);
    }

    let req = MultipartBuilder::new().text("message", "hello").into_request("/chat/public", "1.2.3.4");
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["requires_login"], true);
    assert_eq!(body["type"], "rate_limit");
    assert_eq!(body["error"], "Rate limit exceeded");

    // Another address still has its full budget.
    let req = MultipartBuilder::new().text("message", "hello").into_request("/chat/public", "5.6.7.8");
    let (status, _) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_llm_call_does_not_consume_quota() {
    let llm = ScriptedLlm::new(vec![Err(LlmError::ApiResponse { status: 400, body: "bad".into() })]);
    let state = test_app_state_with_llm(llm);
    let router = app(state.clone());

    let req = MultipartBuilder::new().text("message", "hello").into_request("/chat/public", "1.2.3.4");
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["type"], "upstream_error");
    assert_eq!(state.rate_limiter.status("1.2.3.4").requests, 0);

    let req = MultipartBuilder::new().text("message", "hello").into_request("/chat/public", "1.2.3.4");
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rate_limit"]["remaining_requests"], 2);
}

#[tokio::test]
async fn uploaded_documents_ground_the_follow_up_chat() {
    let llm = ScriptedLlm::new(vec![Ok("Two CVs.".into()), Ok("Five years.".into())]);
    let state = test_app_state_with_llm(llm.clone());
    let router = app(state);

    let req = MultipartBuilder::new()
        .text("prompt", "Summarize")
        .pdf("a.pdf")
        .pdf("b.pdf")
        .into_request("/analyze-document/public", "1.2.3.4");
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_files"], 2);
    assert_eq!(body["files_processed"][0]["filename"], "a.pdf");
    assert_eq!(body["rate_limit"]["remaining_files"], 1);
    assert_eq!(body["rate_limit"]["remaining_requests"], 2);
    let session_id = body["session_id"].as_str().expect("session id").to_owned();

    let req = MultipartBuilder::new()
        .text("message", "What about experience?")
        .text("session_id", &session_id)
        .into_request("/chat/public", "1.2.3.4");
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_document_context"], true);
    assert_eq!(body["session_id"], session_id.as_str());
    assert_eq!(body["response"], "Five years.");

    // The follow-up carried both documents without another upload.
    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    let docs = calls[1][0].parts.iter().filter(|p| matches!(p, Part::Document { .. })).count();
    assert_eq!(docs, 2);
}

#[tokio::test]
async fn rate_limit_status_reports_counters() {
    let router = app(test_app_state_with_llm(ScriptedLlm::new(vec![])));

    let (status, body) = send(&router, get("/rate-limit/status", "9.9.9.9")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"], 0);
    assert_eq!(body["maxRequests"], 3);
    assert_eq!(body["maxFiles"], 2);
    assert_eq!(body["resetTime"], 0);

    let req = MultipartBuilder::new().text("message", "hi").into_request("/chat/public", "9.9.9.9");
    send(&router, req).await;

    let (_, body) = send(&router, get("/rate-limit/status", "9.9.9.9")).await;
    assert_eq!(body["requests"], 1);
    assert!(body["resetTime"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn forwarded_for_header_selects_the_quota_bucket() {
    let state = test_app_state_with_llm(ScriptedLlm::new(vec![]));
    let router = app(state.clone());

    let mut req = MultipartBuilder::new().text("message", "hi").into_request("/chat/public", "10.0.0.1");
    req.headers_mut().insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
    send(&router, req).await;

    assert_eq!(state.rate_limiter.status("203.0.113.7").requests, 1);
    assert_eq!(state.rate_limiter.status("10.0.0.1").requests, 0);
}
