use super::*;

fn make_response(content: serde_json::Value) -> String {
    serde_json::json!({
        "id": "msg_123",
        "type": "message",
        "role": "assistant",
        "content": content,
        "model": "claude-sonnet-4-5-20250929",
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 100, "output_tokens": 50 }
    })
    .to_string()
}

#[test]
fn parse_text_response() {
    let json = make_response(serde_json::json!([
        { "type": "text", "text": "Hello world" }
    ]));
    let resp = parse_response(&json).unwrap();
    assert_eq!(resp.text, "Hello world");
    assert_eq!(resp.model, "claude-sonnet-4-5-20250929");
    assert_eq!(resp.stop_reason, "end_turn");
    assert_eq!(resp.input_tokens, 100);
    assert_eq!(resp.output_tokens, 50);
}

#[test]
fn parse_thinking_blocks_are_filtered() {
    let json = make_response(serde_json::json!([
        { "type": "thinking", "thinking": "Let me think..." },
        { "type": "text", "text": "Here is my answer" }
    ]));
    let resp = parse_response(&json).unwrap();
    assert_eq!(resp.text, "Here is my answer");
}

#[test]
fn parse_multiple_text_blocks_are_joined() {
    let json = make_response(serde_json::json!([
        { "type": "text", "text": "first" },
        { "type": "text", "text": "second" }
    ]));
    assert_eq!(parse_response(&json).unwrap().text, "first\nsecond");
}

#[test]
fn parse_thinking_only_response_is_empty_completion() {
    let json = make_response(serde_json::json!([
        { "type": "thinking", "thinking": "Let me think..." }
    ]));
    assert!(matches!(parse_response(&json).unwrap_err(), LlmError::EmptyCompletion(_)));
}

#[test]
fn parse_invalid_json() {
    let err = parse_response("not json").unwrap_err();
    assert!(matches!(err, LlmError::ApiParse(_)));
}

#[test]
fn build_request_emits_document_blocks_before_text() {
    let messages = vec![Message::user(vec![
        Part::Document { media_type: "application/pdf".into(), data: vec![1, 2, 3] },
        Part::text("User: what is this?"),
    ])];
    let value = serde_json::to_value(build_request("claude", 256, "sys", &messages)).unwrap();

    assert_eq!(value["model"], "claude");
    assert_eq!(value["system"], "sys");
    let content = &value["messages"][0]["content"];
    assert_eq!(content[0]["type"], "document");
    assert_eq!(content[0]["source"]["type"], "base64");
    assert_eq!(content[0]["source"]["media_type"], "application/pdf");
    assert_eq!(content[0]["source"]["data"], "AQID");
    assert_eq!(content[1]["type"], "text");
    assert_eq!(content[1]["text"], "User: what is this?");
}

#[test]
fn build_request_skips_empty_system() {
    let value = serde_json::to_value(build_request("m", 1, "", &[])).unwrap();
    assert!(value.get("system").is_none());
}
