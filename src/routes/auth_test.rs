use axum::http::HeaderMap;
use axum::http::HeaderValue;

use super::*;

#[test]
fn env_bool_variants() {
    for (i, (val, expected)) in [("1", Some(true)), ("On", Some(true)), ("no", Some(false)), ("maybe", None)]
        .iter()
        .enumerate()
    {
        let key = format!("__TEST_DOCCHAT_EB_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), *expected, "value {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
    assert_eq!(env_bool("__TEST_DOCCHAT_EB_UNSET__"), None);
}

#[test]
fn bearer_header_wins_over_cookie() {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
    headers.insert("cookie", HeaderValue::from_static("session_token=fromcookie"));
    assert_eq!(request_token(&headers).as_deref(), Some("abc123"));
}

#[test]
fn cookie_is_used_without_bearer() {
    let mut headers = HeaderMap::new();
    headers.insert("cookie", HeaderValue::from_static("other=1; session_token=fromcookie"));
    assert_eq!(request_token(&headers).as_deref(), Some("fromcookie"));
}

#[test]
fn missing_or_blank_token_is_none() {
    assert_eq!(request_token(&HeaderMap::new()), None);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
    assert_eq!(request_token(&headers), None);

    let mut basic = HeaderMap::new();
    basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
    assert_eq!(request_token(&basic), None);
}
