use super::*;

fn limiter(max_requests: u32, max_files: u32, window_secs: u64) -> RateLimiter {
    RateLimiter::new(
        Arc::new(InMemoryQuotaStore::new()),
        RateLimitConfig { max_requests, max_files, window: Duration::from_secs(window_secs) },
    )
}

fn t0() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
}

// =============================================================================
// check / increment
// =============================================================================

#[test]
fn rejects_after_max_counted_requests() {
    let rl = limiter(3, 2, 86_400);
    let now = t0();

    for i in 0..3 {
        let permit = rl.check_at("1.2.3.4", QuotaKind::Request, now).unwrap_or_else(|_| panic!("call {i}"));
        permit.increment();
    }

    let denied = rl.check_at("1.2.3.4", QuotaKind::Request, now).unwrap_err();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.kind, QuotaKind::Request);
    assert!(denied.message.contains("Maximum 3 requests allowed per 24 hours"));
}

#[test]
fn remaining_is_computed_before_increment() {
    let rl = limiter(3, 2, 86_400);
    let now = t0();

    let first = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    assert_eq!(first.decision().remaining, 3);
    assert_eq!(first.remaining_after(), 2);
    first.increment();

    let second = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    assert_eq!(second.decision().remaining, 2);
    second.increment();

    let third = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    assert_eq!(third.remaining_after(), 0);
    assert_eq!(third.decision().message, "1 requests remaining");
}

#[test]
fn dropped_permit_does_not_consume_quota() {
    let rl = limiter(3, 2, 86_400);
    let now = t0();

    let failed = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    assert_eq!(failed.decision().remaining, 3);
    drop(failed);

    let retry = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    assert_eq!(retry.decision().remaining, 3);
    retry.increment();

    assert_eq!(rl.status_at("ip", now).requests, 1);
}

#[test]
fn in_flight_reservations_count_against_ceiling() {
    let rl = limiter(2, 2, 86_400);
    let now = t0();

    let a = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    let b = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    assert!(rl.check_at("ip", QuotaKind::Request, now).is_err());

    drop(b);
    let c = rl.check_at("ip", QuotaKind::Request, now).unwrap();
    a.increment();
    c.increment();
    assert_eq!(rl.status_at("ip", now).requests, 2);
}

#[test]
fn request_and_file_budgets_are_independent() {
    let rl = limiter(3, 1, 86_400);
    let now = t0();

    rl.check_at("ip", QuotaKind::File, now).unwrap().increment();
    let denied = rl.check_at("ip", QuotaKind::File, now).unwrap_err();
    assert_eq!(denied.kind, QuotaKind::File);
    assert!(denied.message.contains("files"));

    assert!(rl.check_at("ip", QuotaKind::Request, now).is_ok());
}

#[test]
fn distinct_ips_do_not_interfere() {
    let rl = limiter(1, 1, 86_400);
    let now = t0();

    rl.check_at("10.0.0.1", QuotaKind::Request, now).unwrap().increment();
    assert!(rl.check_at("10.0.0.1", QuotaKind::Request, now).is_err());
    assert!(rl.check_at("10.0.0.2", QuotaKind::Request, now).is_ok());
}

// =============================================================================
// window expiry
// =============================================================================

#[test]
fn window_expiry_resets_counters() {
    let rl = limiter(3, 2, 86_400);
    let start = t0();

    for _ in 0..3 {
        rl.check_at("ip", QuotaKind::Request, start).unwrap().increment();
    }
    assert!(rl.check_at("ip", QuotaKind::Request, start).is_err());

    let later = start + Duration::from_secs(86_400) + Duration::from_secs(1);
    let permit = rl.check_at("ip", QuotaKind::Request, later).unwrap();
    assert_eq!(permit.decision().remaining, 3);
    permit.increment();
    assert_eq!(rl.status_at("ip", later).requests, 1);
    assert_eq!(rl.check_at("ip", QuotaKind::Request, later).unwrap().remaining_after(), 1);
}

#[test]
fn new_window_starts_at_first_call_after_expiry() {
    let rl = limiter(3, 2, 60);
    let start = t0();
    rl.check_at("ip", QuotaKind::Request, start).unwrap().increment();

    let later = start + Duration::from_secs(120);
    let permit = rl.check_at("ip", QuotaKind::Request, later).unwrap();
    assert_eq!(permit.decision().reset_at, later + Duration::from_secs(60));
}

#[test]
fn status_reports_lapsed_window_as_empty() {
    let rl = limiter(3, 2, 60);
    let start = t0();
    rl.check_at("ip", QuotaKind::Request, start).unwrap().increment();
    rl.check_at("ip", QuotaKind::File, start).unwrap().increment();

    let live = rl.status_at("ip", start);
    assert_eq!((live.requests, live.files), (1, 1));
    assert_eq!(live.reset_at, Some(start + Duration::from_secs(60)));

    let lapsed = rl.status_at("ip", start + Duration::from_secs(61));
    assert_eq!((lapsed.requests, lapsed.files), (0, 0));
    assert_eq!(lapsed.reset_at, None);
    assert_eq!((lapsed.max_requests, lapsed.max_files), (3, 2));
}

#[test]
fn status_for_unseen_ip_is_empty() {
    let rl = limiter(3, 2, 60);
    let status = rl.status_at("never-seen", t0());
    assert_eq!(status.requests, 0);
    assert!(status.reset_at.is_none());
}

#[test]
fn purge_drops_only_idle_lapsed_records() {
    let rl = limiter(3, 2, 60);
    let start = t0();
    rl.check_at("done", QuotaKind::Request, start).unwrap().increment();
    let _in_flight = rl.check_at("busy", QuotaKind::Request, start).unwrap();
    rl.check_at("fresh", QuotaKind::Request, start + Duration::from_secs(50))
        .unwrap()
        .increment();

    let removed = rl.purge_expired_at(start + Duration::from_secs(61));
    assert_eq!(removed, 1);
    assert_eq!(rl.status_at("fresh", start + Duration::from_secs(61)).requests, 1);
}

#[test]
fn window_label_wording() {
    let mut cfg = RateLimitConfig::default();
    assert_eq!(cfg.window_label(), "24 hours");
    cfg.window = Duration::from_secs(3600);
    assert_eq!(cfg.window_label(), "hour");
    cfg.window = Duration::from_secs(90);
    assert_eq!(cfg.window_label(), "90 seconds");
}

// =============================================================================
// client_ip
// =============================================================================

fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in pairs {
        map.insert(*k, v.parse().unwrap());
    }
    map
}

#[test]
fn client_ip_prefers_first_forwarded_entry() {
    let h = headers(&[("x-forwarded-for", " 203.0.113.7 , 10.0.0.1"), ("x-real-ip", "198.51.100.2")]);
    let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    assert_eq!(client_ip(&h, Some(peer)), "203.0.113.7");
}

#[test]
fn client_ip_falls_back_to_real_ip() {
    let h = headers(&[("x-real-ip", "198.51.100.2")]);
    let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    assert_eq!(client_ip(&h, Some(peer)), "198.51.100.2");
}

#[test]
fn client_ip_falls_back_to_peer_then_unknown() {
    let peer: SocketAddr = "192.0.2.10:443".parse().unwrap();
    assert_eq!(client_ip(&HeaderMap::new(), Some(peer)), "192.0.2.10");
    assert_eq!(client_ip(&HeaderMap::new(), None), UNKNOWN_CLIENT_IP);
}

#[test]
fn client_ip_ignores_empty_forwarded_header() {
    let h = headers(&[("x-forwarded-for", ""), ("x-real-ip", "198.51.100.2")]);
    assert_eq!(client_ip(&h, None), "198.51.100.2");
}
