//! Per-IP quotas for anonymous access to the LLM and upload endpoints.
//!
//! DESIGN
//! ======
//! Fixed-window counters keyed by client IP. Two budgets share one window:
//! general requests and file uploads. Defaults allow 3 requests and 2 uploads
//! per 24 hours, all three knobs come from the environment.
//!
//! Storage sits behind [`QuotaStore`], an atomic read-modify-write capability,
//! so a multi-process deployment can swap the in-memory map for a shared cache.
//! The threshold logic lives in [`RateLimiter`] and never touches the map
//! outside of a single `update` call.
//!
//! TRADE-OFFS
//! ==========
//! Quota is only spent when the guarded work succeeds. An admitted `check`
//! reserves a slot and hands back a [`QuotaPermit`]; `increment` turns the
//! reservation into a counted call, dropping the permit releases it. In-flight
//! reservations count against the ceiling so concurrent callers cannot
//! overshoot it, while failed or abandoned calls cost nothing.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::Serialize;
use time::OffsetDateTime;

const DEFAULT_MAX_REQUESTS: u32 = 3;
const DEFAULT_MAX_FILES: u32 = 2;
const DEFAULT_WINDOW_SECS: u64 = 24 * 60 * 60;

/// IP used when neither proxy headers nor the peer address are available.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub max_files: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    /// Load from `RATE_LIMIT_MAX_REQUESTS`, `RATE_LIMIT_MAX_FILES` and
    /// `RATE_LIMIT_WINDOW_SECS`, falling back to 3 / 2 / 24h.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS),
            max_files: env_parse("RATE_LIMIT_MAX_FILES", DEFAULT_MAX_FILES),
            window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
        }
    }

    #[must_use]
    pub fn ceiling(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Request => self.max_requests,
            QuotaKind::File => self.max_files,
        }
    }

    /// Human wording of the window, e.g. `"24 hours"`.
    fn window_label(&self) -> String {
        let secs = self.window.as_secs();
        if secs >= 3600 && secs % 3600 == 0 {
            let hours = secs / 3600;
            if hours == 1 { "hour".to_owned() } else { format!("{hours} hours") }
        } else {
            format!("{secs} seconds")
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            max_files: DEFAULT_MAX_FILES,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// TYPES
// =============================================================================

/// Which budget a call draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaKind {
    Request,
    File,
}

impl QuotaKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::File => "file",
        }
    }

    /// `error` field of the 429 body.
    #[must_use]
    pub fn rejection_title(self) -> &'static str {
        match self {
            Self::Request => "Rate limit exceeded",
            Self::File => "File upload limit exceeded",
        }
    }

    /// `type` field of the 429 body.
    #[must_use]
    pub fn rejection_type(self) -> &'static str {
        match self {
            Self::Request => "rate_limit",
            Self::File => "file_limit",
        }
    }
}

/// Counters for one client IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRecord {
    /// Chat calls counted in the current window.
    pub requests: u32,
    /// Upload calls counted in the current window.
    pub files: u32,
    /// Admitted request calls whose outcome is still pending.
    pub pending_requests: u32,
    /// Admitted upload calls whose outcome is still pending.
    pub pending_files: u32,
    /// When the counters zero out.
    pub reset_at: OffsetDateTime,
}

impl QuotaRecord {
    #[must_use]
    pub fn fresh(now: OffsetDateTime, window: Duration) -> Self {
        Self { requests: 0, files: 0, pending_requests: 0, pending_files: 0, reset_at: now + window }
    }

    #[must_use]
    pub fn is_lapsed(&self, now: OffsetDateTime) -> bool {
        now > self.reset_at
    }

    /// Zero the counted calls if the window has passed. Pending reservations
    /// belong to live requests and survive the roll.
    fn roll_window(&mut self, now: OffsetDateTime, window: Duration) {
        if self.is_lapsed(now) {
            self.requests = 0;
            self.files = 0;
            self.reset_at = now + window;
        }
    }

    fn counted(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Request => self.requests,
            QuotaKind::File => self.files,
        }
    }

    fn pending_mut(&mut self, kind: QuotaKind) -> &mut u32 {
        match kind {
            QuotaKind::Request => &mut self.pending_requests,
            QuotaKind::File => &mut self.pending_files,
        }
    }

    fn counted_mut(&mut self, kind: QuotaKind) -> &mut u32 {
        match kind {
            QuotaKind::Request => &mut self.requests,
            QuotaKind::File => &mut self.files,
        }
    }

    fn in_use(&self, kind: QuotaKind) -> u32 {
        match kind {
            QuotaKind::Request => self.requests.saturating_add(self.pending_requests),
            QuotaKind::File => self.files.saturating_add(self.pending_files),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub kind: QuotaKind,
    pub allowed: bool,
    /// Budget left before this call is counted.
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
    pub message: String,
}

/// Counters reported by `GET /rate-limit/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub requests: u32,
    pub files: u32,
    pub max_requests: u32,
    pub max_files: u32,
    /// `None` when the IP has no live window.
    pub reset_at: Option<OffsetDateTime>,
}

// =============================================================================
// STORE
// =============================================================================

/// Keyed storage for quota records.
///
/// Every method must be atomic with respect to the others for the same key.
pub trait QuotaStore: Send + Sync {
    /// Run `apply` against the slot for `ip` while holding exclusive access.
    /// The slot is `None` for an unseen IP; leaving it `None` stores nothing.
    fn update(&self, ip: &str, apply: &mut dyn FnMut(&mut Option<QuotaRecord>));

    /// Copy of the stored record, if any.
    fn get(&self, ip: &str) -> Option<QuotaRecord>;

    /// Drop every record for which `keep` returns false. Returns how many went.
    fn retain(&self, keep: &mut dyn FnMut(&QuotaRecord) -> bool) -> usize;
}

/// Process-local store: one mutex around the whole map.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    records: Mutex<HashMap<String, QuotaRecord>>,
}

impl InMemoryQuotaStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn update(&self, ip: &str, apply: &mut dyn FnMut(&mut Option<QuotaRecord>)) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut slot = records.get(ip).copied();
        apply(&mut slot);
        match slot {
            Some(record) => {
                records.insert(ip.to_owned(), record);
            }
            None => {
                records.remove(ip);
            }
        }
    }

    fn get(&self, ip: &str) -> Option<QuotaRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(ip).copied()
    }

    fn retain(&self, keep: &mut dyn FnMut(&QuotaRecord) -> bool) -> usize {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, record| keep(record));
        before - records.len()
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn QuotaStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn QuotaStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// In-memory limiter configured from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(Arc::new(InMemoryQuotaStore::new()), RateLimitConfig::from_env())
    }

    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Admit or reject one call of `kind` from `ip`.
    ///
    /// # Errors
    ///
    /// Returns the rejecting [`Decision`] once the budget is used up.
    pub fn check(&self, ip: &str, kind: QuotaKind) -> Result<QuotaPermit, Decision> {
        self.check_at(ip, kind, OffsetDateTime::now_utc())
    }

    fn check_at(&self, ip: &str, kind: QuotaKind, now: OffsetDateTime) -> Result<QuotaPermit, Decision> {
        let cfg = self.config;
        let max = cfg.ceiling(kind);
        let mut decision = None;

        self.store.update(ip, &mut |slot| {
            let record = slot.get_or_insert_with(|| QuotaRecord::fresh(now, cfg.window));
            record.roll_window(now, cfg.window);

            let used = record.in_use(kind);
            if used >= max {
                decision = Some(Decision {
                    kind,
                    allowed: false,
                    remaining: 0,
                    reset_at: record.reset_at,
                    message: format!(
                        "Rate limit exceeded. Maximum {max} {}s allowed per {}.",
                        kind.as_str(),
                        cfg.window_label()
                    ),
                });
                return;
            }

            let remaining = max - used;
            *record.pending_mut(kind) += 1;
            decision = Some(Decision {
                kind,
                allowed: true,
                remaining,
                reset_at: record.reset_at,
                message: format!("{remaining} {}s remaining", kind.as_str()),
            });
        });

        match decision {
            Some(d) if d.allowed => Ok(QuotaPermit { limiter: self.clone(), ip: ip.to_owned(), decision: d, settled: false }),
            Some(d) => Err(d),
            None => Err(Decision {
                kind,
                allowed: false,
                remaining: 0,
                reset_at: now + cfg.window,
                message: "rate limit store unavailable".to_owned(),
            }),
        }
    }

    /// Count one call of `kind` for `ip`, consuming an earlier reservation.
    fn increment(&self, ip: &str, kind: QuotaKind) {
        self.store.update(ip, &mut |slot| {
            if let Some(record) = slot.as_mut() {
                let pending = record.pending_mut(kind);
                *pending = pending.saturating_sub(1);
                let counted = record.counted_mut(kind);
                *counted = counted.saturating_add(1);
            }
        });
    }

    fn release(&self, ip: &str, kind: QuotaKind) {
        self.store.update(ip, &mut |slot| {
            if let Some(record) = slot.as_mut() {
                let pending = record.pending_mut(kind);
                *pending = pending.saturating_sub(1);
            }
        });
    }

    /// Effective counters for `ip`. A lapsed window reads as empty.
    #[must_use]
    pub fn status(&self, ip: &str) -> QuotaStatus {
        self.status_at(ip, OffsetDateTime::now_utc())
    }

    fn status_at(&self, ip: &str, now: OffsetDateTime) -> QuotaStatus {
        let live = self.store.get(ip).filter(|r| !r.is_lapsed(now));
        QuotaStatus {
            requests: live.map_or(0, |r| r.counted(QuotaKind::Request)),
            files: live.map_or(0, |r| r.counted(QuotaKind::File)),
            max_requests: self.config.max_requests,
            max_files: self.config.max_files,
            reset_at: live.map(|r| r.reset_at),
        }
    }

    /// Forget lapsed records with nothing in flight. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(OffsetDateTime::now_utc())
    }

    fn purge_expired_at(&self, now: OffsetDateTime) -> usize {
        self.store
            .retain(&mut |r| !r.is_lapsed(now) || r.pending_requests > 0 || r.pending_files > 0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryQuotaStore::new()), RateLimitConfig::default())
    }
}

// =============================================================================
// PERMIT
// =============================================================================

/// A reserved slot in a client's budget.
///
/// Call [`QuotaPermit::increment`] once the guarded work has succeeded.
/// Dropping the permit any other way (error path, cancelled request) hands
/// the slot back.
#[must_use = "dropping a permit releases the reservation"]
pub struct QuotaPermit {
    limiter: RateLimiter,
    ip: String,
    decision: Decision,
    settled: bool,
}

impl QuotaPermit {
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Budget left once this call is counted.
    #[must_use]
    pub fn remaining_after(&self) -> u32 {
        self.decision.remaining.saturating_sub(1)
    }

    /// Count the call against the client's budget.
    pub fn increment(mut self) {
        self.limiter.increment(&self.ip, self.decision.kind);
        self.settled = true;
    }
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.limiter.release(&self.ip, self.decision.kind);
        }
    }
}

impl std::fmt::Debug for QuotaPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaPermit")
            .field("ip", &self.ip)
            .field("decision", &self.decision)
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CLIENT IP
// =============================================================================

/// Resolve the caller's IP: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the socket peer, then [`UNKNOWN_CLIENT_IP`].
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_owned();
    }

    peer.map_or_else(|| UNKNOWN_CLIENT_IP.to_owned(), |addr| addr.ip().to_string())
}

/// Extractor wrapping [`client_ip`]. Never rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_ip(&parts.headers, peer)))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
