use super::*;
use crate::rate_limit::QuotaKind;
use crate::state::test_helpers::test_app_state;

#[tokio::test]
async fn sweep_keeps_live_state_and_survives_db_failure() {
    let state = test_app_state();
    state.rate_limiter.check("1.2.3.4", QuotaKind::Request).unwrap().increment();

    let report = sweep(&state).await;

    assert_eq!(report.quota_records, 0);
    assert_eq!(report.document_sessions, 0);
    // The test pool points at nothing, so the database purge fails softly.
    assert_eq!(report.login_sessions, None);
    assert_eq!(state.rate_limiter.status("1.2.3.4").requests, 1);
}
