//! Reauthentication counters
//!
//! Emitted through the `metrics` facade; the embedding application decides
//! whether a recorder (e.g. Prometheus) is installed. Without one every call
//! is a no-op.
//!
//! - `reauth_attempts_total` (counter): label `outcome` = success | failure
//! - `reauth_waiters_total` (counter): callers coalesced onto an in-flight reauth
//! - `request_resends_total` (counter): label `outcome` = ok | rejected

/// Record the end of one reauthentication session.
pub fn record_reauth(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("reauth_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a caller that joined an already running reauthentication.
pub fn record_waiter() {
    metrics::counter!("reauth_waiters_total").increment(1);
}

/// Record the single resend that follows a successful reauthentication.
pub fn record_resend(rejected: bool) {
    let outcome = if rejected { "rejected" } else { "ok" };
    metrics::counter!("request_resends_total", "outcome" => outcome).increment(1);
}
