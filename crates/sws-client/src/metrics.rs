//! Client-side metrics
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether and where to export them.
//!
//! - `sws_requests_total` (counter): labels `service`, `outcome`
//! - `sws_dispatch_total` (counter): labels `service`, `hook`
//! - `sws_token_refresh_total` (counter): label `outcome`
//! - `sws_request_replays_total` (counter): label `outcome`

use crate::dispatch::Hook;

/// Final outcome of a `fetch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Transport succeeded on the first attempt
    Ok,
    /// Failed, then a handler produced a value
    Recovered,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Recovered => "recovered",
            Outcome::Failed => "failed",
        }
    }
}

pub fn record_request(service: &'static str, outcome: Outcome) {
    metrics::counter!("sws_requests_total", "service" => service, "outcome" => outcome.as_str())
        .increment(1);
}

/// Record a classified failure routed to a hook.
pub fn record_dispatch(service: &'static str, hook: Hook) {
    metrics::counter!("sws_dispatch_total", "service" => service, "hook" => hook.label())
        .increment(1);
}

/// Record a completed token refresh: `committed`, `recovered` or `failed`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("sws_token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_replay(outcome: Outcome) {
    metrics::counter!("sws_request_replays_total", "outcome" => outcome.as_str()).increment(1);
}
