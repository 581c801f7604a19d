//! Poll Rate Limiting
//!
//! Devices refresh their own readings at a fixed cadence (roughly every
//! 0.8s), so polling faster only repeats work. [`PollRateLimiter`] forwards
//! a refresh to the device at most once per minimum interval and otherwise
//! hands back the cached [`PollResult`].
//!
//! Refreshes for one device are serialized behind a mutex: overlapping
//! scrapes never issue duplicate requests or race on auth state.

use crate::shelly::client::{MethodCall, RequestSource};
use crate::shelly::types::RpcReply;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default minimum time between two requests to the same device
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(800);

/// Outcome of the most recent refresh of one device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollResult {
    /// Every method call of the cycle returned a non-error reply
    pub success: bool,
    /// Latest reply per method, kept across cycles
    pub replies: HashMap<String, RpcReply>,
    /// Why the cycle failed, if it did
    pub error: Option<String>,
}

impl PollResult {
    /// The `result` object of the latest reply to `method`
    pub fn result(&self, method: &str) -> Option<&Value> {
        self.replies.get(method).and_then(RpcReply::result)
    }
}

struct LimiterState {
    source: Box<dyn RequestSource>,
    last_request: Option<Instant>,
    latest: Arc<PollResult>,
}

pub struct PollRateLimiter {
    device: String,
    calls: Vec<MethodCall>,
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

impl PollRateLimiter {
    pub fn new(
        device: impl Into<String>,
        source: Box<dyn RequestSource>,
        calls: Vec<MethodCall>,
        min_interval: Duration,
    ) -> Self {
        Self {
            device: device.into(),
            calls,
            min_interval,
            state: Mutex::new(LimiterState {
                source,
                last_request: None,
                latest: Arc::new(PollResult::default()),
            }),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Cached outcome without touching the device
    pub async fn latest(&self) -> Arc<PollResult> {
        self.state.lock().await.latest.clone()
    }

    /// Refresh from the device unless the last request was too recent.
    ///
    /// Method calls run in order. A call with no response stops the cycle
    /// and marks it failed; replies already stored for earlier calls in the
    /// same cycle are kept.
    pub async fn refresh_if_needed(&self) -> Arc<PollResult> {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_request {
            if last.elapsed() < self.min_interval {
                debug!("{}: serving cached poll result", self.device);
                return state.latest.clone();
            }
        }

        let mut next = PollResult {
            success: true,
            replies: state.latest.replies.clone(),
            error: None,
        };

        for call in &self.calls {
            match state.source.request(call).await {
                Ok(reply) => {
                    if !reply.is_success() {
                        next.success = false;
                        next.error = Some(describe_failure(&call.method, &reply));
                    }
                    next.replies.insert(call.method.clone(), reply);
                }
                Err(e) => {
                    warn!("{}: {} failed: {}", self.device, call.method, e);
                    next.success = false;
                    next.error = Some(format!("{}: {}", call.method, e));
                    break;
                }
            }
        }

        // Stamped once the cycle ends, failed or not, so a scrape queued
        // behind a slow device finds it fresh
        state.last_request = Some(Instant::now());
        state.latest = Arc::new(next);
        state.latest.clone()
    }
}

fn describe_failure(method: &str, reply: &RpcReply) -> String {
    match (reply.error(), reply) {
        (Some(error), _) => format!("{}: error {}: {}", method, error.code, error.message),
        (None, RpcReply::Raw(_)) => format!("{}: unparseable response", method),
        (None, RpcReply::Json(_)) => format!("{}: malformed error object", method),
    }
}
