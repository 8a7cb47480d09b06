//! Token-bucket rate limiting for the job-trigger API, keyed by caller and
//! route so one noisy integrator can't starve another's quota. Grounded on
//! an enterprise gateway's `governor`+`dashmap` rate limiter, trimmed to
//! the single default quota this API needs (no per-route overrides).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use thiserror::Error;

use crate::auth::AuthContext;

type Limiter = Arc<GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded")]
    Exceeded,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        (StatusCode::TOO_MANY_REQUESTS, self.to_string()).into_response()
    }
}

/// One bucket per `(caller, route)` pair, created lazily on first use.
#[derive(Clone)]
pub struct RateLimiterState {
    quota: Quota,
    buckets: Arc<DashMap<String, Limiter>>,
}

impl RateLimiterState {
    pub fn new(requests_per_window: u32, window: Duration) -> Self {
        let quota = Quota::with_period(window)
            .expect("rate limit window must be nonzero")
            .allow_burst(NonZeroU32::new(requests_per_window.max(1)).expect("checked above"));
        Self {
            quota,
            buckets: Arc::new(DashMap::new()),
        }
    }

    fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let limiter = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(GovernorRateLimiter::direct(self.quota)))
            .clone();
        limiter.check().map_err(|_| RateLimitError::Exceeded)
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let route = request.uri().path().to_string();
    let caller = request
        .extensions()
        .get::<AuthContext>()
        .map(|ctx| ctx.owner.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    limiter.check(&format!("{caller}:{route}"))?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_burst_then_rejects() {
        let limiter = RateLimiterState::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("user-a:/api/jobs/x/run").is_ok());
        }
        assert!(limiter.check("user-a:/api/jobs/x/run").is_err());
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiterState::new(1, Duration::from_secs(60));
        assert!(limiter.check("user-a:/route").is_ok());
        assert!(limiter.check("user-a:/route").is_err());
        assert!(limiter.check("user-b:/route").is_ok());
    }
}
