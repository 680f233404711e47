use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::error::Error;
use crate::middleware::auth::TenantContext;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token buckets per tenant. Requests that carry no tenant share one bucket.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    buckets: Arc<Mutex<HashMap<Option<Uuid>, Bucket>>>,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn allow(&self, tenant_id: Option<Uuid>) -> bool {
        self.allow_at(tenant_id, Instant::now())
    }

    fn allow_at(&self, tenant_id: Option<Uuid>, now: Instant) -> bool {
        let capacity = f64::from(self.rps);
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bucket = buckets.entry(tenant_id).or_insert(Bucket {
            tokens: capacity,
            refilled_at: now,
        });
        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * capacity).min(capacity);
        bucket.refilled_at = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let tenant_id = req
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.tenant_id);
    if !state.allow(tenant_id) {
        tracing::warn!(tenant_id = ?tenant_id, "rate limit exceeded");
        return Error::RateLimited.into_response();
    }
    next.run(req).await
}

pub fn new_rps_state(rps: u32) -> RateLimiter {
    RateLimiter::new(rps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bucket_refills_over_time() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        assert!(limiter.allow_at(None, start));
        assert!(limiter.allow_at(None, start));
        assert!(!limiter.allow_at(None, start));
        assert!(limiter.allow_at(None, start + Duration::from_millis(600)));
    }

    #[test]
    fn tenants_have_separate_buckets() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        let a = Some(Uuid::new_v4());
        let b = Some(Uuid::new_v4());
        assert!(limiter.allow_at(a, start));
        assert!(!limiter.allow_at(a, start));
        assert!(limiter.allow_at(b, start));
    }
}
