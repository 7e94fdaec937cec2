//! # Per-Caller Rate Limiting
//!
//! Fixed-window rate limiter keyed by the authenticated caller. Runs after
//! the auth middleware so the [`CallerIdentity`] is available.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::auth::CallerIdentity;
use crate::error::ErrorBody;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// `max_requests` per caller in each one-minute window.
    pub fn per_minute(max_requests: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    count: u64,
    started: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request for `key`; `false` when the window is exhausted.
    fn check(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if now.duration_since(window.started) >= self.config.window {
            window.count = 0;
            window.started = now;
        }

        if window.count >= self.config.max_requests {
            false
        } else {
            window.count += 1;
            true
        }
    }
}

/// Rate limit key: the caller's user id, else their role.
fn caller_key(caller: Option<&CallerIdentity>) -> String {
    match caller {
        Some(CallerIdentity {
            user_id: Some(id), ..
        }) => id.to_string(),
        Some(caller) => caller.role.as_str().to_string(),
        None => "anonymous".to_string(),
    }
}

/// Middleware that enforces per-caller rate limits.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    if let Some(limiter) = request.extensions().get::<RateLimiter>().cloned() {
        let key = caller_key(request.extensions().get::<CallerIdentity>());
        if !limiter.check(&key, Instant::now()) {
            tracing::warn!(caller = %key, "rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new("RATE_LIMITED", "rate limit exceeded")),
            )
                .into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use uuid::Uuid;

    #[test]
    fn window_exhausts_then_resets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        });
        let start = Instant::now();
        assert!(limiter.check("a", start));
        assert!(limiter.check("a", start));
        assert!(!limiter.check("a", start));
        assert!(limiter.check("b", start));
        assert!(limiter.check("a", start + Duration::from_secs(61)));
    }

    #[test]
    fn keys_prefer_user_id() {
        let id = Uuid::new_v4();
        let user = CallerIdentity {
            role: Role::User,
            user_id: Some(id),
        };
        assert_eq!(caller_key(Some(&user)), id.to_string());
        assert_eq!(caller_key(Some(&CallerIdentity::system())), "SUPER_ADMIN");
        assert_eq!(caller_key(None), "anonymous");
    }
}
