//! Bearer-token authentication and request rate limiting

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, RETRY_AFTER},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::errors::AgentError;
use crate::server::state::ServerState;
use crate::utils::sha256_digest;

/// Checks presented bearer tokens against the configured one
pub struct AccessControl {
    token: Option<SecretString>,
}

impl AccessControl {
    pub fn new(token: Option<SecretString>) -> Self {
        Self {
            token: token.filter(|t| !t.expose_secret().is_empty()),
        }
    }

    /// Whether a token is configured at all
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Digests are compared so the comparison time does not depend on
    /// how much of the token matched.
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        match (&self.token, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => {
                sha256_digest(expected.expose_secret().as_bytes())
                    == sha256_digest(presented.as_bytes())
            }
            (Some(_), None) => false,
        }
    }
}

/// Requests-per-minute limiter shared by all authenticated clients
pub struct RateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// `limit` requests per minute, all of which may arrive as a burst;
    /// 0 disables limiting
    pub fn new(limit: u32) -> Self {
        Self {
            limiter: NonZeroU32::new(limit)
                .map(|limit| governor::RateLimiter::direct(Quota::per_minute(limit))),
        }
    }

    /// Count one request; on rejection returns how long until the next one
    /// would be accepted
    pub fn check(&self) -> Result<(), Duration> {
        match &self.limiter {
            None => Ok(()),
            Some(limiter) => limiter
                .check()
                .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now())),
        }
    }
}

/// Middleware guarding deployment and log routes.
///
/// The token is checked before the limiter so unauthenticated requests never
/// use up the quota.
pub async fn require_token(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    if !state.access.authorize(presented) {
        warn!("Rejected unauthenticated request to {}", request.uri().path());
        return AgentError::AuthError("Invalid or missing bearer token".to_string())
            .into_response();
    }

    if let Err(retry_after) = state.rate_limiter.check() {
        let retry_secs = retry_after.as_secs().max(1);
        warn!(
            "Rate limit exceeded for {}, retry in {}s",
            request.uri().path(),
            retry_secs
        );
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, retry_secs.to_string())],
            axum::Json(serde_json::json!({ "error": "Rate limit exceeded" })),
        )
            .into_response();
    }

    next.run(request).await
}
