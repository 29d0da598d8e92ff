//! Per-IP sliding-window rate limiting.
//!
//! Tiers are fixed at compile time; each (tier, ip) pair tracks its recent
//! request instants in a shared concurrent map.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Read-only endpoints: availability, slots.
    Public,
    /// Booking creation, the abuse magnet.
    Booking,
    /// Signup, login and account-scoped endpoints.
    Account,
    /// Admin dashboard traffic.
    Admin,
}

impl Tier {
    /// (max requests, window) for the tier.
    fn limit(self) -> (u32, Duration) {
        match self {
            Tier::Public => (60, Duration::from_secs(60)),
            Tier::Booking => (5, Duration::from_secs(300)),
            Tier::Account => (30, Duration::from_secs(60)),
            Tier::Admin => (120, Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request, returning Err(retry_after_secs) when the tier's
    /// window is full.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let (max_requests, window) = tier.limit();
        let now = Instant::now();
        let mut entry = self.hits.entry((tier, ip)).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= max_requests as usize {
            let oldest = entry[0];
            let retry_after = (oldest + window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }
        entry.push(now);
        Ok(())
    }

    /// Drop (tier, ip) entries with no hits inside twice their window.
    /// Run from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|(tier, _), timestamps| {
            let cutoff = tier.limit().1 * 2;
            timestamps.retain(|t| now.duration_since(*t) < cutoff);
            !timestamps.is_empty()
        });
    }
}

/// Client IP: first X-Forwarded-For entry when behind the reverse proxy,
/// otherwise the socket peer.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {retry_after} seconds"
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

async fn limit(
    limiter: RateLimiter,
    tier: Tier,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

pub async fn rate_limit_public(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    limit(limiter, Tier::Public, req, next).await
}

pub async fn rate_limit_booking(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    limit(limiter, Tier::Booking, req, next).await
}

pub async fn rate_limit_account(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    limit(limiter, Tier::Account, req, next).await
}

pub async fn rate_limit_admin(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    limit(limiter, Tier::Admin, req, next).await
}
