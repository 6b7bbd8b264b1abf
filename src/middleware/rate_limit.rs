use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

pub type UpstreamRateLimiter = Arc<DefaultKeyedRateLimiter<IpAddr>>;

/// Per-IP limiter for routes that call the pharmacy API
pub fn upstream_rate_limiter(per_minute: u32) -> UpstreamRateLimiter {
    let quota = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(quota)))
}

pub async fn rate_limit_middleware(
    State(limiter): State<UpstreamRateLimiter>,
    request: Request,
    next: Next,
) -> Result<impl IntoResponse, StatusCode> {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match limiter.check_key(&ip) {
        Ok(()) => Ok(next.run(request).await),
        Err(_) => {
            warn!("🚫 Rate limit exceeded for IP: {}", ip);
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}
