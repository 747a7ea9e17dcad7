use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures::future::LocalBoxFuture;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::StateInformationMiddleware;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as Governor};
use std::future::{ready, Ready};
use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::utils::AppError;

type KeyedLimiter = Governor<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock, StateInformationMiddleware>;

/// Limite GCRA por IP, um por escopo (auth, api)
pub struct RateLimiter {
    scope: &'static str,
    burst: u32,
    trust_proxy: bool,
    clock: DefaultClock,
    limiter: KeyedLimiter,
}

impl RateLimiter {
    pub fn new(scope: &'static str, quota: Quota) -> Self {
        Self {
            scope,
            burst: quota.burst_size().get(),
            trust_proxy: false,
            clock: DefaultClock::default(),
            limiter: Governor::keyed(quota).with_middleware::<StateInformationMiddleware>(),
        }
    }

    /// `limit` requests per minute, all of them available as a burst.
    pub fn per_minute(scope: &'static str, limit: u32) -> Self {
        Self::new(scope, Quota::per_minute(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN)))
    }

    /// Key clients by the forwarded headers. Only safe behind a proxy that overwrites them.
    pub fn with_trusted_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn limit(&self) -> u32 {
        self.burst
    }

    /// Counts a hit. Ok carries the remaining burst, Err the seconds to wait.
    pub fn check(&self, client: IpAddr) -> Result<u32, u64> {
        match self.limiter.check_key(&client) {
            Ok(snapshot) => Ok(snapshot.remaining_burst_capacity()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                // arredonda para cima: nunca anuncia 0s
                Err((wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1))
            }
        }
    }

    /// Drops clients whose bucket is full again, returns how many.
    pub fn purge_expired(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        before.saturating_sub(self.limiter.len())
    }

    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }

    /// Socket peer by default; forwarded headers only when the proxy is trusted.
    pub fn client_ip(&self, req: &ServiceRequest) -> IpAddr {
        if self.trust_proxy {
            if let Some(ip) = forwarded_ip(req) {
                return ip;
            }
        }
        req.peer_addr()
            .map(|addr| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

fn forwarded_ip(req: &ServiceRequest) -> Option<IpAddr> {
    let headers = req.headers();

    // primeiro IP da cadeia é o cliente original
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
}

pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service,
            limiter: Arc::clone(&self.limiter),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: S,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let client = self.limiter.client_ip(&req);

        match self.limiter.check(client) {
            Ok(remaining) => {
                let limit = self.limiter.limit();
                let fut = self.service.call(req);
                Box::pin(async move {
                    let mut res = fut.await?;
                    let headers = res.headers_mut();
                    headers.insert(HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(limit));
                    headers.insert(
                        HeaderName::from_static("x-ratelimit-remaining"),
                        HeaderValue::from(remaining),
                    );
                    Ok(res)
                })
            }
            Err(retry_after) => {
                log::warn!(
                    "🚦 Rate limit hit on {} for {} (retry in {}s)",
                    self.limiter.scope(),
                    client,
                    retry_after
                );
                Box::pin(async move { Err(AppError::RateLimited(retry_after).into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_service, init_service, try_call_service, TestRequest};
    use actix_web::{web, App, HttpResponse};
    use std::net::SocketAddr;
    use std::time::Duration;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn quota_is_per_client() {
        let limiter = RateLimiter::per_minute("auth", 2);

        assert_eq!(limiter.check(ip("1.1.1.1")), Ok(1));
        assert_eq!(limiter.check(ip("1.1.1.1")), Ok(0));
        // 2/min repõe uma vaga a cada 30s
        let wait = limiter.check(ip("1.1.1.1")).unwrap_err();
        assert!((1..=30).contains(&wait), "retry after {}s", wait);

        // outro cliente tem o próprio balde
        assert_eq!(limiter.check(ip("2.2.2.2")), Ok(1));
    }

    #[test]
    fn zero_limit_still_allows_one_request() {
        let limiter = RateLimiter::per_minute("api", 0);
        assert_eq!(limiter.limit(), 1);
        assert!(limiter.check(ip("1.1.1.1")).is_ok());
        assert!(limiter.check(ip("1.1.1.1")).is_err());
    }

    #[test]
    fn purge_drops_replenished_clients() {
        let quota = Quota::with_period(Duration::from_millis(1))
            .unwrap()
            .allow_burst(NonZeroU32::new(5).unwrap());
        let limiter = RateLimiter::new("api", quota);
        limiter.check(ip("10.0.0.1")).unwrap();
        limiter.check(ip("10.0.0.2")).unwrap();
        assert_eq!(limiter.tracked(), 2);

        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(limiter.purge_expired(), 2);
        assert_eq!(limiter.tracked(), 0);
    }

    fn peer(req: TestRequest) -> TestRequest {
        req.peer_addr("203.0.113.7:40000".parse::<SocketAddr>().unwrap())
    }

    #[test]
    fn forwarded_headers_ignored_unless_trusted() {
        let req = peer(TestRequest::default())
            .insert_header(("X-Forwarded-For", "10.0.0.1, 172.16.0.1"))
            .to_srv_request();

        let direct = RateLimiter::per_minute("api", 5);
        assert_eq!(direct.client_ip(&req), ip("203.0.113.7"));

        let proxied = RateLimiter::per_minute("api", 5).with_trusted_proxy(true);
        assert_eq!(proxied.client_ip(&req), ip("10.0.0.1"));

        let req = peer(TestRequest::default()).insert_header(("X-Real-IP", "10.0.0.9")).to_srv_request();
        assert_eq!(proxied.client_ip(&req), ip("10.0.0.9"));

        // sem cabeçalho, cai no peer mesmo com proxy confiável
        let req = peer(TestRequest::default()).to_srv_request();
        assert_eq!(proxied.client_ip(&req), ip("203.0.113.7"));
    }

    #[actix_rt::test]
    async fn spoofed_forwarded_for_shares_the_peer_window() {
        let limiter = Arc::new(RateLimiter::per_minute("auth", 1));
        let app = init_service(
            App::new()
                .wrap(RateLimit::new(limiter.clone()))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let mut accepted = 0;
        for i in 0..5 {
            let req = peer(TestRequest::get().uri("/"))
                .insert_header(("X-Forwarded-For", format!("10.0.0.{}", i)))
                .to_request();
            if try_call_service(&app, req).await.is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[actix_rt::test]
    async fn exceeding_the_limit_is_429_with_retry_after() {
        let limiter = Arc::new(RateLimiter::per_minute("auth", 1));
        let app = init_service(
            App::new()
                .wrap(RateLimit::new(limiter))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let first = call_service(&app, TestRequest::get().uri("/").to_request()).await;
        assert_eq!(first.status(), 200);
        assert_eq!(first.headers().get("x-ratelimit-limit").unwrap(), "1");
        assert_eq!(first.headers().get("x-ratelimit-remaining").unwrap(), "0");

        let err = try_call_service(&app, TestRequest::get().uri("/").to_request())
            .await
            .err()
            .expect("second request should be limited");
        let res = err.error_response();
        assert_eq!(res.status(), 429);
        assert!(res.headers().contains_key("retry-after"));
    }
}
