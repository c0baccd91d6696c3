//! Per-caller rate limiting for write endpoints.
//!
//! Two backends share one interface:
//!
//! - [`RedisLimiter`] keeps a sliding window per key in a Redis sorted set,
//!   so every server instance sees the same counters.
//! - [`MemoryLimiter`] keeps per-key GCRA state in process via `governor`,
//!   for single-instance deployments and tests. A background task evicts idle
//!   keys once per window.
//!
//! The handle is built once at startup, injected through [`AppState`], and
//! released with [`Limiter::shutdown`].

use std::{
  net::{IpAddr, SocketAddr},
  num::NonZeroU32,
  sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use axum::{
  extract::{ConnectInfo, Request, State},
  middleware::Next,
  response::{IntoResponse, Response},
};
use chrono::Utc;
use governor::{
  DefaultKeyedRateLimiter, Quota, RateLimiter,
  clock::{Clock, DefaultClock},
};
use redis::{Script, aio::MultiplexedConnection};
use rolo_core::store::ContactStore;
use thiserror::Error;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{AppState, config::RateLimitConfig, error::ApiError};

// ─── Rule and decision ────────────────────────────────────────────────────────

/// At most `times` calls per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
  pub times:  NonZeroU32,
  pub window: Duration,
}

impl RateLimit {
  pub fn from_config(config: &RateLimitConfig) -> Result<Self, LimiterError> {
    let times = NonZeroU32::new(config.times)
      .ok_or(LimiterError::InvalidRule("times must be at least 1"))?;
    if config.seconds == 0 {
      return Err(LimiterError::InvalidRule("seconds must be at least 1"));
    }
    Ok(Self { times, window: Duration::from_secs(config.seconds) })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allowed,
  Denied { retry_after: Duration },
}

#[derive(Debug, Error)]
pub enum LimiterError {
  #[error("invalid rate limit: {0}")]
  InvalidRule(&'static str),

  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("limiter has been shut down")]
  Closed,
}

// ─── In-process backend ───────────────────────────────────────────────────────

pub struct MemoryLimiter {
  inner:   Arc<DefaultKeyedRateLimiter<String>>,
  sweeper: JoinHandle<()>,
}

impl MemoryLimiter {
  /// Must be called from within a tokio runtime.
  pub fn new(rule: RateLimit) -> Self {
    // `times` calls may be spent at once; a single call comes back per full
    // window.
    let quota = Quota::with_period(rule.window)
      .unwrap_or_else(|| Quota::per_second(rule.times))
      .allow_burst(rule.times);
    let inner = Arc::new(RateLimiter::keyed(quota));
    let sweeper = tokio::spawn(sweep_idle_keys(Arc::downgrade(&inner), rule.window));
    Self { inner, sweeper }
  }

  /// Number of callers currently tracked.
  pub fn tracked_keys(&self) -> usize { self.inner.len() }

  fn close(&self) { self.sweeper.abort(); }

  fn check(&self, key: &str) -> Decision {
    match self.inner.check_key(&key.to_owned()) {
      Ok(()) => Decision::Allowed,
      Err(not_until) => Decision::Denied {
        retry_after: not_until.wait_time_from(DefaultClock::default().now()),
      },
    }
  }
}

impl Drop for MemoryLimiter {
  fn drop(&mut self) { self.sweeper.abort(); }
}

/// Drop keys whose state has fully replenished, until the limiter is gone.
async fn sweep_idle_keys(limiter: Weak<DefaultKeyedRateLimiter<String>>, every: Duration) {
  let mut ticker = tokio::time::interval(every);
  ticker.tick().await;
  loop {
    ticker.tick().await;
    let Some(limiter) = limiter.upgrade() else { break };
    limiter.retain_recent();
    limiter.shrink_to_fit();
    debug!(keys = limiter.len(), "swept idle rate limit keys");
  }
}

// ─── Redis backend ────────────────────────────────────────────────────────────

/// Trim the window, count, and record the call in one atomic step.
///
/// Returns 0 when the call is allowed, otherwise the milliseconds until the
/// oldest call in the window expires.
const SLIDING_WINDOW_SCRIPT: &str = r"
local key    = KEYS[1]
local now    = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit  = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
if redis.call('ZCARD', key) >= limit then
  local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  return math.max(1, tonumber(oldest[2]) + window - now)
end
redis.call('ZADD', key, now, ARGV[4])
redis.call('PEXPIRE', key, window)
return 0
";

pub struct RedisLimiter {
  conn:   RwLock<Option<MultiplexedConnection>>,
  script: Script,
  rule:   RateLimit,
  seq:    AtomicU64,
}

impl RedisLimiter {
  /// Connect once; the connection is shared by every request.
  pub async fn connect(url: &str, rule: RateLimit) -> Result<Self, LimiterError> {
    let client = redis::Client::open(url)?;
    let conn = client.get_multiplexed_async_connection().await?;
    info!("rate limiter connected to redis");
    Ok(Self {
      conn: RwLock::new(Some(conn)),
      script: Script::new(SLIDING_WINDOW_SCRIPT),
      rule,
      seq: AtomicU64::new(0),
    })
  }

  async fn check(&self, key: &str) -> Result<Decision, LimiterError> {
    let mut conn = self.conn.read().await.clone().ok_or(LimiterError::Closed)?;

    let now_ms = Utc::now().timestamp_millis();
    // Members must be unique even for calls landing in the same millisecond.
    let member = format!("{now_ms}-{}", self.seq.fetch_add(1, Ordering::Relaxed));
    let window_ms = i64::try_from(self.rule.window.as_millis()).unwrap_or(i64::MAX);

    let wait_ms: i64 = self
      .script
      .key(key)
      .arg(now_ms)
      .arg(window_ms)
      .arg(self.rule.times.get())
      .arg(member)
      .invoke_async(&mut conn)
      .await?;

    Ok(if wait_ms <= 0 {
      Decision::Allowed
    } else {
      Decision::Denied { retry_after: Duration::from_millis(wait_ms.unsigned_abs()) }
    })
  }

  async fn close(&self) { self.conn.write().await.take(); }
}

// ─── Handle ───────────────────────────────────────────────────────────────────

pub enum Limiter {
  Memory(MemoryLimiter),
  Redis(RedisLimiter),
}

impl Limiter {
  /// Build the backend named by `config`: Redis when a URL is set, otherwise
  /// in process.
  pub async fn from_config(config: &RateLimitConfig) -> Result<Self, LimiterError> {
    let rule = RateLimit::from_config(config)?;
    match &config.redis_url {
      Some(url) => Ok(Self::Redis(RedisLimiter::connect(url, rule).await?)),
      None => {
        info!("no redis_url configured; rate limiting in process");
        Ok(Self::Memory(MemoryLimiter::new(rule)))
      }
    }
  }

  /// Record one call under `key` and decide whether it may proceed.
  pub async fn check(&self, key: &str) -> Result<Decision, LimiterError> {
    match self {
      Self::Memory(m) => Ok(m.check(key)),
      Self::Redis(r) => r.check(key).await,
    }
  }

  /// Stop the in-process sweeper, or drop the Redis connection so that later
  /// checks fail with [`LimiterError::Closed`].
  pub async fn shutdown(&self) {
    match self {
      Self::Memory(m) => m.close(),
      Self::Redis(r) => r.close().await,
    }
    info!("rate limiter shut down");
  }
}

// ─── Middleware ───────────────────────────────────────────────────────────────

/// Identify the caller by socket peer address. With `trust_forwarded`, the
/// first `X-Forwarded-For` hop, then `X-Real-IP`, take precedence; only set
/// that behind a proxy which overwrites those headers.
pub fn client_ip(req: &Request, trust_forwarded: bool) -> Option<IpAddr> {
  let header_ip = |name: &str| {
    req
      .headers()
      .get(name)
      .and_then(|v| v.to_str().ok())
      .and_then(|s| s.split(',').next())
      .and_then(|s| s.trim().parse::<IpAddr>().ok())
  };

  let peer = || {
    req
      .extensions()
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ci| ci.0.ip())
  };

  if !trust_forwarded {
    return peer();
  }
  header_ip("x-forwarded-for")
    .or_else(|| header_ip("x-real-ip"))
    .or_else(peer)
}

/// Counter key for this caller and route.
pub fn limit_key(config: &RateLimitConfig, req: &Request) -> String {
  let caller = client_ip(req, config.trust_forwarded_for)
    .map_or_else(|| "anonymous".to_string(), |ip| ip.to_string());
  format!("{}:{caller}:{}:{}", config.key_prefix, req.method(), req.uri().path())
}

/// Route layer enforcing the configured limit before the handler runs.
///
/// Fails open: if the backend is unreachable the request is let through.
pub async fn enforce<S>(
  State(state): State<AppState<S>>,
  req: Request,
  next: Next,
) -> Response
where
  S: ContactStore + Clone + Send + Sync + 'static,
{
  let key = limit_key(&state.config.rate_limit, &req);

  match state.limiter.check(&key).await {
    Ok(Decision::Allowed) => next.run(req).await,
    Ok(Decision::Denied { retry_after }) => {
      warn!(key = %key, "rate limit exceeded");
      ApiError::RateLimited { retry_after: retry_after.as_secs().max(1) }.into_response()
    }
    Err(e) => {
      warn!(error = %e, "rate limiter unavailable; allowing request");
      next.run(req).await
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::{body::Body, http::Method};

  fn rule(times: u32, seconds: u64) -> RateLimit {
    RateLimit {
      times:  NonZeroU32::new(times).unwrap(),
      window: Duration::from_secs(seconds),
    }
  }

  fn request(headers: &[(&str, &str)]) -> Request {
    let mut builder = Request::builder().method(Method::POST).uri("/contacts/");
    for (k, v) in headers {
      builder = builder.header(*k, *v);
    }
    builder.body(Body::empty()).unwrap()
  }

  fn peer(req: &mut Request, ip: [u8; 4]) {
    req.extensions_mut().insert(ConnectInfo(SocketAddr::from((ip, 4000))));
  }

  #[tokio::test]
  async fn memory_limiter_allows_burst_then_denies() {
    let limiter = Limiter::Memory(MemoryLimiter::new(rule(10, 60)));
    for _ in 0..10 {
      assert_eq!(limiter.check("k").await.unwrap(), Decision::Allowed);
    }
    match limiter.check("k").await.unwrap() {
      Decision::Denied { retry_after } => assert!(retry_after <= Duration::from_secs(60)),
      Decision::Allowed => panic!("11th call should be denied"),
    }
    assert_eq!(limiter.check("other").await.unwrap(), Decision::Allowed);
  }

  #[tokio::test]
  async fn memory_limiter_does_not_refill_within_window() {
    let limiter = Limiter::Memory(MemoryLimiter::new(rule(2, 2)));
    assert_eq!(limiter.check("k").await.unwrap(), Decision::Allowed);
    assert_eq!(limiter.check("k").await.unwrap(), Decision::Allowed);

    tokio::time::sleep(Duration::from_millis(1050)).await;
    assert!(matches!(limiter.check("k").await.unwrap(), Decision::Denied { .. }));
  }

  #[tokio::test]
  async fn memory_limiter_refills_after_window() {
    let limiter = Limiter::Memory(MemoryLimiter::new(rule(1, 1)));
    assert_eq!(limiter.check("k").await.unwrap(), Decision::Allowed);
    assert!(matches!(limiter.check("k").await.unwrap(), Decision::Denied { .. }));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(limiter.check("k").await.unwrap(), Decision::Allowed);
  }

  #[tokio::test]
  async fn sweeper_evicts_idle_keys() {
    let limiter = MemoryLimiter::new(rule(1, 1));
    for i in 0..5 {
      limiter.check(&format!("caller-{i}"));
    }
    assert_eq!(limiter.tracked_keys(), 5);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(limiter.tracked_keys(), 0);
  }

  #[tokio::test]
  async fn shutdown_stops_sweeper() {
    let limiter = Limiter::Memory(MemoryLimiter::new(rule(1, 1)));
    limiter.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let Limiter::Memory(m) = &limiter else { unreachable!() };
    assert!(m.sweeper.is_finished());
  }

  #[test]
  fn zero_rules_are_rejected() {
    let mut cfg = RateLimitConfig::default();
    cfg.times = 0;
    assert!(RateLimit::from_config(&cfg).is_err());

    let mut cfg = RateLimitConfig::default();
    cfg.seconds = 0;
    assert!(RateLimit::from_config(&cfg).is_err());

    assert_eq!(RateLimit::from_config(&RateLimitConfig::default()).unwrap(), rule(10, 60));
  }

  #[test]
  fn forwarded_headers_ignored_by_default() {
    let mut req = request(&[("x-forwarded-for", "10.0.0.1"), ("x-real-ip", "10.0.0.3")]);
    assert_eq!(client_ip(&req, false), None);
    peer(&mut req, [127, 0, 0, 1]);
    assert_eq!(client_ip(&req, false), Some("127.0.0.1".parse().unwrap()));
  }

  #[test]
  fn trusted_caller_identity_precedence() {
    let req = request(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2"), ("x-real-ip", "10.0.0.3")]);
    assert_eq!(client_ip(&req, true), Some("10.0.0.1".parse().unwrap()));

    let req = request(&[("x-real-ip", "10.0.0.3")]);
    assert_eq!(client_ip(&req, true), Some("10.0.0.3".parse().unwrap()));

    let mut req = request(&[]);
    assert_eq!(client_ip(&req, true), None);
    peer(&mut req, [127, 0, 0, 1]);
    assert_eq!(client_ip(&req, true), Some("127.0.0.1".parse().unwrap()));
  }

  #[test]
  fn key_includes_caller_method_and_path() {
    let mut cfg = RateLimitConfig::default();
    cfg.key_prefix = "rl".to_string();

    let mut req = request(&[("x-real-ip", "10.0.0.3")]);
    assert_eq!(limit_key(&cfg, &req), "rl:anonymous:POST:/contacts/");
    peer(&mut req, [192, 0, 2, 1]);
    assert_eq!(limit_key(&cfg, &req), "rl:192.0.2.1:POST:/contacts/");

    cfg.trust_forwarded_for = true;
    assert_eq!(limit_key(&cfg, &req), "rl:10.0.0.3:POST:/contacts/");
  }

  /// Needs a live server: `ROLO_TEST_REDIS_URL=redis://127.0.0.1/15 cargo test -- --ignored`
  #[tokio::test]
  #[ignore]
  async fn redis_sliding_window() {
    let url = std::env::var("ROLO_TEST_REDIS_URL").expect("ROLO_TEST_REDIS_URL");
    let limiter = Limiter::Redis(RedisLimiter::connect(&url, rule(3, 60)).await.unwrap());
    let key = format!("rolo-test:{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

    for _ in 0..3 {
      assert_eq!(limiter.check(&key).await.unwrap(), Decision::Allowed);
    }
    assert!(matches!(limiter.check(&key).await.unwrap(), Decision::Denied { .. }));

    limiter.shutdown().await;
    assert!(matches!(limiter.check(&key).await, Err(LimiterError::Closed)));
  }
}
