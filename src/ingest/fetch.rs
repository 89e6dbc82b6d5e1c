// src/ingest/fetch.rs
//! HTTP fetch with retry, exponential backoff + jitter, user-agent rotation and the
//! per-platform circuit breaker. Every attempt is logged as one structured event.

use async_trait::async_trait;
use metrics::counter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::FetchSettings;
use crate::error::{FetchError, TransportError};
use crate::ingest::circuit::CircuitBreaker;
use crate::ingest::types::Platform;

/// Extra attempts after an HTTP 429.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 4;
/// Extra attempts after an HTTP 5xx or a transport error.
pub const MAX_SERVER_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Outbound GET capability. Production uses [`ReqwestTransport`]; tests plug in mocks.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy: Option<&str>, timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(p) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(p)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, user_agent: &str) -> Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(HttpResponse { status, body })
    }
}

/// `min(cap, base * 2^attempt) * (1 + jitter)`, jitter clamped into [0,1).
/// Non-negative and non-decreasing in `attempt` for a fixed jitter.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32, jitter: f64) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(attempt.min(30) as i32);
    let capped = exp.min(cap.as_secs_f64()).max(0.0);
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, 0.999_999)
    } else {
        0.0
    };
    Duration::from_secs_f64(capped * (1.0 + jitter))
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub rate_limit_extra: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&FetchSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(s: &FetchSettings) -> Self {
        Self {
            base: Duration::from_millis(s.backoff_base_ms),
            cap: Duration::from_millis(s.backoff_cap_ms),
            rate_limit_extra: Duration::from_millis(s.rate_limit_extra_ms),
            timeout: Duration::from_secs(s.timeout_secs.max(1)),
        }
    }

    /// No sleeping at all; handy for tests that only care about attempt counts.
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            cap: Duration::ZERO,
            rate_limit_extra: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        backoff_delay(self.base, self.cap, attempt, jitter)
    }
}

/// Per-platform fetch telemetry for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformTelemetry {
    pub latencies_ms: Vec<f64>,
    pub retries: u32,
    pub failures: u32,
}

pub struct Fetcher {
    run_id: String,
    transport: Arc<dyn HttpTransport>,
    breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
    user_agents: Vec<String>,
    ua_cursor: AtomicUsize,
    telemetry: Mutex<HashMap<Platform, PlatformTelemetry>>,
}

impl Fetcher {
    pub fn new(
        run_id: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        breaker: Arc<CircuitBreaker>,
        policy: RetryPolicy,
        user_agents: Vec<String>,
    ) -> Self {
        let user_agents = if user_agents.is_empty() {
            vec![format!("coffee-scout/{}", env!("CARGO_PKG_VERSION"))]
        } else {
            user_agents
        };
        Self {
            run_id: run_id.into(),
            transport,
            breaker,
            policy,
            user_agents,
            ua_cursor: AtomicUsize::new(0),
            telemetry: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn telemetry(&self, platform: Platform) -> PlatformTelemetry {
        self.telemetry
            .lock()
            .expect("telemetry mutex poisoned")
            .get(&platform)
            .cloned()
            .unwrap_or_default()
    }

    fn with_telemetry(&self, platform: Platform, f: impl FnOnce(&mut PlatformTelemetry)) {
        let mut t = self.telemetry.lock().expect("telemetry mutex poisoned");
        f(t.entry(platform).or_default());
    }

    fn next_user_agent(&self) -> &str {
        let i = self.ua_cursor.fetch_add(1, Ordering::Relaxed);
        &self.user_agents[i % self.user_agents.len()]
    }

    /// GET `url` on behalf of `platform`, returning the body of the first 2xx response.
    ///
    /// - Breaker open before an attempt: `CircuitOpen`, no network call.
    /// - 429: up to [`MAX_RATE_LIMIT_RETRIES`] more attempts, backoff plus a fixed extra delay.
    /// - 5xx / transport error: up to [`MAX_SERVER_RETRIES`] more attempts.
    /// - Other 4xx or exhausted retries: one breaker failure for the whole request.
    pub async fn fetch(&self, url: &str, platform: Platform) -> Result<String, FetchError> {
        let key = platform.as_str();
        let mut attempt: u32 = 0;
        let mut rate_limited = false;

        loop {
            if self.breaker.is_open(key) {
                warn!(
                    event = "http_error",
                    run_id = %self.run_id,
                    platform = key,
                    url,
                    error = "circuit_open",
                    latency_ms = 0.0,
                    attempt,
                    "fetch skipped: circuit open"
                );
                return Err(FetchError::CircuitOpen {
                    platform: key.to_string(),
                });
            }

            if attempt > 0 {
                let mut delay = self.policy.delay_for(attempt, rand::random::<f64>());
                if rate_limited {
                    delay += self.policy.rate_limit_extra;
                }
                tokio::time::sleep(delay).await;
                self.with_telemetry(platform, |t| t.retries += 1);
            }

            let user_agent = self.next_user_agent().to_string();
            let started = Instant::now();
            let result =
                tokio::time::timeout(self.policy.timeout, self.transport.get(url, &user_agent))
                    .await
                    .unwrap_or_else(|_| {
                        Err(TransportError(format!(
                            "timed out after {}s",
                            self.policy.timeout.as_secs_f64()
                        )))
                    });
            let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

            match result {
                Ok(resp) if (200..300).contains(&resp.status) => {
                    info!(
                        event = "http_response",
                        run_id = %self.run_id,
                        platform = key,
                        url,
                        status = resp.status,
                        latency_ms,
                        attempt,
                        "fetch ok"
                    );
                    self.breaker.record_success(key);
                    self.with_telemetry(platform, |t| t.latencies_ms.push(latency_ms));
                    return Ok(resp.body);
                }
                Ok(resp) => {
                    warn!(
                        event = "http_response",
                        run_id = %self.run_id,
                        platform = key,
                        url,
                        status = resp.status,
                        latency_ms,
                        attempt,
                        "fetch returned non-success status"
                    );
                    let budget = match resp.status {
                        429 => MAX_RATE_LIMIT_RETRIES,
                        500..=599 => MAX_SERVER_RETRIES,
                        _ => 0,
                    };
                    if attempt < budget {
                        rate_limited = resp.status == 429;
                        attempt += 1;
                        continue;
                    }
                    self.fail(platform);
                    return Err(FetchError::Http {
                        status: resp.status,
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        event = "http_error",
                        run_id = %self.run_id,
                        platform = key,
                        url,
                        error = %e,
                        latency_ms,
                        attempt,
                        "fetch failed"
                    );
                    if attempt < MAX_SERVER_RETRIES {
                        rate_limited = false;
                        attempt += 1;
                        continue;
                    }
                    self.fail(platform);
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    fn fail(&self, platform: Platform) {
        self.breaker.record_failure(platform.as_str());
        self.with_telemetry(platform, |t| t.failures += 1);
        counter!("fetch_failures_total", "platform" => platform.as_str()).increment(1);
    }
}
