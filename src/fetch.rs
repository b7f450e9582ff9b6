// src/fetch.rs
//! Rate-limited, retrying HTTP transport.
//!
//! One [`HttpFetcher`] is meant to be shared (behind an `Arc`) by every site
//! worker: its limiter is the single process-wide throttle, so the minimum
//! gap between two outbound requests holds no matter how many sites are
//! interleaved. Retries go through the limiter too.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CrawlerSection;
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// One logical request. GET params go to the query string, POST params
/// are form-encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub params: Vec<(String, String)>,
    /// Charset used when the response does not declare one.
    pub encoding: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            params: Vec::new(),
            encoding: None,
        }
    }

    pub fn post(url: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            params,
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }
}

/// Transport seam used by parsers and the orchestrator.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    /// delay, 2×delay, 4×delay, … capped at 60s
    Exponential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    /// 4xx statuses treated like 5xx.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
            backoff: Backoff::Fixed,
            retryable_statuses: vec![429],
        }
    }
}

impl RetryPolicy {
    const MAX_DELAY: Duration = Duration::from_secs(60);

    /// Wait before attempt `failed + 1`, where `failed` >= 1.
    pub fn delay_for(&self, failed: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 1u32 << failed.saturating_sub(1).min(16);
                self.delay.saturating_mul(factor).min(Self::MAX_DELAY)
            }
        }
    }

    pub fn is_retryable(&self, err: &FetchError) -> bool {
        match err {
            FetchError::Transport(e) => !e.is_builder() && !e.is_redirect(),
            FetchError::Status { status, .. } => {
                *status >= 500 || self.retryable_statuses.contains(status)
            }
            _ => false,
        }
    }
}

/// reqwest-backed [`Fetch`] with a shared minimum inter-request delay.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(
        request_delay: Duration,
        timeout: Duration,
        user_agent: &str,
        policy: RetryPolicy,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        // Burst of one: the limiter hands out a single permit per period.
        let limiter = Quota::with_period(request_delay).map(|q| Arc::new(RateLimiter::direct(q)));

        Ok(Self {
            client,
            limiter,
            policy,
        })
    }

    pub fn from_config(c: &CrawlerSection) -> Result<Self, FetchError> {
        Self::new(c.request_delay(), c.timeout(), &c.user_agent, c.retry_policy())
    }

    async fn attempt(&self, req: &FetchRequest) -> Result<String, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        counter!("fetch_requests_total").increment(1);
        debug!(target: "fetch", method = ?req.method, url = %req.url, "request");

        let builder = match req.method {
            Method::Get if req.params.is_empty() => self.client.get(&req.url),
            Method::Get => self.client.get(&req.url).query(&req.params),
            Method::Post => self.client.post(&req.url).form(&req.params),
        };
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: req.url.clone(),
            });
        }
        let charset = req.encoding.as_deref().unwrap_or("utf-8");
        Ok(resp.text_with_charset(charset).await?)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<String, FetchError> {
        if let Err(e) = url::Url::parse(&req.url) {
            counter!("fetch_failures_total").increment(1);
            return Err(FetchError::InvalidRequest(format!("{}: {e}", req.url)));
        }
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let err = match self.attempt(req).await {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };

            if !self.policy.is_retryable(&err) {
                warn!(target: "fetch", url = %req.url, status = ?err.status(), error = %err, "request failed (terminal)");
                counter!("fetch_failures_total").increment(1);
                return Err(err);
            }
            if attempts > self.policy.max_retries {
                warn!(target: "fetch", url = %req.url, attempts, status = ?err.status(), error = %err, "retries exhausted");
                counter!("fetch_failures_total").increment(1);
                return Err(FetchError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let wait = self.policy.delay_for(attempts);
            warn!(
                target: "fetch",
                url = %req.url,
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            counter!("fetch_retries_total").increment(1);
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Instant;

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::from_millis(10),
            ..RetryPolicy::default()
        }
    }

    fn fetcher(delay: Duration, policy: RetryPolicy) -> HttpFetcher {
        HttpFetcher::new(delay, Duration::from_secs(5), "bid-crawler-test", policy).unwrap()
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            delay: Duration::from_secs(5),
            backoff: Backoff::Exponential,
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_for(1), Duration::from_secs(5));
        assert_eq!(p.delay_for(2), Duration::from_secs(10));
        assert_eq!(p.delay_for(3), Duration::from_secs(20));
        assert_eq!(p.delay_for(10), Duration::from_secs(60));
        assert_eq!(RetryPolicy::default().delay_for(3), Duration::from_secs(5));
    }

    #[test]
    fn status_classification() {
        let p = RetryPolicy::default();
        let st = |status| FetchError::Status {
            status,
            url: String::new(),
        };
        assert!(p.is_retryable(&st(500)));
        assert!(p.is_retryable(&st(503)));
        assert!(p.is_retryable(&st(429)));
        assert!(!p.is_retryable(&st(404)));
        assert!(!p.is_retryable(&st(403)));
        assert!(!p.is_retryable(&FetchError::Cancelled));
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/list")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/list")
            .with_status(200)
            .with_body("<ul></ul>")
            .expect(1)
            .create_async()
            .await;

        let f = fetcher(Duration::ZERO, quick_policy(3));
        let body = f
            .fetch(&FetchRequest::get(format!("{}/list", server.url())))
            .await
            .unwrap();
        assert_eq!(body, "<ul></ul>");
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_terminal() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let f = fetcher(Duration::ZERO, quick_policy(3));
        let err = f
            .fetch(&FetchRequest::get(format!("{}/missing", server.url())))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }), "{err}");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn retryable_status_exhausts_budget() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/busy")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let f = fetcher(Duration::ZERO, quick_policy(2));
        let err = f
            .fetch(&FetchRequest::get(format!("{}/busy", server.url())))
            .await
            .unwrap_err();
        match err {
            FetchError::RetriesExhausted { attempts, ref last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(**last, FetchError::Status { status: 429, .. }));
            }
            other => panic!("unexpected: {other}"),
        }
        m.assert_async().await;
    }

    #[tokio::test]
    async fn unparseable_url_is_rejected_without_retrying() {
        let f = fetcher(Duration::ZERO, quick_policy(3));
        let err = f.fetch(&FetchRequest::get("not a url")).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(ref m) if m.starts_with("not a url")), "{err}");
        assert!(!f.policy.is_retryable(&err));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn consecutive_requests_respect_min_delay() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/p")
            .with_status(200)
            .with_body("ok")
            .expect(3)
            .create_async()
            .await;

        let f = fetcher(Duration::from_millis(150), quick_policy(0));
        let req = FetchRequest::get(format!("{}/p", server.url()));
        let t0 = Instant::now();
        for _ in 0..3 {
            f.fetch(&req).await.unwrap();
        }
        // first request is free, the next two wait one period each
        assert!(t0.elapsed() >= Duration::from_millis(280), "{:?}", t0.elapsed());
    }

    #[tokio::test]
    async fn post_sends_form_and_query_for_get() {
        let mut server = Server::new_async().await;
        let post = server
            .mock("POST", "/search")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page".into(), "2".into()),
                Matcher::UrlEncoded("kw".into(), "医院".into()),
            ]))
            .with_body("posted")
            .create_async()
            .await;
        let get = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("page".into(), "3".into()))
            .with_body("got")
            .create_async()
            .await;

        let f = fetcher(Duration::ZERO, quick_policy(0));
        let url = format!("{}/search", server.url());
        let params = vec![("page".to_string(), "2".to_string()), ("kw".into(), "医院".into())];
        assert_eq!(f.fetch(&FetchRequest::post(&url, params)).await.unwrap(), "posted");

        let mut req = FetchRequest::get(&url);
        req.params.push(("page".into(), "3".into()));
        assert_eq!(f.fetch(&req).await.unwrap(), "got");
        post.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn encoding_hint_decodes_gbk() {
        let mut server = Server::new_async().await;
        // "医院" in GBK
        let _m = server
            .mock("GET", "/gbk")
            .with_header("content-type", "text/html")
            .with_body([0xD2u8, 0xBD, 0xD4, 0xBA])
            .create_async()
            .await;

        let f = fetcher(Duration::ZERO, quick_policy(0));
        let body = f
            .fetch(&FetchRequest::get(format!("{}/gbk", server.url())).with_encoding("gbk"))
            .await
            .unwrap();
        assert_eq!(body, "医院");
    }
}
