//! Asynchronous request executor
//!
//! Composes the rate limiter, rotators, and response cache around a
//! transport and drives the retry state machine. The blocking client in
//! `crate::blocking` runs this same machine on an owned runtime, so the
//! policy exists in exactly one place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use reqwest::Method;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::cache::ResponseCache;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use crate::response::{decode_body, Headers, Response};
use crate::retry::{classify, RetryPolicy};
use crate::rotation::{EgressRotator, IdentityRotator};
use crate::transport::{
    ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse,
};

const IDENTITY_HEADER: &str = "User-Agent";

/// Per-request options and overrides
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub headers: Headers,
    /// Query parameters appended to the URL
    pub params: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Per-request timeout override
    pub timeout: Option<Duration>,
    /// Whether GET responses may be served from and stored to the cache
    pub use_cache: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Headers::new(),
            params: Vec::new(),
            body: None,
            timeout: None,
            use_cache: true,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize a JSON body and set the content type
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Json {
            message: format!("failed to serialize request body: {}", e),
            source: e,
        })?;
        Ok(self
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bypass the cache for this request
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Asynchronous HTTP client
///
/// Cloning is cheap and clones share the same rate limiter, cache, and
/// rotators; collaborators can also be shared across independently
/// configured clients via [`AsyncClient::with_collaborators`].
#[derive(Clone)]
pub struct AsyncClient {
    config: Arc<ClientConfig>,
    retry_policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    identities: Option<Arc<IdentityRotator>>,
    egress: Option<Arc<EgressRotator>>,
}

impl AsyncClient {
    /// Create a client owning all of its collaborators
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);
        Self::from_parts(config, transport, rate_limiter, cache)
    }

    /// Create a client sharing a rate limiter and cache with other
    /// executors. The collaborators are internally synchronized; every
    /// sharing client observes one token bucket and one cache.
    pub fn with_collaborators(
        config: ClientConfig,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
    ) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);
        Self::from_parts(config, transport, rate_limiter, cache)
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
    ) -> Result<Self> {
        let identities = config
            .identity_rotation
            .then(|| Arc::new(IdentityRotator::with_defaults(config.identity_mode)));
        let egress = (!config.egress_endpoints.is_empty())
            .then(|| Arc::new(EgressRotator::new(config.egress_endpoints.clone())));
        let retry_policy = RetryPolicy {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            ..RetryPolicy::default()
        };
        Ok(Self {
            config: Arc::new(config),
            retry_policy,
            transport,
            rate_limiter,
            cache,
            identities,
            egress,
        })
    }

    /// Execute a request with caching, rate limiting, and retries
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let base = Url::parse(url).map_err(|e| Error::InvalidRequest {
            message: format!("invalid URL {}: {}", url, e),
        })?;

        let cacheable = method == Method::GET && options.use_cache;
        let cache_params = if options.params.is_empty() {
            None
        } else {
            Some(options.params.as_slice())
        };
        if cacheable {
            if let Some(hit) = self.cache.get(method.as_str(), base.as_str(), cache_params) {
                log::debug!("cache hit for {}", base);
                return Ok(hit);
            }
        }

        let wire_url = build_wire_url(&base, &options.params);
        self.execute_with_retry(method, base, wire_url, options, cacheable)
            .await
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, url, options).await
    }

    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::HEAD, url, options).await
    }

    /// The retry state machine: identity/egress selection, admission,
    /// transport call, classification, backoff
    async fn execute_with_retry(
        &self,
        method: Method,
        base: Url,
        wire_url: Url,
        options: RequestOptions,
        cacheable: bool,
    ) -> Result<Response> {
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let caller_set_identity = options.headers.contains(IDENTITY_HEADER);
        let cache_params = if options.params.is_empty() {
            None
        } else {
            Some(options.params.as_slice())
        };

        let mut backoff = self.retry_policy.create_backoff();
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.retry_policy.max_retries {
            let mut headers = options.headers.clone();
            if !caller_set_identity {
                if let Some(rotator) = &self.identities {
                    headers.insert(IDENTITY_HEADER, rotator.get_next());
                }
            }
            let egress = self.egress.as_ref().and_then(|rotator| rotator.get_next());

            self.rate_limiter.acquire_async(1).await;

            let started = Instant::now();
            let attempt_result = self
                .transport
                .execute(TransportRequest {
                    method: method.clone(),
                    url: wire_url.clone(),
                    headers,
                    body: options.body.clone(),
                    timeout,
                    egress: egress.clone(),
                })
                .await;

            match attempt_result {
                Ok(raw) => {
                    let response = wrap_response(raw, started.elapsed());
                    log::debug!(
                        "HTTP {} {} -> {} in {:.3}s",
                        method,
                        response.url,
                        response.status_code,
                        response.response_time
                    );
                    if cacheable && response.is_success() {
                        self.cache.set(
                            method.as_str(),
                            base.as_str(),
                            cache_params,
                            &response,
                            None,
                        );
                    }
                    return Ok(response);
                }
                Err(failure) => {
                    let error =
                        self.classify_failure(failure, wire_url.as_str(), egress, timeout);
                    if !classify(&error).is_retryable() {
                        return Err(error);
                    }
                    if attempt < self.retry_policy.max_retries {
                        let delay = backoff
                            .next_backoff()
                            .unwrap_or(Duration::from_secs(self.retry_policy.max_delay_secs));
                        log::warn!(
                            "request to {} failed (attempt {}/{}), retrying in {:.3}s: {}",
                            wire_url,
                            attempt + 1,
                            self.retry_policy.max_retries + 1,
                            delay.as_secs_f64(),
                            error
                        );
                        last_error = Some(error);
                        tokio::time::sleep(delay).await;
                    } else {
                        log::error!(
                            "request to {} failed after {} attempts: {}",
                            wire_url,
                            self.retry_policy.max_retries + 1,
                            error
                        );
                        last_error = Some(error);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Network {
            url: wire_url.to_string(),
            status_code: None,
            message: "request failed for unknown reason".to_string(),
        }))
    }

    /// Map a transport failure to the error taxonomy, marking a failed
    /// egress endpoint as a side effect
    fn classify_failure(
        &self,
        failure: TransportError,
        url: &str,
        egress: Option<String>,
        timeout: Duration,
    ) -> Error {
        match failure {
            TransportError::Timeout { .. } => Error::Timeout {
                url: url.to_string(),
                timeout,
            },
            TransportError::Connect { message } => match egress {
                Some(endpoint) => {
                    if let Some(rotator) = &self.egress {
                        rotator.mark_failed(&endpoint);
                    }
                    Error::Proxy {
                        url: url.to_string(),
                        endpoint,
                        message,
                    }
                }
                None => Error::Connection {
                    url: url.to_string(),
                    message,
                },
            },
            TransportError::Tls { message } => Error::Tls {
                url: url.to_string(),
                message,
            },
            TransportError::Build { message } => Error::InvalidRequest { message },
            TransportError::Other { message } => Error::Network {
                url: url.to_string(),
                status_code: None,
                message,
            },
        }
    }

    /// Issue a batch of requests with at most `concurrency` in flight
    ///
    /// Results are returned in input order; completion order across the
    /// batch is unspecified.
    pub async fn request_many(
        &self,
        requests: Vec<(Method, String, RequestOptions)>,
        concurrency: usize,
    ) -> Vec<Result<Response>> {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks: JoinSet<(usize, Result<Response>)> = JoinSet::new();

        for (index, (method, url, options)) in requests.into_iter().enumerate() {
            let client = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Err(Error::Network {
                                url: url.clone(),
                                status_code: None,
                                message: "batch semaphore closed".to_string(),
                            }),
                        )
                    }
                };
                let result = client.request(method, &url, options).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<Response>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => log::error!("batch request task failed: {}", e),
            }
        }
        results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(Error::Network {
                        url: String::new(),
                        status_code: None,
                        message: "batch request did not complete".to_string(),
                    })
                })
            })
            .collect()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        Arc::clone(&self.cache)
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn egress_rotator(&self) -> Option<Arc<EgressRotator>> {
        self.egress.as_ref().map(Arc::clone)
    }

    /// Release pooled connections. Dropping the last clone has the same
    /// effect; this exists as an explicit shutdown point.
    pub async fn close(self) {
        drop(self);
    }
}

/// Append query parameters to the canonical URL for the wire
fn build_wire_url(base: &Url, params: &[(String, String)]) -> Url {
    if params.is_empty() {
        return base.clone();
    }
    let mut url = base.clone();
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    url
}

fn wrap_response(raw: TransportResponse, elapsed: Duration) -> Response {
    let content_type = raw.headers.get("content-type").map(str::to_string);
    let (text, encoding) = decode_body(&raw.body, content_type.as_deref());
    Response {
        url: raw.url,
        status_code: raw.status,
        headers: raw.headers,
        body: raw.body,
        text,
        encoding,
        response_time: elapsed.as_secs_f64(),
        from_cache: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_fatal() {
        let client = AsyncClient::new(ClientConfig::default()).unwrap();
        let result = client
            .request(Method::GET, "not a url", RequestOptions::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidRequest { .. })));
    }

    #[test]
    fn test_build_wire_url_appends_params() {
        let base = Url::parse("http://example.com/search").unwrap();
        let params = vec![
            ("q".to_string(), "rust".to_string()),
            ("page".to_string(), "2".to_string()),
        ];
        let wire = build_wire_url(&base, &params);
        assert_eq!(wire.as_str(), "http://example.com/search?q=rust&page=2");
        // no params leaves the canonical URL untouched
        assert_eq!(build_wire_url(&base, &[]).as_str(), base.as_str());
    }

    #[test]
    fn test_wrap_response_decodes_text() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain; charset=utf-8");
        let raw = TransportResponse {
            url: "http://example.com/".to_string(),
            status: 200,
            headers,
            body: b"hello".to_vec(),
        };
        let response = wrap_response(raw, Duration::from_millis(120));
        assert_eq!(response.text, "hello");
        assert_eq!(response.encoding, "utf-8");
        assert!(!response.from_cache);
        assert!((response.response_time - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_request_options_builders() {
        let options = RequestOptions::new()
            .with_header("X-Probe", "1")
            .with_param("q", "target")
            .with_timeout(Duration::from_secs(3))
            .no_cache();
        assert_eq!(options.headers.get("X-Probe"), Some("1"));
        assert_eq!(options.params.len(), 1);
        assert_eq!(options.timeout, Some(Duration::from_secs(3)));
        assert!(!options.use_cache);
    }

    #[test]
    fn test_with_json_sets_content_type() {
        let options = RequestOptions::new()
            .with_json(&serde_json::json!({"probe": true}))
            .unwrap();
        assert_eq!(options.headers.get("content-type"), Some("application/json"));
        assert!(options.body.is_some());
    }
}
