//! Blocking request executor
//!
//! A thin wrapper that drives the async executor on an owned runtime.
//! The retry/backoff/cache state machine lives in `crate::client`; this
//! module only swaps the suspension primitive from cooperative yield to
//! blocking the calling thread.

use std::sync::Arc;

use reqwest::Method;

use crate::cache::ResponseCache;
use crate::client::{AsyncClient, RequestOptions};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::rate_limit::RateLimiter;
use crate::response::Response;

/// Blocking HTTP client
///
/// Each in-flight `request` occupies the calling thread. The client may
/// be shared across threads; its collaborators carry their own
/// synchronization.
pub struct Client {
    inner: AsyncClient,
    runtime: tokio::runtime::Runtime,
}

impl Client {
    /// Create a client owning all of its collaborators
    pub fn new(config: ClientConfig) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = AsyncClient::new(config)?;
        Ok(Self { inner, runtime })
    }

    /// Create a client sharing a rate limiter and cache with other
    /// executors; see [`AsyncClient::with_collaborators`]
    pub fn with_collaborators(
        config: ClientConfig,
        rate_limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
    ) -> Result<Self> {
        let runtime = build_runtime()?;
        let inner = AsyncClient::with_collaborators(config, rate_limiter, cache)?;
        Ok(Self { inner, runtime })
    }

    #[cfg(test)]
    pub(crate) fn from_async(inner: AsyncClient) -> Result<Self> {
        let runtime = build_runtime()?;
        Ok(Self { inner, runtime })
    }

    /// Execute a request, blocking the calling thread until it completes
    /// or retries are exhausted
    pub fn request(&self, method: Method, url: &str, options: RequestOptions) -> Result<Response> {
        self.runtime.block_on(self.inner.request(method, url, options))
    }

    pub fn get(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::GET, url, options)
    }

    pub fn post(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::POST, url, options)
    }

    pub fn put(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::PUT, url, options)
    }

    pub fn delete(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::DELETE, url, options)
    }

    pub fn head(&self, url: &str, options: RequestOptions) -> Result<Response> {
        self.request(Method::HEAD, url, options)
    }

    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.inner.cache()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.inner.rate_limiter()
    }

    /// Release pooled connections. Dropping the client has the same
    /// effect; this exists as an explicit shutdown point.
    pub fn close(self) {
        drop(self);
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Io {
            message: "failed to start blocking client runtime".to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_with_defaults() {
        let client = Client::new(ClientConfig::default()).unwrap();
        assert_eq!(client.config().max_retries, 3);
        client.close();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClientConfig::default().with_retry_delay(-1.0);
        assert!(matches!(
            Client::new(config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_invalid_url_is_fatal() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let result = client.get("not a url", RequestOptions::new());
        assert!(matches!(result, Err(Error::InvalidRequest { .. })));
    }

    #[test]
    fn test_shared_collaborators_observe_one_bucket() {
        let config = ClientConfig::default();
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let cache = Arc::new(ResponseCache::new(&config.cache));
        let a = Client::with_collaborators(config.clone(), Arc::clone(&limiter), Arc::clone(&cache))
            .unwrap();
        let b = Client::with_collaborators(config, Arc::clone(&limiter), cache).unwrap();

        limiter.acquire(1);
        let spent = a.rate_limiter().stats().requests_in_window;
        assert_eq!(spent, b.rate_limiter().stats().requests_in_window);
        assert_eq!(spent, 1);
    }
}
