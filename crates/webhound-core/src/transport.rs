//! Transport abstraction over the wire client
//!
//! The executors drive a `Transport`; production uses reqwest with one
//! pooled client per egress endpoint, tests inject a scripted double.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::response::Headers;

/// One attempt's worth of request data handed to the transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Egress endpoint selected for this attempt, if any
    pub egress: Option<String>,
}

/// Raw result of a completed exchange
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Transport-level failure, the input to retry classification
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("connection failed: {message}")]
    Connect { message: String },

    #[error("TLS failure: {message}")]
    Tls { message: String },

    #[error("malformed request: {message}")]
    Build { message: String },

    #[error("{message}")]
    Other { message: String },
}

/// A pluggable wire client
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
///
/// reqwest fixes proxies at client construction, so one pooled client is
/// prebuilt per configured egress endpoint plus a default direct client;
/// selection per attempt is a map lookup.
pub struct ReqwestTransport {
    default_client: reqwest::Client,
    egress_clients: HashMap<String, reqwest::Client>,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let default_client = Self::build_client(config, None)?;
        let mut egress_clients = HashMap::new();
        for endpoint in &config.egress_endpoints {
            let client = Self::build_client(config, Some(endpoint))?;
            egress_clients.insert(endpoint.clone(), client);
        }
        Ok(Self {
            default_client,
            egress_clients,
        })
    }

    fn build_client(config: &ClientConfig, egress: Option<&str>) -> Result<reqwest::Client> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(redirect)
            .danger_accept_invalid_certs(!config.verify_tls)
            .pool_max_idle_per_host(config.max_connections_per_host);
        if let Some(endpoint) = egress {
            let proxy = reqwest::Proxy::all(endpoint).map_err(|e| Error::Configuration {
                message: format!("invalid egress endpoint {}: {}", endpoint, e),
            })?;
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(|e| Error::Configuration {
            message: format!("failed to build HTTP client: {}", e),
        })
    }

    fn client_for(&self, egress: Option<&str>) -> &reqwest::Client {
        egress
            .and_then(|endpoint| self.egress_clients.get(endpoint))
            .unwrap_or(&self.default_client)
    }

    fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout { timeout };
        }
        if err.is_connect() {
            // rustls verification failures surface through the connect
            // path; the source chain is the only place they are named
            let chain = format!("{err:?}").to_ascii_lowercase();
            if chain.contains("certificate") || chain.contains("tls") || chain.contains("handshake")
            {
                return TransportError::Tls {
                    message: err.to_string(),
                };
            }
            return TransportError::Connect {
                message: err.to_string(),
            };
        }
        if err.is_builder() {
            return TransportError::Build {
                message: err.to_string(),
            };
        }
        TransportError::Other {
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let client = self.client_for(request.egress.as_deref());
        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .timeout(request.timeout);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, request.timeout))?;

        let url = response.url().to_string();
        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            headers.insert(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(e, request.timeout))?
            .to_vec();

        Ok(TransportResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_egress_endpoint_rejected_at_construction() {
        let config =
            ClientConfig::default().with_egress_endpoints(vec!["::not-a-proxy::".to_string()]);
        assert!(matches!(
            ReqwestTransport::new(&config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn test_clients_prebuilt_per_endpoint() {
        let config = ClientConfig::default().with_egress_endpoints(vec![
            "http://proxy-a:8080".to_string(),
            "http://proxy-b:8080".to_string(),
        ]);
        let transport = ReqwestTransport::new(&config).unwrap();
        assert_eq!(transport.egress_clients.len(), 2);
        // unknown endpoints fall back to the direct client
        let _ = transport.client_for(Some("http://proxy-z:1"));
        let _ = transport.client_for(None);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout {
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }
}
