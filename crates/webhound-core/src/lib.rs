//! Webhound Core - resilient outbound HTTP request engine
//!
//! This crate is the request-execution substrate for web reconnaissance
//! tooling: it issues network requests under admission control, shields
//! callers from transient failures, and avoids redundant network calls.
//!
//! # Main Components
//!
//! - **RateLimiter**: token-bucket admission control shared across all
//!   requests issued through a client
//! - **ResponseCache**: two-tier (memory + optional durable) store of
//!   prior responses with TTL expiry and LRU eviction
//! - **Rotators**: identity rotation across requests and egress rotation
//!   across attempts, with failure tracking
//! - **Executors**: [`AsyncClient`] and [`blocking::Client`], sharing one
//!   retry/backoff/cache state machine
//!
//! # Example
//!
//! ```no_run
//! use webhound_core::{AsyncClient, ClientConfig, RequestOptions, Result};
//!
//! async fn example() -> Result<()> {
//!     let client = AsyncClient::new(ClientConfig::default())?;
//!     let response = client.get("https://example.com", RequestOptions::new()).await?;
//!     println!("{} in {:.3}s", response.status_code, response.response_time);
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod response;
pub mod retry;
pub mod rotation;
pub mod transport;


// Re-export main types for convenience
pub use cache::{CacheStats, ResponseCache};
pub use client::{AsyncClient, RequestOptions};
pub use config::{CacheConfig, ClientConfig, RateLimitConfig, RotationMode};
pub use error::{Error, Result};
pub use rate_limit::{RateLimiter, RateLimiterStats};
pub use response::{Headers, Response};
pub use retry::{classify, Classification, RetryPolicy};
pub use rotation::{EgressRotator, IdentityRotator};
pub use transport::{Transport, TransportError, TransportRequest, TransportResponse};

// Re-export commonly used types
pub use reqwest::Method;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
