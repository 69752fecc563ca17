//! HTTP response container and header handling
//!
//! `Response` is the immutable value handed back to callers; `Headers`
//! preserves wire order while offering case-insensitive lookup.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered header collection with case-insensitive, last-wins lookup
///
/// Duplicate names are kept in wire order; `get` returns the value of the
/// last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any earlier occurrences
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Look up a header by name, case-insensitively; last occurrence wins
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Completed HTTP response
///
/// Immutable once constructed. `from_cache` records whether the response
/// was served from the response cache rather than the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Final URL after any redirects
    pub url: String,
    /// HTTP status code
    pub status_code: u16,
    /// Response headers in wire order
    pub headers: Headers,
    /// Raw response body
    pub body: Vec<u8>,
    /// Body decoded as text
    pub text: String,
    /// Encoding label used for decoding
    pub encoding: String,
    /// Wall-clock time the exchange took, in seconds
    pub response_time: f64,
    /// Whether this response was served from cache
    pub from_cache: bool,
}

impl Response {
    /// Parse the response body as JSON
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.text).map_err(|e| Error::Json {
            message: format!("invalid JSON response from {}: {}", self.url, e),
            source: e,
        })
    }

    /// Whether the status code indicates success (2xx or 3xx)
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status_code)
    }
}

/// Decode a response body using the declared charset, falling back to
/// lossy UTF-8. Returns the text and the encoding label that was applied.
///
/// Non-UTF-8 charsets are decoded best-effort; the declared label is still
/// recorded so callers can re-decode the raw body themselves.
pub(crate) fn decode_body(body: &[u8], content_type: Option<&str>) -> (String, String) {
    let declared = content_type.and_then(declared_charset);
    let encoding = declared.unwrap_or_else(|| sniff_encoding(body).to_string());
    let text = String::from_utf8_lossy(body).into_owned();
    (text, encoding)
}

/// Extract the charset parameter from a Content-Type header value
fn declared_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let part = part.trim().to_ascii_lowercase();
        part.strip_prefix("charset=")
            .map(|v| v.trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

fn sniff_encoding(body: &[u8]) -> &'static str {
    // UTF-8 BOM is the only sniff worth doing without a detector
    if body.starts_with(&[0xEF, 0xBB, 0xBF]) {
        "utf-8-sig"
    } else {
        "utf-8"
    }
}
