//! HTTP transport for CalDAV requests.
//!
//! [`DavTransport`] sends exactly one request and returns exactly one
//! response: no redirects are followed and no body decoding happens here.
//! Both are done by [`super::client::CalDavClient`] so that the behaviour is
//! the same for the real [`HttpTransport`] and for scripted transports in
//! tests.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::trace;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// A single HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, e.g. `PROPFIND`.
    pub method: String,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers in send order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Returns the first header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A single HTTP response with its raw (possibly compressed) body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Raw body bytes as received.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response without headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Builder method to add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for statuses that carry a `Location` to follow.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    /// Returns the body as text, gunzipping it when `Content-Encoding: gzip`.
    pub fn decode_body(&self) -> ProviderResult<String> {
        let gzipped = self
            .header("content-encoding")
            .is_some_and(|encoding| encoding.trim().eq_ignore_ascii_case("gzip"));

        let bytes = if gzipped {
            let mut decoded = Vec::new();
            GzDecoder::new(self.body.as_slice())
                .read_to_end(&mut decoded)
                .map_err(|e| {
                    ProviderError::invalid_response(format!("failed to decode gzip body: {}", e))
                        .with_source(e)
                })?;
            decoded
        } else {
            self.body.clone()
        };

        String::from_utf8(bytes).map_err(|e| {
            ProviderError::invalid_response("response body is not valid UTF-8").with_source(e)
        })
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Sends one HTTP request.
pub trait DavTransport {
    /// Executes `request` and returns the response as received.
    ///
    /// Any status code is a successful exchange; only failures to talk to
    /// the server at all are errors.
    fn execute(&self, request: &HttpRequest) -> ProviderResult<HttpResponse>;
}

impl<T: DavTransport + ?Sized> DavTransport for &T {
    fn execute(&self, request: &HttpRequest) -> ProviderResult<HttpResponse> {
        (**self).execute(request)
    }
}

/// [`DavTransport`] over a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the given timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(Policy::none())
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self { client })
    }
}

impl DavTransport for HttpTransport {
    fn execute(&self, request: &HttpRequest) -> ProviderResult<HttpResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ProviderError::internal(format!("Invalid HTTP method: {}", request.method))
        })?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        trace!(method = %request.method, url = %request.url, "Sending request");

        let response = builder.send().map_err(|e| {
            let message = if e.is_timeout() {
                format!("{} {} timed out", request.method, request.url)
            } else {
                format!("{} {} failed: {}", request.method, request.url, e)
            };
            ProviderError::network(message).with_source(e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| {
                ProviderError::network(format!("Failed to read response: {}", e)).with_source(e)
            })?
            .to_vec();

        trace!(status, bytes = body.len(), "Received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
