//! HTTP client for CalDAV operations.
//!
//! This module provides the low-level client that handles:
//! - Basic authentication on every request
//! - PROPFIND and REPORT methods
//! - Manual redirect following that keeps the `Authorization` header
//! - gzip response bodies

use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{ProviderError, ProviderResult};

use super::auth::basic_auth;
use super::endpoint::Credentials;
use super::transport::{DavTransport, HttpRequest, HttpResponse};

/// The `Depth` header of a WebDAV request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// The resource itself.
    Zero,
    /// The resource and its direct members.
    One,
}

impl Depth {
    fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
        }
    }
}

/// A successful response body together with the URL that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResponse {
    /// The URL of the last hop, after redirects.
    pub url: Url,
    /// The decoded response body.
    pub body: String,
}

/// HTTP client for CalDAV operations.
pub struct CalDavClient<T> {
    /// The underlying transport.
    transport: T,
    /// Pre-computed `Authorization` header value.
    authorization: String,
    /// Maximum number of redirects per request.
    max_redirects: usize,
}

impl<T: DavTransport> CalDavClient<T> {
    /// Creates a new CalDAV client.
    pub fn new(transport: T, credentials: &Credentials, max_redirects: usize) -> Self {
        Self {
            transport,
            authorization: basic_auth(credentials.principal(), credentials.password()),
            max_redirects,
        }
    }

    /// Performs a PROPFIND request.
    ///
    /// Used for principal, home set and calendar discovery.
    pub fn propfind(&self, url: &Url, depth: Depth, body: &str) -> ProviderResult<DavResponse> {
        self.request("PROPFIND", url, depth, body)
    }

    /// Performs a REPORT request.
    ///
    /// Used for calendar-query.
    pub fn report(&self, url: &Url, depth: Depth, body: &str) -> ProviderResult<DavResponse> {
        self.request("REPORT", url, depth, body)
    }

    /// Sends a request, following redirects with method, body and
    /// credentials unchanged.
    fn request(
        &self,
        method: &str,
        url: &Url,
        depth: Depth,
        body: &str,
    ) -> ProviderResult<DavResponse> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let request = HttpRequest {
                method: method.to_string(),
                url: current.clone(),
                headers: vec![
                    ("Authorization".to_string(), self.authorization.clone()),
                    (
                        "Accept".to_string(),
                        "application/xml, text/xml, */*".to_string(),
                    ),
                    (
                        "Content-Type".to_string(),
                        "application/xml; charset=utf-8".to_string(),
                    ),
                    ("Accept-Encoding".to_string(), "gzip".to_string()),
                    ("Depth".to_string(), depth.as_str().to_string()),
                ],
                body: Some(body.to_string()),
            };

            trace!(method = %method, url = %current, depth = depth.as_str(), "Sending request");
            let response = self.transport.execute(&request)?;

            if response.is_redirect()
                && let Some(location) = response.header("location")
            {
                hops += 1;
                if hops > self.max_redirects {
                    return Err(ProviderError::invalid_response(format!(
                        "{} {} -> too many redirects (more than {})",
                        method, url, self.max_redirects
                    )));
                }

                let next = current.join(location.trim()).map_err(|e| {
                    ProviderError::invalid_response(format!(
                        "invalid redirect location {:?}: {}",
                        location, e
                    ))
                    .with_source(e)
                })?;
                if current.scheme() == "https" && next.scheme() != "https" {
                    return Err(ProviderError::invalid_response(format!(
                        "{} {} -> refusing redirect from https to {}",
                        method, current, next
                    )));
                }
                debug!(from = %current, to = %next, status = response.status, "Following redirect");
                current = next;
                continue;
            }

            return handle_response(method, current, response);
        }
    }
}

/// Maps the final response to a body or an error.
///
/// The body is kept in error messages since servers explain failures there.
fn handle_response(method: &str, url: Url, response: HttpResponse) -> ProviderResult<DavResponse> {
    let status = response.status;
    trace!(status, "Received response");

    if response.is_success() {
        let body = response.decode_body()?;
        return Ok(DavResponse { url, body });
    }

    let body = response.decode_body().unwrap_or_default();
    let message = format!("{} {} -> {}\n{}", method, url, status, body.trim());

    Err(match status {
        401 => ProviderError::authentication(message),
        403 => ProviderError::authorization(message),
        404 => ProviderError::not_found(message),
        429 => ProviderError::rate_limited(message),
        s if s >= 500 => ProviderError::server(message),
        s => {
            warn!(status = s, url = %url, "Unexpected response status");
            ProviderError::invalid_response(message)
        }
    })
}
