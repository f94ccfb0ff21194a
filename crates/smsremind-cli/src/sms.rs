//! SMS delivery through the ASPSMS web API.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// The `SendSimpleSMS` endpoint of the ASPSMS web API.
pub const ASPSMS_ENDPOINT: &str = "https://webapi.aspsms.com/SendSimpleSMS";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while sending a message.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("missing ASPSMS user key")]
    MissingUserKey,

    #[error("missing ASPSMS password")]
    MissingPassword,

    #[error("invalid request: {0}")]
    Request(String),

    /// The request never got a response. The URL is stripped since it
    /// carries the credentials.
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("ASPSMS error: {description} (code: {code})")]
    Gateway { code: i64, description: String },

    #[error("unexpected ASPSMS response: {body}")]
    UnexpectedResponse { body: String },
}

/// Delivers a text message to a single recipient.
pub trait Sender {
    /// Sends `text` to `recipient`, an E.164 number.
    fn send(&self, recipient: &str, text: &str) -> Result<(), SendError>;
}

/// ASPSMS client using the `SendSimpleSMS` GET endpoint.
pub struct AspSmsClient {
    user_key: String,
    password: String,
    originator: String,
    client: Client,
}

impl AspSmsClient {
    /// Creates a client. Credentials are checked when sending, so a dry run
    /// works without them.
    pub fn new(
        user_key: impl Into<String>,
        password: impl Into<String>,
        originator: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::Http(e.without_url()))?;

        Ok(Self {
            user_key: user_key.into(),
            password: password.into(),
            originator: originator.into(),
            client,
        })
    }

    /// Builds the request URL for one message.
    fn request_url(&self, recipient: &str, text: &str) -> Result<Url, SendError> {
        if self.user_key.is_empty() {
            return Err(SendError::MissingUserKey);
        }
        if self.password.is_empty() {
            return Err(SendError::MissingPassword);
        }

        let mut params = vec![
            ("UserKey", self.user_key.as_str()),
            ("Password", self.password.as_str()),
            ("MSISDN", recipient),
            ("MessageData", text),
        ];
        let originator = self.originator.trim();
        if !originator.is_empty() {
            params.push(("Originator", originator));
        }

        Url::parse_with_params(ASPSMS_ENDPOINT, &params)
            .map_err(|e| SendError::Request(e.to_string()))
    }
}

impl Sender for AspSmsClient {
    fn send(&self, recipient: &str, text: &str) -> Result<(), SendError> {
        let url = self.request_url(recipient, text)?;
        debug!(recipient = %recipient, "Sending SMS");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SendError::Http(e.without_url()))?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        trace!(status, body = %body, "ASPSMS response");

        check_response(status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayReply {
    #[serde(rename = "ErrorCode", default)]
    error_code: i64,
    #[serde(rename = "ErrorDescription", default)]
    error_description: String,
}

/// Interprets a gateway response. `ErrorCode` 0 and 1 both mean accepted.
fn check_response(status: u16, body: &str) -> Result<(), SendError> {
    let body = body.trim();
    if !(200..300).contains(&status) {
        return Err(SendError::Status {
            status,
            body: body.to_string(),
        });
    }

    match serde_json::from_str::<GatewayReply>(body) {
        Ok(reply) if reply.error_code == 0 || reply.error_code == 1 => Ok(()),
        Ok(reply) => Err(SendError::Gateway {
            code: reply.error_code,
            description: reply.error_description,
        }),
        Err(_) => Err(SendError::UnexpectedResponse {
            body: body.to_string(),
        }),
    }
}
