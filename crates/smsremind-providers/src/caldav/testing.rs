//! In-memory transport replaying canned responses.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{ProviderError, ProviderResult};

use super::transport::{DavTransport, HttpRequest, HttpResponse};

/// A transport that answers requests from a queue and records them.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<ProviderResult<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn respond(self, response: HttpResponse) -> Self {
        self.push(Ok(response))
    }

    /// Queues a transport failure.
    pub fn fail(self, error: ProviderError) -> Self {
        self.push(Err(error))
    }

    /// Returns every request executed so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(self, response: ProviderResult<HttpResponse>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }
}

impl DavTransport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> ProviderResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::internal(format!(
                    "no scripted response for {} {}",
                    request.method, request.url
                )))
            })
    }
}
