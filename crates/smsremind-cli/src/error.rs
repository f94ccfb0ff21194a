//! Client error types.

use std::io;

use smsremind_core::{TemplateError, TracingError};
use smsremind_providers::ProviderError;
use smsremind_state::StateError;
use thiserror::Error;

use crate::sms::SendError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Calendar discovery or retrieval failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Lock or store failure.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The message template does not parse.
    #[error("invalid SMS template: {0}")]
    Template(#[from] TemplateError),

    /// Logging could not be initialized.
    #[error(transparent)]
    Tracing(#[from] TracingError),

    /// The SMS gateway rejected a message.
    #[error("failed to send SMS: {0}")]
    Send(#[from] SendError),

    /// Phone number region is not known.
    #[error("invalid phone region: {0}")]
    Phone(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
