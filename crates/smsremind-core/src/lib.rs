//! Core types: events, notification keys, day windows, message templates

pub mod event;
pub mod template;
pub mod time;
pub mod tracing;

pub use event::{Event, NotificationKey};
pub use template::{DEFAULT_TEMPLATE, MessageTemplate, TemplateError, TemplateField};
pub use time::{TimeWindow, target_day};
pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
