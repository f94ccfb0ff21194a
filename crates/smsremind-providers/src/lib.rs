//! Calendar discovery and event retrieval.
//!
//! This crate provides the abstraction layer between the reminder loop and
//! the calendar server:
//!
//! - [`CalendarProvider`] - The trait calendar backends implement
//! - [`CalendarFilter`] - Selects calendars by display name
//! - [`ProviderError`] - Error types for provider operations
//! - [`caldav`] - The CalDAV backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CalDAV Server  │
//! └────────┬────────┘
//!          │ PROPFIND ×3, REPORT per calendar
//!          ▼
//! ┌─────────────────┐
//! │ CalDavProvider  │
//! └────────┬────────┘
//!          │ CalendarProvider
//!          ▼
//!    ┌───────────┐
//!    │   Event   │
//!    └───────────┘
//! ```

#[cfg(feature = "caldav")]
pub mod caldav;
pub mod error;
pub mod provider;

// Re-export main types at crate root
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{CalendarFilter, CalendarInfo, CalendarProvider};
