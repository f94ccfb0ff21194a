//! Durable run state.
//!
//! This crate provides the two pieces of local state that make reminder runs
//! safe to repeat:
//! - [`Lock`]: an exclusive, time-bounded lock file so overlapping runs
//!   started by a scheduler do not race each other
//! - [`Store`]: the set of notification keys already delivered, persisted
//!   with write-then-rename so a crash never leaves a half-written file
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use smsremind_state::{Lock, Store};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lock = Lock::acquire("state/smsremind.lock", Duration::from_secs(60))?;
//!     let store = Store::open("state/sent.json")?;
//!     if !store.exists("uid|2024-03-01T09:00:00+01:00|T-1d") {
//!         store.mark("uid|2024-03-01T09:00:00+01:00|T-1d")?;
//!     }
//!     lock.release()?;
//!     Ok(())
//! }
//! ```

mod error;
mod lock;
mod store;

pub use error::{StateError, StateResult};
pub use lock::{Lock, LockRecord};
pub use store::Store;
