//! Maintenance of the record of sent reminders.

use std::io::Write;

use smsremind_state::{Lock, Store};

use crate::config::Settings;
use crate::error::{ClientError, ClientResult};

/// Lists sent reminders, oldest key first, with the time they were sent.
pub fn list(settings: &Settings, out: &mut dyn Write) -> ClientResult<()> {
    let store = Store::open(settings.store_path())?;
    for key in store.keys() {
        match store.marked_at(&key) {
            Some(at) => writeln!(out, "{}\t{}", at.to_rfc3339(), key)?,
            None => writeln!(out, "-\t{}", key)?,
        }
    }
    Ok(())
}

/// Removes `key` so that the next run sends that reminder again.
///
/// Takes the run lock, so it fails while a run is active.
pub fn forget(settings: &Settings, key: &str, out: &mut dyn Write) -> ClientResult<()> {
    let lock = Lock::acquire(settings.lock_path(), settings.lock_max_age())?;
    let store = Store::open(settings.store_path())?;
    if !store.exists(key) {
        return Err(ClientError::config(format!("no sent reminder with key {:?}", key)));
    }
    store.delete(key)?;
    lock.release()?;
    writeln!(out, "Forgot {}", key)?;
    Ok(())
}
