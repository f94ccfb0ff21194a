//! Idempotency store.
//!
//! Remembers which notification keys were already delivered, and when. The
//! whole mapping is rewritten on every change: serialized to `<path>.tmp`
//! and renamed over `<path>`, so readers only ever see a complete snapshot.
//!
//! The store does no file locking of its own. Two processes must never open
//! the same store at once; [`crate::Lock`] is what guarantees that.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StateResult;

type Records = BTreeMap<String, DateTime<Utc>>;

/// A JSON-backed set of delivered notification keys.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    records: Mutex<Records>,
}

impl Store {
    /// Opens the store at `path`, loading existing records.
    ///
    /// A missing file is an empty store; nothing is written until the first
    /// mutation.
    pub fn open(path: impl Into<PathBuf>) -> StateResult<Self> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice::<Records>(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Records::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), count = records.len(), "Opened store");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Returns the path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if `key` was marked.
    pub fn exists(&self, key: impl AsRef<str>) -> bool {
        self.records().contains_key(key.as_ref())
    }

    /// Returns when `key` was marked, if it was.
    pub fn marked_at(&self, key: impl AsRef<str>) -> Option<DateTime<Utc>> {
        self.records().get(key.as_ref()).copied()
    }

    /// Marks `key` as delivered now and persists the store.
    ///
    /// Marking an already marked key succeeds and refreshes its timestamp.
    pub fn mark(&self, key: impl AsRef<str>) -> StateResult<()> {
        self.mark_at(key, Utc::now())
    }

    /// Same as [`Store::mark`] with an explicit timestamp.
    pub fn mark_at(&self, key: impl AsRef<str>, at: DateTime<Utc>) -> StateResult<()> {
        self.update(|records| {
            records.insert(key.as_ref().to_string(), at);
        })
    }

    /// Removes `key` and persists the store.
    pub fn delete(&self, key: impl AsRef<str>) -> StateResult<()> {
        self.update(|records| {
            records.remove(key.as_ref());
        })
    }

    /// Returns all marked keys.
    pub fn keys(&self) -> BTreeSet<String> {
        self.records().keys().cloned().collect()
    }

    /// Returns the number of marked keys.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Returns true if no key is marked.
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` to a copy of the records and persists it. The
    /// in-memory records only change once the copy is on disk.
    fn update(&self, change: impl FnOnce(&mut Records)) -> StateResult<()> {
        let mut records = self.records();
        let mut next = records.clone();
        change(&mut next);
        self.persist(&next)?;
        *records = next;
        Ok(())
    }

    /// Writes the records to a temporary file, syncs it and renames it into
    /// place.
    ///
    /// Must be called with the records lock held.
    fn persist(&self, records: &Records) -> StateResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), count = records.len(), "Persisted store");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
