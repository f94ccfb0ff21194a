//! Lock file management.
//!
//! A [`Lock`] keeps overlapping reminder runs apart. The lock file is created
//! atomically and records who took it and when; a lock older than the
//! configured maximum age is considered stale and is taken over.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};

/// Content of a lock file: `"<pid> <RFC3339-UTC>\n"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Process ID of the holder.
    pub pid: u32,
    /// When the lock was taken, truncated to seconds.
    pub created: DateTime<Utc>,
}

impl LockRecord {
    /// Creates a record for the current process.
    pub fn current(now: DateTime<Utc>) -> Self {
        Self {
            pid: process::id(),
            created: now,
        }
    }

    /// Age of the record at `now`. Negative if the record is from the future.
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.created
    }
}

impl fmt::Display for LockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}",
            self.pid,
            self.created.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

impl FromStr for LockRecord {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(pid), Some(created)) = (parts.next(), parts.next()) else {
            return Err(StateError::invalid_lock("invalid lock format"));
        };
        let pid = pid
            .parse::<u32>()
            .map_err(|e| StateError::invalid_lock(format!("bad pid {:?}: {}", pid, e)))?;
        let created = DateTime::parse_from_rfc3339(created)
            .map_err(|e| StateError::invalid_lock(format!("bad timestamp {:?}: {}", created, e)))?
            .with_timezone(&Utc);
        Ok(Self { pid, created })
    }
}

/// An acquired lock.
///
/// The lock file is removed by [`Lock::release`], or on drop if it was never
/// released explicitly, so every exit path frees it.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    released: bool,
}

impl Lock {
    /// Acquires the lock at `path`, taking over a lock older than `max_age`.
    ///
    /// Fails with [`StateError::LockHeld`] if a fresh lock exists; callers
    /// should treat that as "another run is active" rather than a failure.
    pub fn acquire(path: impl Into<PathBuf>, max_age: Duration) -> StateResult<Self> {
        Self::acquire_at(path, max_age, Utc::now())
    }

    /// Same as [`Lock::acquire`] with an explicit clock reading.
    pub fn acquire_at(
        path: impl Into<PathBuf>,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> StateResult<Self> {
        let path = path.into();
        let now = now.trunc_subsecs(0);
        let record = LockRecord::current(now);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if try_create(&path, &record)? {
            info!(path = %path.display(), pid = record.pid, "Acquired lock");
            return Ok(Self {
                path,
                released: false,
            });
        }

        let existing = match fs::read_to_string(&path) {
            Ok(content) => Some(content.parse::<LockRecord>()?),
            // Released between our create attempt and the read.
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(existing) = existing {
            let age = existing.age(now);
            let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
            if age < max_age {
                debug!(
                    path = %path.display(),
                    pid = existing.pid,
                    age_secs = age.num_seconds(),
                    "Lock is held by another run"
                );
                return Err(StateError::LockHeld {
                    pid: existing.pid,
                    age,
                });
            }

            warn!(
                path = %path.display(),
                pid = existing.pid,
                age_secs = age.num_seconds(),
                "Removing stale lock"
            );
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if try_create(&path, &record)? {
            info!(path = %path.display(), pid = record.pid, "Acquired lock");
            return Ok(Self {
                path,
                released: false,
            });
        }

        Err(StateError::StaleLockRetry {
            path: path.to_string_lossy().into_owned(),
        })
    }

    /// Returns the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock by deleting the lock file.
    ///
    /// Ownership of the file is not checked.
    pub fn release(mut self) -> StateResult<()> {
        self.released = true;
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "Released lock");
        Ok(())
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove lock file"
            );
        } else {
            debug!(path = %self.path.display(), "Removed lock file");
        }
    }
}

/// Creates the lock file exclusively. Returns `false` if it already exists.
fn try_create(path: &Path, record: &LockRecord) -> StateResult<bool> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let written = file
        .write_all(record.to_string().as_bytes())
        .and_then(|()| file.sync_all());
    if let Err(e) = written {
        // An empty lock file would block every later run.
        let _ = fs::remove_file(path);
        return Err(e.into());
    }
    Ok(true)
}
