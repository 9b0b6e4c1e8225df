//! Lease records and the coordination-store seam
//!
//! A lease is a small JSON record naming the current holder and its last
//! renew time. The [`LeaseBackend`] trait is the boundary a cluster-native
//! lock (e.g. a Kubernetes Lease) would implement; the built-in backend
//! keeps the record in a file on a shared volume, with an `fs2` exclusive
//! lock making each read-modify-write atomic across replicas.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from the coordination store
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt lease record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The persisted claim on the lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Identity of the replica holding the lease
    pub holder: String,

    /// Last time the holder renewed
    pub renew_time: DateTime<Utc>,

    /// Seconds after `renew_time` at which the lease lapses
    pub lease_duration_secs: u64,
}

impl LeaseRecord {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.renew_time);
        age.num_milliseconds() > (self.lease_duration_secs as i64) * 1000
    }
}

/// What one acquire/renew attempt observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseObservation {
    /// Identity of the current holder after the attempt
    pub holder: String,

    /// True when the caller is the holder (acquired or renewed)
    pub held_by_self: bool,
}

/// One lease per lock identity against a shared store
pub trait LeaseBackend: Send + Sync {
    /// Acquire the lease if it is free, lapsed, or already ours (renew).
    /// Returns the holder after the attempt either way.
    fn try_acquire_or_renew(
        &self,
        identity: &str,
        lease_duration: Duration,
    ) -> Result<LeaseObservation, LeaseError>;

    /// Drop the lease if held by `identity`, so a successor is elected
    /// promptly after shutdown.
    fn release(&self, identity: &str) -> Result<(), LeaseError>;

    /// Cheap startup probe. An error means the store cannot be used and the
    /// caller degrades to single-instance mode.
    fn check_available(&self) -> Result<(), LeaseError>;
}

/// File-based lease backend: record at `<path>`, mutex at `<path>.lock`
#[derive(Debug)]
pub struct FileLeaseBackend {
    path: PathBuf,
}

impl FileLeaseBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn lock_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".lock");
        PathBuf::from(p)
    }

    /// Take the exclusive file lock guarding the record
    fn guard(&self) -> Result<fs::File, LeaseError> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn read_record(&self) -> Result<Option<LeaseRecord>, LeaseError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, record: &LeaseRecord) -> Result<(), LeaseError> {
        // Write-then-rename so readers never see a torn record
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(record)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LeaseBackend for FileLeaseBackend {
    fn try_acquire_or_renew(
        &self,
        identity: &str,
        lease_duration: Duration,
    ) -> Result<LeaseObservation, LeaseError> {
        let guard = self.guard()?;
        let now = Utc::now();

        let current = self.read_record().unwrap_or_else(|e| {
            // A corrupt record is treated as lapsed rather than wedging
            // every replica forever
            debug!(error = %e, path = %self.path.display(), "discarding unreadable lease record");
            None
        });

        let observation = match current {
            Some(rec) if rec.holder != identity && !rec.expired(now) => LeaseObservation {
                holder: rec.holder,
                held_by_self: false,
            },
            _ => {
                let record = LeaseRecord {
                    holder: identity.to_string(),
                    renew_time: now,
                    lease_duration_secs: lease_duration.as_secs(),
                };
                self.write_record(&record)?;
                LeaseObservation {
                    holder: identity.to_string(),
                    held_by_self: true,
                }
            }
        };

        let _ = fs2::FileExt::unlock(&guard);
        Ok(observation)
    }

    fn release(&self, identity: &str) -> Result<(), LeaseError> {
        let guard = self.guard()?;

        if let Ok(Some(rec)) = self.read_record() {
            if rec.holder == identity {
                fs::remove_file(&self.path)?;
                debug!(path = %self.path.display(), "released lease");
            }
        }

        let _ = fs2::FileExt::unlock(&guard);
        Ok(())
    }

    fn check_available(&self) -> Result<(), LeaseError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| LeaseError::Unavailable(format!("lock path {} has no parent directory", self.path.display())))?;
        fs::create_dir_all(dir)
            .map_err(|e| LeaseError::Unavailable(format!("cannot create lock directory {}: {}", dir.display(), e)))?;
        probe_writable(dir)?;
        Ok(())
    }
}

fn probe_writable(dir: &Path) -> Result<(), LeaseError> {
    let probe = dir.join(".mw-probe");
    fs::write(&probe, b"ok")
        .map_err(|e| LeaseError::Unavailable(format!("lock directory {} not writable: {}", dir.display(), e)))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}
