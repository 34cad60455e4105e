//! On-disk registry of running brokers.
//!
//! Each broker advertises itself with one `<name>.json` record in the shared
//! `brokers/` directory and removes it on graceful shutdown. Records left
//! behind by brokers that died are found by [`InstanceRegistry::reap_stale`].

mod vitals;

use std::fs::{self, Permissions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use broker_config::DataPaths;
use broker_types::InstanceRecord;
use rand::Rng;
use tempfile::Builder;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

pub use self::vitals::{PeerVitals, SystemVitals};
#[cfg(test)]
pub(crate) use self::vitals::MockPeerVitals;

use crate::sync::lock;

const INSTANCES_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::instances");
const NAME_PREFIX: &str = "broker-";
const NAME_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const NAME_SUFFIX_LEN: usize = 5;
const NAME_ATTEMPTS: usize = 8;
const RECORD_EXTENSION: &str = "json";

/// Errors raised while reading or writing instance records.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Writing a record failed.
    #[error("failed to write instance record '{path}': {source}")]
    Write {
        /// Record path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Serialising a record failed.
    #[error("failed to serialise instance record: {source}")]
    Serialise {
        /// Underlying serialisation error.
        #[from]
        source: serde_json::Error,
    },
    /// Formatting the start timestamp failed.
    #[error("failed to format instance timestamp: {source}")]
    Timestamp {
        /// Underlying formatting error.
        #[from]
        source: time::error::Format,
    },
    /// Listing the registry directory failed.
    #[error("failed to read registry directory '{path}': {source}")]
    ReadDirectory {
        /// Registry directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a record failed.
    #[error("failed to remove instance record '{path}': {source}")]
    Remove {
        /// Record path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Every generated name collided with an existing record.
    #[error("no free instance name after {attempts} attempts")]
    NamesExhausted {
        /// Number of names tried.
        attempts: usize,
    },
}

/// When a record whose process still exists counts as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapPolicy {
    /// Records older than this whose port is closed are stale.
    pub stale_after: Duration,
}

/// Handle on the `brokers/` directory.
#[derive(Debug, Clone)]
pub struct InstanceRegistry {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl InstanceRegistry {
    /// Opens the registry under the resolved data paths.
    #[must_use]
    pub fn open(paths: &DataPaths) -> Self {
        Self::at(paths.brokers_dir())
    }

    /// Opens the registry rooted at an existing directory.
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory holding the records.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Writes a record for this process listening on `port`.
    ///
    /// The file is created exclusively; a name already taken is retried with
    /// a fresh random name.
    pub fn advertise(&self, port: u16) -> Result<InstanceGuard, RegistryError> {
        let time = OffsetDateTime::now_utc().format(&Rfc3339)?;
        let _held = lock(&self.lock);
        for _ in 0..NAME_ATTEMPTS {
            let record = InstanceRecord {
                name: generate_name(),
                port: port.to_string(),
                pid: std::process::id(),
                time: time.clone(),
            };
            let path = self.record_path(&record.name);
            match self.write_exclusive(&path, &record)? {
                Written::Created => {
                    info!(
                        target: INSTANCES_TARGET,
                        name = %record.name,
                        port,
                        file = %path.display(),
                        "instance record written"
                    );
                    return Ok(InstanceGuard {
                        record,
                        path,
                        lock: Arc::clone(&self.lock),
                        removed: false,
                    });
                }
                Written::NameTaken => {
                    debug!(target: INSTANCES_TARGET, name = %record.name, "instance name taken; retrying");
                }
            }
        }
        Err(RegistryError::NamesExhausted {
            attempts: NAME_ATTEMPTS,
        })
    }

    /// Reads every record in the directory, sorted by name.
    ///
    /// Files that cannot be read or parsed, or whose file name does not match
    /// the name inside, are skipped with a warning.
    pub fn list_peers(&self) -> Result<Vec<InstanceRecord>, RegistryError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(path, record)| {
                let matches = names_record(path, record);
                if !matches {
                    warn!(
                        target: INSTANCES_TARGET,
                        file = %path.display(),
                        name = %record.name,
                        "skipping instance record stored under another name"
                    );
                }
                matches
            })
            .map(|(_, record)| record)
            .collect())
    }

    /// Removes records whose broker is gone and returns them.
    ///
    /// A record is stale when its process no longer exists, or when it is
    /// older than `policy.stale_after` and nothing answers on its port. The
    /// file that was read is the one removed, whatever name it holds.
    pub fn reap_stale(
        &self,
        policy: &ReapPolicy,
        vitals: &dyn PeerVitals,
    ) -> Result<Vec<InstanceRecord>, RegistryError> {
        let now = OffsetDateTime::now_utc();
        let mut reaped = Vec::new();
        for (path, record) in self.scan()? {
            if !is_stale(&record, policy, vitals, now) {
                continue;
            }
            if !names_record(&path, &record) {
                warn!(
                    target: INSTANCES_TARGET,
                    file = %path.display(),
                    name = %record.name,
                    "stale instance record stored under another name"
                );
            }
            let removal = {
                let _held = lock(&self.lock);
                remove_file(&path)
            };
            match removal {
                Ok(()) => {
                    info!(
                        target: INSTANCES_TARGET,
                        kind = "PeerStale",
                        name = %record.name,
                        pid = record.pid,
                        port = %record.port,
                        file = %path.display(),
                        "reaped stale instance record"
                    );
                    reaped.push(record);
                }
                Err(error) => {
                    warn!(target: INSTANCES_TARGET, error = %error, "failed to reap stale instance record");
                }
            }
        }
        Ok(reaped)
    }

    /// Parses every record file, keeping the path each came from.
    fn scan(&self) -> Result<Vec<(PathBuf, InstanceRecord)>, RegistryError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| RegistryError::ReadDirectory {
            path: self.dir.clone(),
            source,
        })?;
        let mut records = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(error) => {
                    warn!(target: INSTANCES_TARGET, error = %error, "skipping unreadable registry entry");
                    continue;
                }
            };
            if !is_record_file(&path) {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push((path, record)),
                Err(error) => {
                    warn!(
                        target: INSTANCES_TARGET,
                        file = %path.display(),
                        error = %error,
                        "skipping unreadable instance record"
                    );
                }
            }
        }
        records.sort_by(|left, right| left.1.name.cmp(&right.1.name).then_with(|| left.0.cmp(&right.0)));
        Ok(records)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{RECORD_EXTENSION}"))
    }

    fn write_exclusive(&self, path: &Path, record: &InstanceRecord) -> Result<Written, RegistryError> {
        let write_error = |source: io::Error| RegistryError::Write {
            path: path.to_path_buf(),
            source,
        };
        let contents = serde_json::to_vec_pretty(record)?;

        let mut builder = Builder::new();
        builder.prefix(".broker-").suffix(".tmp");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(Permissions::from_mode(0o644));
        }
        let mut file = builder.tempfile_in(&self.dir).map_err(write_error)?;
        file.write_all(&contents).map_err(write_error)?;
        file.write_all(b"\n").map_err(write_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // The umask may have narrowed the requested mode.
            file.as_file()
                .set_permissions(Permissions::from_mode(0o644))
                .map_err(write_error)?;
        }
        file.as_file().sync_all().map_err(write_error)?;
        match file.persist_noclobber(path) {
            Ok(_) => Ok(Written::Created),
            Err(error) if error.error.kind() == io::ErrorKind::AlreadyExists => Ok(Written::NameTaken),
            Err(error) => Err(write_error(error.error)),
        }
    }
}

enum Written {
    Created,
    NameTaken,
}

/// Owns this broker's record and removes it when dropped.
#[derive(Debug)]
pub struct InstanceGuard {
    record: InstanceRecord,
    path: PathBuf,
    lock: Arc<Mutex<()>>,
    removed: bool,
}

impl InstanceGuard {
    /// The advertised record.
    #[must_use]
    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    /// Location of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the record file.
    pub fn remove(mut self) -> Result<(), RegistryError> {
        self.removed = true;
        let _held = lock(&self.lock);
        remove_file(&self.path)?;
        info!(target: INSTANCES_TARGET, name = %self.record.name, "instance record removed");
        Ok(())
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        let _held = lock(&self.lock);
        if let Err(error) = remove_file(&self.path) {
            warn!(target: INSTANCES_TARGET, error = %error, "failed to remove instance record");
        }
    }
}

fn generate_name() -> String {
    let mut rng = rand::rng();
    let mut name = String::with_capacity(NAME_PREFIX.len() + NAME_SUFFIX_LEN);
    name.push_str(NAME_PREFIX);
    for _ in 0..NAME_SUFFIX_LEN {
        let index = rng.random_range(0..NAME_LETTERS.len());
        name.push(char::from(NAME_LETTERS[index]));
    }
    name
}

fn is_record_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_none_or(|name| name.starts_with('.'));
    !hidden && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) && path.is_file()
}

fn names_record(path: &Path, record: &InstanceRecord) -> bool {
    path.file_stem().is_some_and(|stem| stem == record.name.as_str())
}

fn read_record(path: &Path) -> io::Result<InstanceRecord> {
    let contents = fs::read(path)?;
    serde_json::from_slice(&contents).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

fn remove_file(path: &Path) -> Result<(), RegistryError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RegistryError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn is_stale(
    record: &InstanceRecord,
    policy: &ReapPolicy,
    vitals: &dyn PeerVitals,
    now: OffsetDateTime,
) -> bool {
    if !vitals.process_alive(record.pid) {
        return true;
    }
    let expired = match OffsetDateTime::parse(&record.time, &Rfc3339) {
        Ok(started) => now - started > policy.stale_after,
        Err(_) => true,
    };
    if !expired {
        return false;
    }
    !record
        .port_number()
        .is_some_and(|port| vitals.port_answers(port))
}
