//! Scratch data directories and loopback configurations.

use std::path::{Path, PathBuf};

use broker_config::Config;
use camino::Utf8PathBuf;
use tempfile::TempDir;

/// Temporary data directory removed when dropped.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Root data directory.
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding the instance records.
    pub fn brokers_dir(&self) -> PathBuf {
        self.dir.path().join("brokers")
    }

    /// Names of the record files currently on disk.
    pub fn record_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.brokers_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".json"))
            .collect();
        names.sort();
        names
    }

    /// Loopback configuration with an ephemeral port and a fast heartbeat.
    pub fn config(&self, workers: usize) -> Config {
        let data_dir =
            Utf8PathBuf::from_path_buf(self.data_dir().to_path_buf()).expect("utf8 temp path");
        Config {
            frontend_host: Some("127.0.0.1".to_owned()),
            frontend_port: Some(0),
            workers: Some(workers),
            heartbeat_interval_ms: Some(100),
            heartbeat_liveness: Some(3),
            data_dir: Some(data_dir),
            log_filter: Some("off".to_owned()),
            ..Config::default()
        }
    }
}

/// Fresh scratch directory.
#[must_use]
pub fn scratch() -> Scratch {
    Scratch {
        dir: tempfile::tempdir().expect("temp dir"),
    }
}
