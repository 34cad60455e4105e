//! Derives the on-disk layout shared by brokers and the tools that inspect
//! them.
//!
//! Every broker on a host advertises itself under the same `brokers/`
//! directory, so peers and post-mortem tooling must agree on how that
//! directory is resolved.

use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;
use crate::defaults::default_data_dir;

const BROKERS_DIR: &str = "brokers";

/// Canonical paths for broker runtime data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    data_dir: PathBuf,
    brokers_dir: PathBuf,
}

impl DataPaths {
    /// Derives the data paths from configuration and creates the registry
    /// directory (mode `0755`) when it is missing.
    pub fn from_config(config: &Config) -> Result<Self, DataPathsError> {
        let data_dir = config
            .data_dir()
            .map(|dir| dir.as_std_path().to_path_buf())
            .unwrap_or_else(default_data_dir);
        Self::under(data_dir)
    }

    /// Derives the data paths rooted at an explicit directory.
    pub fn under(data_dir: impl Into<PathBuf>) -> Result<Self, DataPathsError> {
        let data_dir = data_dir.into();
        let brokers_dir = data_dir.join(BROKERS_DIR);
        create_directory(&brokers_dir)?;
        Ok(Self {
            data_dir,
            brokers_dir,
        })
    }

    /// Root data directory.
    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_path()
    }

    /// Directory holding one record file per running broker.
    pub fn brokers_dir(&self) -> &Path {
        self.brokers_dir.as_path()
    }
}

fn create_directory(path: &Path) -> Result<(), DataPathsError> {
    if path.is_dir() {
        return Ok(());
    }
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    let to_error = |source: io::Error| DataPathsError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    };
    match builder.create(path) {
        Ok(()) => {}
        Err(source) if source.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
        Err(source) => return Err(to_error(source)),
    }
    // The process umask may have narrowed the mode requested above.
    #[cfg(unix)]
    {
        use std::fs::{self, Permissions};
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, Permissions::from_mode(0o755)).map_err(to_error)?;
    }
    Ok(())
}

/// Errors raised while deriving broker data paths.
#[derive(Debug, Error)]
pub enum DataPathsError {
    /// Creating the registry directory failed.
    #[error("failed to prepare data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
