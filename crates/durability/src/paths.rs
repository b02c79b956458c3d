//! Data directory structure
//!
//! A node's durable state lives in one directory:
//!
//! ```text
//! data/
//! ├── geostore.toml          # Node configuration
//! ├── transactions.log       # Write-ahead log, one JSON transaction per line
//! ├── checkpoint.json        # Latest full snapshot
//! └── checkpoint.json.tmp    # Only present if a checkpoint write was interrupted
//! ```

use std::path::{Path, PathBuf};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "geostore.toml";
/// Write-ahead log file name.
pub const LOG_FILE_NAME: &str = "transactions.log";
/// Checkpoint file name.
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";
/// Temporary checkpoint file name used during the write-then-rename swap.
pub const CHECKPOINT_TMP_FILE_NAME: &str = "checkpoint.json.tmp";

/// Paths within a node's data directory
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Create paths from the root directory
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        DataPaths {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Node configuration file
    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Write-ahead log file
    pub fn log(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    /// Checkpoint file
    pub fn checkpoint(&self) -> PathBuf {
        self.root.join(CHECKPOINT_FILE_NAME)
    }

    /// Temporary checkpoint file
    pub fn checkpoint_tmp(&self) -> PathBuf {
        self.root.join(CHECKPOINT_TMP_FILE_NAME)
    }

    /// Create the root directory if needed
    pub fn create_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}
