//! Crash-safe checkpoint store
//!
//! A checkpoint is one JSON document holding the full feature table and the
//! vector clock at the moment it was taken:
//!
//! ```json
//! {"features": {"a": {"type":"Feature", ...}}, "vclock": {"storage1": 12}}
//! ```
//!
//! # Crash Safety
//!
//! 1. Write to `checkpoint.json.tmp`
//! 2. fsync the temporary file
//! 3. Atomic rename over `checkpoint.json`
//! 4. fsync the parent directory
//!
//! Either the previous checkpoint or the new one is visible, never a mix.
//! A leftover temporary file means step 3 never happened and is discarded.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use geostore_core::{Feature, GeoError, VectorClock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::paths::DataPaths;

/// Full durable state: feature table plus vector clock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Feature table keyed by id
    #[serde(alias = "data")]
    pub features: BTreeMap<String, Feature>,
    /// Highest applied sequence per origin
    #[serde(default)]
    pub vclock: VectorClock,
}

impl CheckpointData {
    /// Number of features in the checkpoint
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True if the checkpoint holds no features
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Checkpoint errors
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// IO error
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] io::Error),

    /// Checkpoint document could not be encoded
    #[error("checkpoint encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Checkpoint document on disk is malformed
    #[error("checkpoint at {path} is corrupt: {source}")]
    Corrupt {
        /// Checkpoint file
        path: PathBuf,
        /// Decoder error
        #[source]
        source: serde_json::Error,
    },
}

impl From<CheckpointError> for GeoError {
    fn from(e: CheckpointError) -> Self {
        match e {
            CheckpointError::Io(io) => GeoError::Io(io),
            CheckpointError::Encode(err) => {
                GeoError::Io(io::Error::new(io::ErrorKind::InvalidData, err))
            }
            CheckpointError::Corrupt { path, source } => {
                GeoError::decode(format!("{}: {}", path.display(), source))
            }
        }
    }
}

/// Summary of a written checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Final checkpoint path
    pub path: PathBuf,
    /// Number of features written
    pub features: usize,
    /// Size of the checkpoint file in bytes
    pub bytes: u64,
}

/// Reads and atomically replaces the checkpoint file of one data directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl CheckpointStore {
    /// Store for the checkpoint inside `paths`
    pub fn new(paths: &DataPaths) -> Self {
        CheckpointStore {
            path: paths.checkpoint(),
            tmp_path: paths.checkpoint_tmp(),
        }
    }

    /// Final checkpoint path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` as the new checkpoint using the temp-fsync-rename swap.
    pub fn write(&self, data: &CheckpointData) -> Result<CheckpointInfo, CheckpointError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Step 1: write the temporary file
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, data).map_err(CheckpointError::Encode)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;

        // Step 2: fsync
        file.sync_all()?;
        let bytes = file.metadata()?.len();
        drop(file);

        // Step 3: atomic rename
        fs::rename(&self.tmp_path, &self.path)?;

        // Step 4: fsync the parent directory
        sync_parent_dir(&self.path)?;

        info!(
            path = %self.path.display(),
            features = data.len(),
            origins = data.vclock.len(),
            bytes,
            "Checkpoint written"
        );

        Ok(CheckpointInfo {
            path: self.path.clone(),
            features: data.len(),
            bytes,
        })
    }

    /// Load the current checkpoint, `None` if none has been written yet.
    pub fn load(&self) -> Result<Option<CheckpointData>, CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint present");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let data: CheckpointData =
            serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        debug!(
            path = %self.path.display(),
            features = data.len(),
            "Loaded checkpoint"
        );
        Ok(Some(data))
    }

    /// Remove a temporary file left behind by an interrupted write.
    ///
    /// Returns `true` if a file was removed.
    pub fn cleanup_temp(&self) -> Result<bool, CheckpointError> {
        match fs::remove_file(&self.tmp_path) {
            Ok(()) => {
                warn!(
                    path = %self.tmp_path.display(),
                    "Removed incomplete checkpoint left by an interrupted write"
                );
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

// Directories cannot be opened for sync on Windows; rename durability is
// left to the filesystem there.
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
