// SPDX-License-Identifier: MIT

//! Queue-info sidecar (`<prefix>.qi`).
//!
//! Persisted on checkpoint and at shutdown; its presence at start
//! means a previous run left records behind. An absent sidecar is a
//! clean start, not an error.

use crate::params::QueueType;
use crate::stream::StreamPos;
use rill_core::PersistError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub queue_type: QueueType,
    /// Physical record count at persist time.
    pub phys_size: usize,
    pub bytes_on_disk: u64,
    pub bytes_read: u64,
    /// Write head position.
    pub write: StreamPos,
    /// Delete head position. The dequeue head restarts here on
    /// reopen, so records of an in-flight batch are redelivered
    /// (at-least-once).
    pub read_del: StreamPos,
}

pub(crate) fn sidecar_path(prefix: &Path) -> PathBuf {
    let stem = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "queue".to_string());
    prefix.with_file_name(format!("{stem}.qi"))
}

impl QueueInfo {
    /// Load the sidecar, or `None` on a clean start.
    pub fn load(prefix: &Path) -> Result<Option<Self>, PersistError> {
        let path = sidecar_path(prefix);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let info: QueueInfo = serde_json::from_slice(&data)?;
        Ok(Some(info))
    }

    /// Rewrite the sidecar atomically (temp file + rename).
    pub fn save(&self, prefix: &Path) -> Result<(), PersistError> {
        let path = sidecar_path(prefix);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("qi.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Drop the sidecar after a clean, empty shutdown.
    pub fn remove(prefix: &Path) -> Result<(), PersistError> {
        let path = sidecar_path(prefix);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Does a sidecar exist for this prefix?
    pub fn exists(prefix: &Path) -> bool {
        sidecar_path(prefix).exists()
    }
}

#[cfg(test)]
#[path = "qi_tests.rs"]
mod tests;
