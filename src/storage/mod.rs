//! File-backed storage -- atomic JSON artifacts and the event log.
//!
//! Every artifact is a single JSON document. Mutations follow a
//! read-modify-write-replace discipline: the full new content is written to a
//! sibling temp file and renamed over the artifact, so a crash mid-write never
//! truncates existing history. Unreadable content is copied to a timestamped
//! `.corrupt.` backup and the artifact is reset instead of failing the caller.

pub mod events;

pub use events::{EventRecord, EventRepository, EventStore};

use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("event must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `value` as pretty JSON to `path` via temp file + rename.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
        what: "artifact",
        source,
    })?;

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Read a JSON document, returning `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// An append-friendly JSON array persisted in one file.
///
/// Mutations within one process are serialized by an internal lock; the
/// artifact assumes a single writer process at a time.
pub struct JsonArrayFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonArrayFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the artifact as an empty array if it does not exist yet.
    pub fn ensure(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.path.exists() {
            write_json_atomic(&self.path, &Vec::<T>::new())?;
        }
        Ok(())
    }

    /// Load every record, quarantining unreadable content.
    pub fn load(&self) -> Result<Vec<T>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load_unlocked()
    }

    /// Read-modify-write the whole array under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> Result<R, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load_unlocked()?;
        let out = f(&mut records);
        write_json_atomic(&self.path, &records)?;
        Ok(out)
    }

    /// Like [`update`](Self::update), but nothing is written when `f` fails.
    pub fn try_update<R, E>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load_unlocked()?;
        let out = f(&mut records)?;
        write_json_atomic(&self.path, &records)?;
        Ok(out)
    }

    fn load_unlocked(&self) -> Result<Vec<T>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        // bytes, not a string: invalid UTF-8 is corruption too
        let bytes = fs::read(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice::<Vec<T>>(&bytes) {
            Ok(records) => Ok(records),
            Err(e) => {
                let backup = self.quarantine()?;
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "artifact unreadable; backed up and reset"
                );
                Ok(Vec::new())
            }
        }
    }

    fn quarantine(&self) -> Result<PathBuf, StoreError> {
        let ts = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let backup = self.path.with_file_name(format!("{}.corrupt.{}", name, ts));
        fs::copy(&self.path, &backup).map_err(|e| StoreError::io(&backup, e))?;
        write_json_atomic(&self.path, &Vec::<T>::new())?;
        debug!(backup = %backup.display(), "quarantined corrupt artifact");
        Ok(backup)
    }
}
