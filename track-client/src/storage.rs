//! Persistence for tracker state, queue and attribution.
//!
//! Records are small JSON documents wrapped in a versioned envelope:
//!
//! ```text
//! { "version": 1, "data": { ... } }
//! ```
//!
//! [`FileStorage`] keeps one `<name>.json` file per record under a data
//! directory and replaces files atomically (write temp, fsync, rename), so a
//! crash leaves either the old or the new record, never a torn one.
//! [`MemoryStorage`] keeps records in memory and can be told to fail writes.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use track_types::STATE_VERSION;

use crate::error::StorageError;

/// Record holding [`ActivityState`](track_types::ActivityState).
pub const STATE: &str = "state";
/// Record holding the package queue.
pub const QUEUE: &str = "queue";
/// Record holding the last attribution and its sequence.
pub const ATTRIBUTION: &str = "attribution";

/// Envelope version written by this build.
pub const RECORD_VERSION: u32 = STATE_VERSION;

/// Byte-level record store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a record. `Ok(None)` if it was never written.
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a record.
    async fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Delete a record. Deleting a missing record is not an error.
    async fn remove(&self, name: &str) -> Result<(), StorageError>;
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct EnvelopeIn<T> {
    data: T,
}

/// Wrap `data` in an envelope and serialize it.
pub fn encode<T: Serialize>(name: &str, data: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(&EnvelopeOut {
        version: RECORD_VERSION,
        data,
    })
    .map_err(|source| StorageError::Serialization {
        name: name.to_string(),
        source,
    })
}

/// Parse an envelope, refusing versions newer than this build.
pub fn decode<T: DeserializeOwned>(name: &str, bytes: &[u8]) -> Result<T, StorageError> {
    let serialization = |source| StorageError::Serialization {
        name: name.to_string(),
        source,
    };

    let header: Header = serde_json::from_slice(bytes).map_err(serialization)?;
    if header.version > RECORD_VERSION {
        return Err(StorageError::UnsupportedVersion {
            name: name.to_string(),
            found: header.version,
            supported: RECORD_VERSION,
        });
    }

    let envelope: EnvelopeIn<T> = serde_json::from_slice(bytes).map_err(serialization)?;
    Ok(envelope.data)
}

/// Load and decode a record.
pub async fn load_record<T: DeserializeOwned>(
    storage: &dyn Storage,
    name: &str,
) -> Result<Option<T>, StorageError> {
    match storage.load(name).await? {
        Some(bytes) => decode(name, &bytes).map(Some),
        None => Ok(None),
    }
}

/// Encode and store a record.
pub async fn store_record<T: Serialize + Sync>(
    storage: &dyn Storage,
    name: &str,
    data: &T,
) -> Result<(), StorageError> {
    let bytes = encode(name, data)?;
    storage.store(name, &bytes).await
}

/// Records stored as files under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store records under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

fn io_error(name: &str, source: std::io::Error) -> StorageError {
    StorageError::Io {
        name: name.to_string(),
        source,
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(name, e)),
        }
    }

    async fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(name, e))?;

        let path = self.path(name);
        let tmp_path = path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| io_error(name, e))?;
        file.write_all(bytes).await.map_err(|e| io_error(name, e))?;
        file.sync_all().await.map_err(|e| io_error(name, e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_error(name, e))?;

        // Make the rename itself durable. Some platforms refuse to open or
        // sync a directory; the file contents are already on disk there.
        if let Ok(dir) = tokio::fs::File::open(&self.dir).await {
            if let Err(e) = dir.sync_all().await {
                tracing::debug!(dir = %self.dir.display(), error = %e, "Directory fsync skipped");
            }
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(name, e)),
        }
    }
}

/// In-memory records with write-failure injection.
///
/// Clones share the same records, so a test can keep a handle and inspect
/// what the tracker wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<String, Vec<u8>>,
    writes: HashMap<String, usize>,
    fail_next: HashSet<String>,
    fail_all: bool,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next write (store or remove) of `name`.
    pub fn fail_next_write(&self, name: &str) {
        self.lock().fail_next.insert(name.to_string());
    }

    /// Fail every write until switched off again.
    pub fn fail_all_writes(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    /// Raw bytes of a record.
    pub fn raw(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().records.get(name).cloned()
    }

    /// Put raw bytes in place of a record.
    pub fn insert_raw(&self, name: &str, bytes: Vec<u8>) {
        self.lock().records.insert(name.to_string(), bytes);
    }

    /// True if the record exists.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().records.contains_key(name)
    }

    /// Number of successful stores of `name`.
    pub fn write_count(&self, name: &str) -> usize {
        self.lock().writes.get(name).copied().unwrap_or(0)
    }

    fn check_write(inner: &mut MemoryInner, name: &str) -> Result<(), StorageError> {
        if inner.fail_all || inner.fail_next.remove(name) {
            return Err(StorageError::Injected {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.raw(name))
    }

    async fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        Self::check_write(&mut inner, name)?;
        inner.records.insert(name.to_string(), bytes.to_vec());
        *inner.writes.entry(name.to_string()).or_default() += 1;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        Self::check_write(&mut inner, name)?;
        inner.records.remove(name);
        Ok(())
    }
}
