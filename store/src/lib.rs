//! The durable list of paired cameras.
//!
//! One JSON document holds the paired-device records and the global sync
//! toggle. The store is the single writer for that document: every
//! mutation rewrites the file atomically (sibling temp file + rename)
//! under one lock and republishes the `paired`/`enabled`/`sync_enabled`
//! watch flows. Reads are free.
//!
//! The on-disk format is self-describing JSON so the schema can grow:
//! unknown fields are ignored on read and missing optional fields default.
//! A document that fails to parse surfaces [`StoreError::Corrupt`] to the
//! caller; the store never wipes a file it cannot read.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use camsync_types::{MacAddress, PairedDevice};

/// Result type used by the store.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the paired-devices store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted document exists but cannot be understood.
    #[error("paired-devices store is corrupt: {0}")]
    Corrupt(String),
    /// The document could not be read or written.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The in-memory state could not be serialized.
    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

const DOCUMENT_VERSION: u32 = 1;

fn default_sync_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default = "default_sync_enabled")]
    sync_enabled: bool,
    #[serde(default)]
    devices: Vec<PairedDevice>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            sync_enabled: true,
            devices: Vec::new(),
        }
    }
}

/// Durable, observable list of paired cameras plus the global sync toggle.
pub struct PairedDevicesStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
    paired_tx: watch::Sender<Vec<PairedDevice>>,
    enabled_tx: watch::Sender<Vec<PairedDevice>>,
    sync_enabled_tx: watch::Sender<bool>,
}

impl PairedDevicesStore {
    /// Opens the store at `path`, creating an empty document if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if an existing file fails to parse
    /// (the file is left untouched), or [`StoreError::Io`] on read errors.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let document = match fs::read(&path) {
            Ok(bytes) => Self::parse(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(err) => return Err(err.into()),
        };

        let paired_tx = watch::channel(document.devices.clone()).0;
        let enabled_tx = watch::channel(enabled_of(&document)).0;
        let sync_enabled_tx = watch::channel(document.sync_enabled).0;

        Ok(Self {
            path,
            document: Mutex::new(document),
            paired_tx,
            enabled_tx,
            sync_enabled_tx,
        })
    }

    fn parse(bytes: &[u8]) -> StoreResult<StoreDocument> {
        let document: StoreDocument =
            serde_json::from_slice(bytes).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        if document.version == 0 || document.version > DOCUMENT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported document version {}",
                document.version
            )));
        }
        Ok(document)
    }

    /// All paired devices, in pairing order.
    #[must_use]
    pub fn paired(&self) -> watch::Receiver<Vec<PairedDevice>> {
        self.paired_tx.subscribe()
    }

    /// The paired devices whose per-device sync flag is on.
    #[must_use]
    pub fn enabled(&self) -> watch::Receiver<Vec<PairedDevice>> {
        self.enabled_tx.subscribe()
    }

    /// The global sync toggle.
    #[must_use]
    pub fn sync_enabled(&self) -> watch::Receiver<bool> {
        self.sync_enabled_tx.subscribe()
    }

    /// Whether a camera with this address is paired.
    #[must_use]
    pub fn is_paired(&self, mac: MacAddress) -> bool {
        self.get(mac).is_some()
    }

    /// The persisted record for this address, if any.
    #[must_use]
    pub fn get(&self, mac: MacAddress) -> Option<PairedDevice> {
        self.lock().devices.iter().find(|d| d.mac == mac).cloned()
    }

    /// Whether any camera is paired.
    #[must_use]
    pub fn has_any(&self) -> bool {
        !self.lock().devices.is_empty()
    }

    /// Whether any paired camera has its sync flag on.
    #[must_use]
    pub fn has_enabled(&self) -> bool {
        self.lock().devices.iter().any(|d| d.enabled)
    }

    /// Adds a camera, or replaces the record if the address is already
    /// paired.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the document cannot be persisted.
    pub fn add(&self, device: PairedDevice) -> StoreResult<()> {
        let mut guard = self.lock();
        match guard.devices.iter_mut().find(|d| d.mac == device.mac) {
            Some(existing) => *existing = device,
            None => guard.devices.push(device),
        }
        self.commit(guard)
    }

    /// Removes a camera on unpair. Unknown addresses are a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the document cannot be persisted.
    pub fn remove(&self, mac: MacAddress) -> StoreResult<()> {
        let mut guard = self.lock();
        let before = guard.devices.len();
        guard.devices.retain(|d| d.mac != mac);
        if guard.devices.len() == before {
            return Ok(());
        }
        self.commit(guard)
    }

    /// Flips one camera's sync flag.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the document cannot be persisted.
    pub fn set_enabled(&self, mac: MacAddress, enabled: bool) -> StoreResult<()> {
        self.mutate_device(mac, |device| {
            device.enabled = enabled;
            true
        })
    }

    /// Flips the global sync toggle.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the document cannot be persisted.
    pub fn set_sync_enabled(&self, enabled: bool) -> StoreResult<()> {
        let mut guard = self.lock();
        if guard.sync_enabled == enabled {
            return Ok(());
        }
        guard.sync_enabled = enabled;
        self.commit(guard)
    }

    /// Updates one camera's display name.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the document cannot be persisted.
    pub fn update_device_name(&self, mac: MacAddress, name: impl Into<String>) -> StoreResult<()> {
        let name = name.into();
        self.mutate_device(mac, move |device| {
            device.name = Some(name);
            true
        })
    }

    /// Records a successful location write.
    ///
    /// The persisted value is monotonically nondecreasing: an update that
    /// would move it backwards is kept at the stored value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the document cannot be persisted.
    pub fn update_last_synced_at(&self, mac: MacAddress, epoch_ms: i64) -> StoreResult<()> {
        self.mutate_device(mac, move |device| {
            if device.last_synced_at.is_some_and(|at| at >= epoch_ms) {
                return false;
            }
            device.last_synced_at = Some(epoch_ms);
            true
        })
    }

    fn mutate_device(
        &self,
        mac: MacAddress,
        mutate: impl FnOnce(&mut PairedDevice) -> bool,
    ) -> StoreResult<()> {
        let mut guard = self.lock();
        let Some(device) = guard.devices.iter_mut().find(|d| d.mac == mac) else {
            warn!("ignoring update for unpaired device {mac}");
            return Ok(());
        };
        if !mutate(device) {
            return Ok(());
        }
        self.commit(guard)
    }

    fn lock(&self) -> MutexGuard<'_, StoreDocument> {
        self.document.lock().expect("store document poisoned")
    }

    /// Rewrites the document atomically and republishes the flows.
    fn commit(&self, guard: MutexGuard<'_, StoreDocument>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&*guard)?;
        write_atomic(&self.path, &bytes)?;

        self.paired_tx.send_replace(guard.devices.clone());
        self.enabled_tx.send_replace(enabled_of(&guard));
        self.sync_enabled_tx.send_replace(guard.sync_enabled);
        Ok(())
    }
}

impl std::fmt::Debug for PairedDevicesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairedDevicesStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn enabled_of(document: &StoreDocument) -> Vec<PairedDevice> {
    document
        .devices
        .iter()
        .filter(|d| d.enabled)
        .cloned()
        .collect()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
