//! # Device Registry
//!
//! Remembers the last printer that connected successfully, so a later run
//! can reattach without asking the user again. Exactly one record is kept;
//! there is no history.
//!
//! ## Stores
//!
//! | Store | Persistence |
//! |-------|-------------|
//! | [`JsonFileStore`] | one JSON document, replaced atomically on save |
//! | [`MemoryStore`] | process lifetime only |
//!
//! ## File format
//!
//! ```json
//! {"id": "abc123", "name": "BT-58", "lastSeen": "2026-01-05T09:30:00Z"}
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PrinterError, Result};
use crate::transport::host::DeviceInfo;

/// File name used inside the platform data directory.
pub const REGISTRY_FILE: &str = "printer.json";

/// Identity of the last paired printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDevice {
    pub id: String,
    pub name: String,
    pub last_seen: DateTime<Utc>,
}

impl StoredDevice {
    pub fn from_info(info: &DeviceInfo, seen: DateTime<Utc>) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            last_seen: seen,
        }
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Backing storage for the single registry record.
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredDevice>>;
    fn save(&self, device: &StoredDevice) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// STORES
// ============================================================================

/// In-memory store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<StoredDevice>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StoredDevice>> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredDevice>> {
        Ok(self.slot().clone())
    }

    fn save(&self, device: &StoredDevice) -> Result<()> {
        *self.slot() = Some(device.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// JSON file store.
///
/// Saves go through a sibling temp file and a rename, so a crash mid-write
/// leaves either the old record or the new one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/blethermal/printer.json` for the current platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "blethermal", "blethermal")
            .map(|dirs| dirs.data_dir().join(REGISTRY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| REGISTRY_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoredDevice>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| PrinterError::Registry(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, device: &StoredDevice) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(device)
            .map_err(|e| PrinterError::Registry(e.to_string()))?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Read/write/clear access to the remembered printer.
pub struct DeviceRegistry {
    store: Box<dyn RegistryStore>,
}

impl DeviceRegistry {
    pub fn new(store: impl RegistryStore + 'static) -> Self {
        Self {
            store: Box::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(JsonFileStore::new(path))
    }

    /// The stored record. An unreadable record counts as absent.
    pub fn get(&self) -> Option<StoredDevice> {
        match self.store.load() {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable printer registry");
                None
            }
        }
    }

    /// Overwrite the record with `info`, stamped now.
    pub fn remember(&self, info: &DeviceInfo) -> Result<StoredDevice> {
        let record = StoredDevice::from_info(info, Utc::now());
        self.store.save(&record)?;
        tracing::debug!(id = %record.id, name = %record.name, "Printer remembered");
        Ok(record)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry").finish_non_exhaustive()
    }
}
