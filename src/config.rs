//! # Session Configuration
//!
//! Tunables for [`PrinterSession`](crate::session::PrinterSession). Every
//! field has a default, so an empty JSON object is a valid config file:
//!
//! ```json
//! {
//!   "services": ["000018f0-0000-1000-8000-00805f9b34fb"],
//!   "opTimeoutMs": 10000,
//!   "reconnect": {
//!     "intervalMs": 15000,
//!     "backoff": {"kind": "exponential", "factor": 2.0, "maxMs": 120000},
//!     "maxAttempts": 20
//!   },
//!   "registryPath": "/var/lib/pos/printer.json"
//! }
//! ```
//!
//! Durations are written in milliseconds.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PrinterError, Result};
use crate::registry::JsonFileStore;
use crate::session::reconnect::ReconnectPolicy;

/// Printer services in lookup priority order.
pub const PRINTER_SERVICES: [Uuid; 3] = [
    Uuid::from_u128(0x0000_18f0_0000_1000_8000_0080_5f9b_34fb),
    Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb),
    Uuid::from_u128(0x0000_fee7_0000_1000_8000_0080_5f9b_34fb),
];

/// Default bound on a single GATT connect, discovery, disconnect, or chunk
/// write. The device chooser is not bounded by it.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Serde adapter: `Duration` as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionConfig {
    /// Chooser filter and resolver priority list.
    pub services: Vec<Uuid>,

    #[serde(rename = "opTimeoutMs", with = "duration_ms")]
    pub op_timeout: Duration,

    pub reconnect: ReconnectPolicy,

    /// `None` keeps the registry in memory only.
    pub registry_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            services: PRINTER_SERVICES.to_vec(),
            op_timeout: DEFAULT_OP_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            registry_path: None,
        }
    }
}

impl SessionConfig {
    /// Defaults plus the platform registry file.
    pub fn with_default_registry() -> Self {
        Self {
            registry_path: JsonFileStore::default_path(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PrinterError::InvalidOptions(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loading session config");
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.op_timeout.is_zero() {
            return Err(PrinterError::InvalidOptions(
                "operation timeout must be positive".into(),
            ));
        }
        self.reconnect.validate()
    }
}
