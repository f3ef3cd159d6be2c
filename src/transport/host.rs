//! # BLE Host Interface
//!
//! The crate never talks to a Bluetooth stack directly. Everything it needs
//! from the host is expressed by three traits:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`BleHost`] | adapter: capability check, device chooser, previously authorized devices |
//! | [`BleDevice`] | a peripheral that can open a GATT session |
//! | [`GattSession`] | an open link: service discovery, writes, disconnect notification |
//!
//! Backends: [`btle`](super::btle) (real adapters via `btleplug`, feature
//! `btleplug`) and [`mock`](super::mock) (scripted, in memory).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PrinterError, Result};

bitflags! {
    /// GATT characteristic properties (Core spec Vol 3, Part G, 3.3.1.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharProps: u8 {
        const BROADCAST = 0x01;
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
        const INDICATE = 0x20;
    }
}

/// How a single ATT write is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// ATT Write Request; the peer acknowledges each write.
    WithResponse,
    /// ATT Write Command; fire and forget.
    WithoutResponse,
}

/// A characteristic discovered on a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    pub service: Uuid,
    pub uuid: Uuid,
    pub props: CharProps,
}

impl GattCharacteristic {
    pub fn new(service: Uuid, uuid: Uuid, props: CharProps) -> Self {
        Self {
            service,
            uuid,
            props,
        }
    }

    /// Whether the characteristic accepts either kind of write.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.props
            .intersects(CharProps::WRITE | CharProps::WRITE_WITHOUT_RESPONSE)
    }

    /// Acknowledged writes when offered, so a dropped chunk surfaces as an error.
    pub fn preferred_write(&self) -> WriteKind {
        if self.props.contains(CharProps::WRITE) {
            WriteKind::WithResponse
        } else {
            WriteKind::WithoutResponse
        }
    }
}

/// Identity of a peripheral as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Restricts the device chooser to peripherals offering these services.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceFilter {
    pub services: Vec<Uuid>,
}

/// Callback fired once when the link drops, whoever initiated it.
pub type DisconnectListener = Box<dyn Fn() + Send + Sync>;

/// Host Bluetooth adapter.
#[async_trait]
pub trait BleHost: Send + Sync {
    /// Whether BLE is usable at all. Checked before any chooser is shown.
    async fn is_available(&self) -> bool;

    /// Let the user (or a scan) pick a peripheral matching `filter`.
    ///
    /// Cancellation or an empty scan is [`PrinterError::NotFound`].
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn BleDevice>>;

    /// Devices the host already knows and may reconnect without a chooser.
    async fn authorized_devices(&self) -> Result<Vec<Arc<dyn BleDevice>>>;
}

/// A peripheral that can open GATT sessions.
#[async_trait]
pub trait BleDevice: Send + Sync {
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    async fn connect(&self) -> Result<Arc<dyn GattSession>>;

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id(),
            name: self.name().unwrap_or_else(|| "Unknown printer".to_string()),
        }
    }
}

/// An open GATT link.
#[async_trait]
pub trait GattSession: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Characteristics of a primary service, or `None` if the device lacks it.
    async fn characteristics(&self, service: Uuid) -> Result<Option<Vec<GattCharacteristic>>>;

    /// Every primary service, in the order the device reports them.
    async fn primary_services(&self) -> Result<Vec<Uuid>>;

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Register a callback for link loss. Called at most once per session.
    fn on_disconnect(&self, listener: DisconnectListener);

    /// Largest payload for one write, when the host exposes the negotiated MTU.
    fn max_write_len(&self) -> Option<usize> {
        None
    }
}

/// Host without Bluetooth: every capability check fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedHost;

#[async_trait]
impl BleHost for UnsupportedHost {
    async fn is_available(&self) -> bool {
        false
    }

    async fn request_device(&self, _filter: &DeviceFilter) -> Result<Arc<dyn BleDevice>> {
        Err(PrinterError::NotSupported)
    }

    async fn authorized_devices(&self) -> Result<Vec<Arc<dyn BleDevice>>> {
        Err(PrinterError::NotSupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_with(props: CharProps) -> GattCharacteristic {
        GattCharacteristic::new(Uuid::nil(), Uuid::nil(), props)
    }

    #[test]
    fn test_writable() {
        assert!(char_with(CharProps::WRITE).is_writable());
        assert!(char_with(CharProps::WRITE_WITHOUT_RESPONSE | CharProps::NOTIFY).is_writable());
        assert!(!char_with(CharProps::READ | CharProps::NOTIFY).is_writable());
        assert!(!char_with(CharProps::empty()).is_writable());
    }

    #[test]
    fn test_preferred_write() {
        assert_eq!(
            char_with(CharProps::WRITE | CharProps::WRITE_WITHOUT_RESPONSE).preferred_write(),
            WriteKind::WithResponse
        );
        assert_eq!(
            char_with(CharProps::WRITE_WITHOUT_RESPONSE).preferred_write(),
            WriteKind::WithoutResponse
        );
    }

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            id: "abc123".into(),
            name: "BT-58".into(),
        };
        assert_eq!(info.to_string(), "BT-58 (abc123)");
    }

    #[tokio::test]
    async fn test_unsupported_host() {
        let host = UnsupportedHost;
        assert!(!host.is_available().await);
        assert!(matches!(
            host.request_device(&DeviceFilter::default()).await,
            Err(PrinterError::NotSupported)
        ));
    }
}
