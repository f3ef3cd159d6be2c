//! # btleplug Backend
//!
//! Real BLE adapters through `btleplug` (BlueZ, CoreBluetooth, WinRT).
//!
//! There is no system chooser outside a browser, so [`BtleHost::request_device`]
//! scans for a bounded window and returns the first peripheral advertising
//! one of the filter's services. Peripherals the adapter already knows
//! stand in for "authorized" devices.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::host::{
    BleDevice, BleHost, CharProps, DeviceFilter, DisconnectListener, GattCharacteristic,
    GattSession, WriteKind,
};
use crate::error::{PrinterError, Result};

/// How long a chooser scan runs before giving up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

fn ble(e: btleplug::Error) -> PrinterError {
    PrinterError::Ble(e.to_string())
}

/// First adapter of the platform manager.
#[derive(Clone)]
pub struct BtleHost {
    adapter: Adapter,
    scan_timeout: Duration,
}

impl BtleHost {
    /// Open the first adapter. No adapter is [`PrinterError::NotSupported`].
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await.map_err(ble)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(ble)?
            .into_iter()
            .next()
            .ok_or(PrinterError::NotSupported)?;
        Ok(Self {
            adapter,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        })
    }

    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    async fn device_for(&self, peripheral: Peripheral) -> BtleDevice {
        let name = match peripheral.properties().await {
            Ok(Some(props)) => props.local_name,
            _ => None,
        };
        BtleDevice {
            adapter: self.adapter.clone(),
            peripheral,
            name,
        }
    }

    async fn advertises(peripheral: &Peripheral, services: &[Uuid]) -> bool {
        if services.is_empty() {
            return true;
        }
        match peripheral.properties().await {
            Ok(Some(props)) => props.services.iter().any(|s| services.contains(s)),
            _ => false,
        }
    }
}

#[async_trait]
impl BleHost for BtleHost {
    async fn is_available(&self) -> bool {
        self.adapter.adapter_info().await.is_ok()
    }

    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn BleDevice>> {
        tracing::info!(
            timeout_secs = self.scan_timeout.as_secs(),
            "Scanning for printers"
        );
        let mut events = self.adapter.events().await.map_err(ble)?;
        self.adapter
            .start_scan(ScanFilter {
                services: filter.services.clone(),
            })
            .await
            .map_err(ble)?;

        let deadline = tokio::time::sleep(self.scan_timeout);
        tokio::pin!(deadline);

        let mut found = None;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => {
                    let Some(event) = event else { break };
                    if let CentralEvent::DeviceDiscovered(id) = event {
                        let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                            continue;
                        };
                        if Self::advertises(&peripheral, &filter.services).await {
                            found = Some(peripheral);
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::warn!(error = %e, "Failed to stop scan");
        }

        let peripheral =
            found.ok_or_else(|| PrinterError::NotFound("no printer found during scan".into()))?;
        let device = self.device_for(peripheral).await;
        tracing::info!(device = %device.info(), "Found printer");
        Ok(Arc::new(device))
    }

    async fn authorized_devices(&self) -> Result<Vec<Arc<dyn BleDevice>>> {
        let mut devices: Vec<Arc<dyn BleDevice>> = Vec::new();
        for peripheral in self.adapter.peripherals().await.map_err(ble)? {
            devices.push(Arc::new(self.device_for(peripheral).await));
        }
        Ok(devices)
    }
}

/// A peripheral known to the adapter.
pub struct BtleDevice {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
}

#[async_trait]
impl BleDevice for BtleDevice {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<Arc<dyn GattSession>> {
        if !self.peripheral.is_connected().await.map_err(ble)? {
            self.peripheral.connect().await.map_err(ble)?;
        }
        self.peripheral.discover_services().await.map_err(ble)?;

        let gatt = BtleGatt {
            peripheral: self.peripheral.clone(),
            listeners: Arc::new(Mutex::new(Some(Vec::new()))),
            watcher: CancellationToken::new(),
        };
        gatt.watch(self.adapter.clone()).await?;
        Ok(Arc::new(gatt))
    }
}

/// `None` once the listeners have fired.
type Listeners = Arc<Mutex<Option<Vec<DisconnectListener>>>>;

fn fire(listeners: &Listeners) {
    let taken = listeners
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take();
    for listener in taken.into_iter().flatten() {
        listener();
    }
}

struct BtleGatt {
    peripheral: Peripheral,
    listeners: Listeners,
    watcher: CancellationToken,
}

impl BtleGatt {
    /// Spawn a task that fires listeners on `DeviceDisconnected` for this peripheral.
    async fn watch(&self, adapter: Adapter) -> Result<()> {
        let mut events = adapter.events().await.map_err(ble)?;
        let id = self.peripheral.id();
        let listeners = Arc::clone(&self.listeners);
        let token = self.watcher.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => {
                            tracing::debug!(peripheral = %gone, "Link dropped");
                            fire(&listeners);
                            return;
                        }
                        Some(_) => {}
                        None => return,
                    },
                }
            }
        });
        Ok(())
    }

    fn find(&self, characteristic: &GattCharacteristic) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or(PrinterError::CharacteristicNotFound)
    }
}

impl Drop for BtleGatt {
    fn drop(&mut self) {
        self.watcher.cancel();
    }
}

fn to_gatt(c: &Characteristic) -> GattCharacteristic {
    GattCharacteristic::new(
        c.service_uuid,
        c.uuid,
        CharProps::from_bits_truncate(c.properties.bits()),
    )
}

#[async_trait]
impl GattSession for BtleGatt {
    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn characteristics(&self, service: Uuid) -> Result<Option<Vec<GattCharacteristic>>> {
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .map(|s| s.characteristics.iter().map(to_gatt).collect()))
    }

    async fn primary_services(&self) -> Result<Vec<Uuid>> {
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.primary)
            .map(|s| s.uuid)
            .collect())
    }

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> Result<()> {
        let target = self.find(characteristic)?;
        let write_type = match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(&target, data, write_type)
            .await
            .map_err(|e| PrinterError::WriteFailure(e.to_string()))
    }

    async fn disconnect(&self) -> Result<()> {
        self.watcher.cancel();
        let result = self.peripheral.disconnect().await.map_err(ble);
        fire(&self.listeners);
        result
    }

    fn on_disconnect(&self, listener: DisconnectListener) {
        let mut guard = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_mut() {
            Some(listeners) => listeners.push(listener),
            None => {
                drop(guard);
                listener();
            }
        }
    }
}
