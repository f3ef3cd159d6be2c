//! # Mock Transport
//!
//! A scripted, in-memory BLE host. Tests use it to drive the connection
//! state machine and to capture exactly what would have gone over the air.
//!
//! ```
//! use blethermal::transport::mock::{MockDevice, MockHost};
//!
//! let printer = MockDevice::printer("abc123", "BT-58");
//! let host = MockHost::new().with_device(printer.clone());
//! host.choose(Some("abc123"));
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::host::{
    BleDevice, BleHost, CharProps, DeviceFilter, DisconnectListener, GattCharacteristic,
    GattSession, WriteKind,
};
use crate::error::{PrinterError, Result};

/// `000018f0-0000-1000-8000-00805f9b34fb`, the usual printer service.
pub fn printer_service() -> Uuid {
    Uuid::from_u128(0x0000_18f0_0000_1000_8000_0080_5f9b_34fb)
}

/// `00002af1-...`, the usual write characteristic under 0x18f0.
pub fn printer_write_char() -> Uuid {
    Uuid::from_u128(0x0000_2af1_0000_1000_8000_0080_5f9b_34fb)
}

/// `00002af0-...`, the notify characteristic under 0x18f0.
pub fn printer_notify_char() -> Uuid {
    Uuid::from_u128(0x0000_2af0_0000_1000_8000_0080_5f9b_34fb)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// DEVICE
// ============================================================================

#[derive(Default)]
struct DeviceState {
    services: Vec<(Uuid, Vec<GattCharacteristic>)>,
    connected: bool,
    session: u64,
    connect_calls: usize,
    fail_connect: bool,
    connect_delay: Option<Duration>,
    writes: Vec<Vec<u8>>,
    kinds: Vec<WriteKind>,
    write_attempts: usize,
    fail_write_at: Option<usize>,
    drop_link_after_writes: Option<usize>,
    write_delay: Option<Duration>,
    max_write_len: Option<usize>,
    listeners: Vec<DisconnectListener>,
}

struct Shared {
    id: String,
    name: Option<String>,
    state: Mutex<DeviceState>,
}

impl Shared {
    /// Drop the link and fire listeners outside the lock.
    fn drop_link(&self) {
        let listeners = {
            let mut state = lock(&self.state);
            state.connected = false;
            std::mem::take(&mut state.listeners)
        };
        for listener in listeners {
            listener();
        }
    }
}

/// Scripted peripheral. Clones share state.
#[derive(Clone)]
pub struct MockDevice {
    shared: Arc<Shared>,
}

impl MockDevice {
    /// A bare device with no services.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: id.into(),
                name: Some(name.into()),
                state: Mutex::new(DeviceState::default()),
            }),
        }
    }

    /// A device exposing service 0x18f0 with a notify and a write characteristic.
    pub fn printer(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name).with_service(
            printer_service(),
            vec![
                (printer_notify_char(), CharProps::NOTIFY),
                (
                    printer_write_char(),
                    CharProps::WRITE | CharProps::WRITE_WITHOUT_RESPONSE,
                ),
            ],
        )
    }

    /// Add a primary service with the given characteristics.
    pub fn with_service(self, service: Uuid, chars: Vec<(Uuid, CharProps)>) -> Self {
        let characteristics = chars
            .into_iter()
            .map(|(uuid, props)| GattCharacteristic::new(service, uuid, props))
            .collect();
        lock(&self.shared.state)
            .services
            .push((service, characteristics));
        self
    }

    /// First writable characteristic in service order.
    pub fn writable_characteristic(&self) -> Option<GattCharacteristic> {
        lock(&self.shared.state)
            .services
            .iter()
            .flat_map(|(_, chars)| chars.iter())
            .find(|c| c.is_writable())
            .cloned()
    }

    pub fn service_uuids(&self) -> Vec<Uuid> {
        lock(&self.shared.state)
            .services
            .iter()
            .map(|(uuid, _)| *uuid)
            .collect()
    }

    /// Remote side drops the link.
    pub fn simulate_disconnect(&self) {
        self.shared.drop_link();
    }

    pub fn is_link_up(&self) -> bool {
        lock(&self.shared.state).connected
    }

    pub fn connect_calls(&self) -> usize {
        lock(&self.shared.state).connect_calls
    }

    pub fn set_fail_connect(&self, fail: bool) {
        lock(&self.shared.state).fail_connect = fail;
    }

    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        lock(&self.shared.state).connect_delay = delay;
    }

    /// Reject the write attempt with this zero-based index.
    pub fn fail_write_at(&self, attempt: usize) {
        lock(&self.shared.state).fail_write_at = Some(attempt);
    }

    /// Drop the link right after this many successful writes.
    pub fn drop_link_after_writes(&self, writes: usize) {
        lock(&self.shared.state).drop_link_after_writes = Some(writes);
    }

    pub fn set_write_delay(&self, delay: Option<Duration>) {
        lock(&self.shared.state).write_delay = delay;
    }

    pub fn set_max_write_len(&self, len: Option<usize>) {
        lock(&self.shared.state).max_write_len = len;
    }

    /// Every accepted write, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.shared.state).writes.clone()
    }

    /// All accepted writes concatenated.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared.state).writes.concat()
    }

    pub fn write_kinds(&self) -> Vec<WriteKind> {
        lock(&self.shared.state).kinds.clone()
    }

    pub fn clear_writes(&self) {
        let mut state = lock(&self.shared.state);
        state.writes.clear();
        state.kinds.clear();
        state.write_attempts = 0;
    }
}

#[async_trait]
impl BleDevice for MockDevice {
    fn id(&self) -> String {
        self.shared.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.shared.name.clone()
    }

    async fn connect(&self) -> Result<Arc<dyn GattSession>> {
        let delay = {
            let mut state = lock(&self.shared.state);
            state.connect_calls += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.shared.state);
        if state.fail_connect {
            return Err(PrinterError::NotFound(format!(
                "{} is out of range",
                self.shared.id
            )));
        }
        state.connected = true;
        state.session += 1;
        Ok(Arc::new(MockGatt {
            shared: Arc::clone(&self.shared),
            session: state.session,
        }))
    }
}

struct MockGatt {
    shared: Arc<Shared>,
    session: u64,
}

impl MockGatt {
    fn live(&self, state: &DeviceState) -> bool {
        state.connected && state.session == self.session
    }
}

#[async_trait]
impl GattSession for MockGatt {
    async fn is_connected(&self) -> bool {
        self.live(&lock(&self.shared.state))
    }

    async fn characteristics(&self, service: Uuid) -> Result<Option<Vec<GattCharacteristic>>> {
        let state = lock(&self.shared.state);
        if !self.live(&state) {
            return Err(PrinterError::NotConnected);
        }
        Ok(state
            .services
            .iter()
            .find(|(uuid, _)| *uuid == service)
            .map(|(_, chars)| chars.clone()))
    }

    async fn primary_services(&self) -> Result<Vec<Uuid>> {
        let state = lock(&self.shared.state);
        if !self.live(&state) {
            return Err(PrinterError::NotConnected);
        }
        Ok(state.services.iter().map(|(uuid, _)| *uuid).collect())
    }

    async fn write(
        &self,
        characteristic: &GattCharacteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> Result<()> {
        let delay = lock(&self.shared.state).write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let drop_now = {
            let mut state = lock(&self.shared.state);
            if !self.live(&state) {
                return Err(PrinterError::NotConnected);
            }
            let known = state
                .services
                .iter()
                .flat_map(|(_, chars)| chars.iter())
                .any(|c| c == characteristic);
            if !known {
                return Err(PrinterError::WriteFailure(format!(
                    "unknown characteristic {}",
                    characteristic.uuid
                )));
            }

            let attempt = state.write_attempts;
            state.write_attempts += 1;
            if state.fail_write_at == Some(attempt) {
                return Err(PrinterError::WriteFailure(format!(
                    "peer rejected write #{}",
                    attempt
                )));
            }
            state.writes.push(data.to_vec());
            state.kinds.push(kind);
            state.drop_link_after_writes == Some(state.writes.len())
        };

        if drop_now {
            self.shared.drop_link();
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let live = self.live(&lock(&self.shared.state));
        if live {
            self.shared.drop_link();
        }
        Ok(())
    }

    fn on_disconnect(&self, listener: DisconnectListener) {
        lock(&self.shared.state).listeners.push(listener);
    }

    fn max_write_len(&self) -> Option<usize> {
        lock(&self.shared.state).max_write_len
    }
}

// ============================================================================
// HOST
// ============================================================================

#[derive(Default)]
struct HostState {
    unavailable: bool,
    devices: Vec<MockDevice>,
    authorized: HashSet<String>,
    pick: Option<String>,
    chooser_calls: usize,
    chooser_delay: Option<Duration>,
}

/// Scripted adapter. Clones share state.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: MockDevice) -> Self {
        lock(&self.state).devices.push(device);
        self
    }

    /// Simulate a host without BLE.
    pub fn set_available(&self, available: bool) {
        lock(&self.state).unavailable = !available;
    }

    /// What the chooser returns next: a device id, or `None` for "cancelled".
    pub fn choose(&self, id: Option<&str>) {
        lock(&self.state).pick = id.map(str::to_string);
    }

    pub fn set_chooser_delay(&self, delay: Option<Duration>) {
        lock(&self.state).chooser_delay = delay;
    }

    /// Mark a device as previously authorized (reconnectable without chooser).
    pub fn authorize(&self, id: &str) {
        lock(&self.state).authorized.insert(id.to_string());
    }

    pub fn revoke(&self, id: &str) {
        lock(&self.state).authorized.remove(id);
    }

    pub fn chooser_calls(&self) -> usize {
        lock(&self.state).chooser_calls
    }
}

#[async_trait]
impl BleHost for MockHost {
    async fn is_available(&self) -> bool {
        !lock(&self.state).unavailable
    }

    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn BleDevice>> {
        let delay = {
            let mut state = lock(&self.state);
            state.chooser_calls += 1;
            state.chooser_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = lock(&self.state);
        let Some(pick) = state.pick.clone() else {
            return Err(PrinterError::NotFound("device chooser cancelled".to_string()));
        };
        let device = state
            .devices
            .iter()
            .find(|d| d.shared.id == pick)
            .filter(|d| {
                filter.services.is_empty()
                    || d.service_uuids().iter().any(|s| filter.services.contains(s))
            })
            .cloned()
            .ok_or_else(|| PrinterError::NotFound(format!("no printer matching {}", pick)))?;
        state.authorized.insert(pick);
        Ok(Arc::new(device))
    }

    async fn authorized_devices(&self) -> Result<Vec<Arc<dyn BleDevice>>> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(PrinterError::NotSupported);
        }
        Ok(state
            .devices
            .iter()
            .filter(|d| state.authorized.contains(&d.shared.id))
            .map(|d| Arc::new(d.clone()) as Arc<dyn BleDevice>)
            .collect())
    }
}
