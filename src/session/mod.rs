//! # Printer Session
//!
//! Owns the link to one printer: discovery, GATT connect, the writable
//! characteristic, and the connection state machine.
//!
//! ```text
//!              connect() / connect_to_stored()
//! Disconnected ───────────────────────────────► Connecting
//!      ▲                                            │ chooser, GATT connect,
//!      │  failure / cancelled                       │ characteristic resolve
//!      ├────────────────────────────────────────────┤
//!      │                                            ▼
//!      └───────────── link lost / disconnect() ─ Connected
//! ```
//!
//! A session is a cheap-to-clone handle. All clones see the same state,
//! so the reconnect task, the print path and the application can share it.
//!
//! ## Guarantees
//!
//! - At most one connect attempt is in flight; a second `connect()` fails
//!   with [`PrinterError::AlreadyConnecting`] on its first poll.
//! - A link loss flips the state to `Disconnected` and invalidates the
//!   characteristic handle before anything else observes it, even during a
//!   print. Listeners from an older link never touch a newer one.
//! - State and device notifications are published after the internal lock
//!   is released, so subscribers may call back into the session.

pub mod reconnect;
pub mod resolver;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::{PrinterError, Result};
use crate::events::{EventBus, Subscription};
use crate::registry::{DeviceRegistry, StoredDevice};
use crate::transport::chunker::CharacteristicHandle;
use crate::transport::host::{BleDevice, BleHost, DeviceFilter, DeviceInfo, GattSession};

pub use reconnect::{Backoff, ReconnectHandle, ReconnectPolicy};
pub use resolver::resolve_characteristic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// The live link of the current epoch.
struct Active {
    epoch: u64,
    gatt: Arc<dyn GattSession>,
    handle: CharacteristicHandle,
}

struct State {
    connection: ConnectionState,
    device: Option<DeviceInfo>,
    active: Option<Active>,
    /// Bumped by every connect attempt and every forced disconnect.
    epoch: u64,
}

struct Inner {
    host: Arc<dyn BleHost>,
    config: SessionConfig,
    registry: DeviceRegistry,
    events: EventBus,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_state(&self, state: ConnectionState) {
        tracing::debug!(%state, "Connection state changed");
        self.events.connection.publish(&state);
    }

    /// Link of `epoch` dropped. No-op if a newer link replaced it.
    fn link_lost(&self, epoch: u64) {
        {
            let mut state = self.lock();
            match &state.active {
                Some(active) if active.epoch == epoch => {}
                _ => return,
            }
            if let Some(active) = state.active.take() {
                active.handle.invalidate();
            }
            state.connection = ConnectionState::Disconnected;
        }
        tracing::warn!(epoch, "Printer link lost");
        self.publish_state(ConnectionState::Disconnected);
    }
}

/// Reverts `Connecting` to `Disconnected` unless the attempt committed.
///
/// Dropping the connect future mid-flight counts as a failed attempt.
struct ConnectingGuard {
    inner: Arc<Inner>,
    epoch: u64,
    armed: bool,
}

impl Drop for ConnectingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reverted = {
            let mut state = self.inner.lock();
            if state.epoch == self.epoch && state.connection == ConnectionState::Connecting {
                state.connection = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        };
        if reverted {
            self.inner.publish_state(ConnectionState::Disconnected);
        }
    }
}

enum Begin {
    Started(ConnectingGuard),
    AlreadyConnected(DeviceInfo),
}

/// Connection manager for one BLE receipt printer.
///
/// ## Example
///
/// ```no_run
/// # async fn demo(host: std::sync::Arc<dyn blethermal::transport::BleHost>) -> blethermal::error::Result<()> {
/// use blethermal::config::SessionConfig;
/// use blethermal::session::PrinterSession;
///
/// let session = PrinterSession::new(host, SessionConfig::default())?;
/// let _sub = session.on_connection_change(|state| println!("printer {}", state));
///
/// let printer = session.connect().await?;
/// println!("connected to {}", printer);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PrinterSession {
    inner: Arc<Inner>,
}

impl PrinterSession {
    /// Session with the registry named by `config.registry_path`
    /// (in memory when unset).
    pub fn new(host: Arc<dyn BleHost>, config: SessionConfig) -> Result<Self> {
        let registry = match &config.registry_path {
            Some(path) => DeviceRegistry::file(path),
            None => DeviceRegistry::in_memory(),
        };
        Self::with_registry(host, config, registry)
    }

    pub fn with_registry(
        host: Arc<dyn BleHost>,
        config: SessionConfig,
        registry: DeviceRegistry,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                host,
                config,
                registry,
                events: EventBus::default(),
                state: Mutex::new(State {
                    connection: ConnectionState::Disconnected,
                    device: None,
                    active: None,
                    epoch: 0,
                }),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn registry_path(&self) -> Option<&PathBuf> {
        self.inner.config.registry_path.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().connection
    }

    pub fn is_connected(&self) -> bool {
        let state = self.inner.lock();
        state.connection == ConnectionState::Connected && state.active.is_some()
    }

    /// The printer chosen most recently. Survives a lost link; cleared by
    /// [`disconnect`](Self::disconnect).
    pub fn device(&self) -> Option<DeviceInfo> {
        self.inner.lock().device.clone()
    }

    /// Handle to the live characteristic.
    pub fn characteristic(&self) -> Result<CharacteristicHandle> {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|active| active.handle.clone())
            .ok_or(PrinterError::NotConnected)
    }

    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.events.connection.subscribe(callback)
    }

    pub fn on_device_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Option<DeviceInfo>) + Send + Sync + 'static,
    {
        self.inner.events.device.subscribe(callback)
    }

    // ========================================================================
    // REGISTRY
    // ========================================================================

    pub fn stored_device(&self) -> Option<StoredDevice> {
        self.inner.registry.get()
    }

    pub fn clear_stored_device(&self) -> Result<()> {
        self.inner.registry.clear()?;
        tracing::info!("Forgot stored printer");
        Ok(())
    }

    // ========================================================================
    // CONNECT
    // ========================================================================

    /// Bound `fut` by the configured operation timeout.
    pub(crate) async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.inner.config.op_timeout;
        tokio::time::timeout(after, fut)
            .await
            .map_err(|_| PrinterError::Timeout { operation, after })?
    }

    fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            services: self.inner.config.services.clone(),
        }
    }

    /// Claim the `Connecting` slot without suspending.
    fn begin_connect(&self) -> Result<Begin> {
        let guard = {
            let mut state = self.inner.lock();
            match state.connection {
                ConnectionState::Connecting => return Err(PrinterError::AlreadyConnecting),
                ConnectionState::Connected => {
                    if let (Some(_), Some(device)) = (&state.active, &state.device) {
                        return Ok(Begin::AlreadyConnected(device.clone()));
                    }
                }
                ConnectionState::Disconnected => {}
            }
            state.epoch += 1;
            state.connection = ConnectionState::Connecting;
            ConnectingGuard {
                inner: Arc::clone(&self.inner),
                epoch: state.epoch,
                armed: true,
            }
        };
        self.inner.publish_state(ConnectionState::Connecting);
        Ok(Begin::Started(guard))
    }

    async fn ensure_available(&self) -> Result<()> {
        if self.inner.host.is_available().await {
            Ok(())
        } else {
            Err(PrinterError::NotSupported)
        }
    }

    /// Let the user pick a printer and connect to it.
    ///
    /// Already connected: returns the current printer without showing the
    /// chooser again.
    pub async fn connect(&self) -> Result<DeviceInfo> {
        let mut guard = match self.begin_connect()? {
            Begin::AlreadyConnected(device) => return Ok(device),
            Begin::Started(guard) => guard,
        };
        self.ensure_available().await?;

        let device = self.inner.host.request_device(&self.filter()).await?;
        self.attach(device, &mut guard).await
    }

    /// Reattach to the printer in the registry.
    ///
    /// `Ok(None)` when nothing is stored. Tries the host's authorized
    /// devices first, then the chooser; a chooser pick with another id is
    /// [`PrinterError::DeviceMismatch`].
    pub async fn connect_to_stored(&self) -> Result<Option<DeviceInfo>> {
        let Some(stored) = self.stored_device() else {
            return Ok(None);
        };
        let mut guard = match self.begin_connect()? {
            Begin::AlreadyConnected(device) => return Ok(Some(device)),
            Begin::Started(guard) => guard,
        };
        self.ensure_available().await?;

        match self.inner.host.authorized_devices().await {
            Ok(devices) => {
                if let Some(device) = devices.into_iter().find(|d| d.id() == stored.id) {
                    match self.attach(device, &mut guard).await {
                        Ok(info) => return Ok(Some(info)),
                        Err(e) => {
                            tracing::debug!(id = %stored.id, error = %e, "Silent reattach failed")
                        }
                    }
                }
            }
            Err(e) => tracing::debug!(error = %e, "Authorized devices unavailable"),
        }

        let device = self.inner.host.request_device(&self.filter()).await?;
        let actual = device.id();
        if actual != stored.id {
            return Err(PrinterError::DeviceMismatch {
                expected: stored.id,
                actual,
            });
        }
        self.attach(device, &mut guard).await.map(Some)
    }

    /// GATT connect, resolve, commit. Leaves the guard armed on failure.
    async fn attach(
        &self,
        device: Arc<dyn BleDevice>,
        guard: &mut ConnectingGuard,
    ) -> Result<DeviceInfo> {
        let info = device.info();
        let epoch = guard.epoch;
        tracing::info!(device = %info, "Connecting to printer");

        let gatt = self.timed("GATT connect", device.connect()).await?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        gatt.on_disconnect(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.link_lost(epoch);
            }
        }));

        let resolved = self
            .timed(
                "characteristic discovery",
                resolve_characteristic(gatt.as_ref(), &self.inner.config.services),
            )
            .await;
        let characteristic = match resolved {
            Ok(characteristic) => characteristic,
            Err(e) => {
                let _ = gatt.disconnect().await;
                return Err(e);
            }
        };

        let handle = CharacteristicHandle::new(Arc::clone(&gatt), characteristic);
        let committed = {
            let mut state = self.inner.lock();
            if state.epoch == epoch && state.connection == ConnectionState::Connecting {
                state.active = Some(Active {
                    epoch,
                    gatt: Arc::clone(&gatt),
                    handle: handle.clone(),
                });
                state.connection = ConnectionState::Connected;
                state.device = Some(info.clone());
                true
            } else {
                false
            }
        };
        if !committed {
            tracing::debug!(device = %info, "Connect superseded by disconnect");
            let _ = gatt.disconnect().await;
            return Err(PrinterError::NotConnected);
        }
        guard.armed = false;

        tracing::info!(
            device = %info,
            characteristic = %handle.characteristic().uuid,
            "Printer connected"
        );
        if let Err(e) = self.inner.registry.remember(&info) {
            tracing::warn!(error = %e, "Failed to persist printer");
        }
        self.inner.publish_state(ConnectionState::Connected);
        self.inner.events.device.publish(&Some(info.clone()));

        // The link may have dropped before the listener could observe it.
        if !gatt.is_connected().await {
            self.inner.link_lost(epoch);
            return Err(PrinterError::NotConnected);
        }
        Ok(info)
    }

    // ========================================================================
    // DISCONNECT
    // ========================================================================

    /// Close the GATT session, if any, and force `Disconnected`.
    ///
    /// An in-flight connect attempt is superseded and fails when it
    /// returns. The stored device is kept.
    pub async fn disconnect(&self) {
        let (previous, active, had_device) = {
            let mut state = self.inner.lock();
            let previous = state.connection;
            state.epoch += 1;
            state.connection = ConnectionState::Disconnected;
            let active = state.active.take();
            if let Some(active) = &active {
                active.handle.invalidate();
            }
            (previous, active, state.device.take().is_some())
        };

        if previous != ConnectionState::Disconnected {
            self.inner.publish_state(ConnectionState::Disconnected);
        }
        if had_device {
            self.inner.events.device.publish(&None);
        }

        if let Some(active) = active {
            tracing::info!(epoch = active.epoch, "Disconnecting printer");
            match self.timed("GATT disconnect", active.gatt.disconnect()).await {
                Ok(()) => {}
                Err(e) => tracing::warn!(error = %e, "GATT disconnect failed"),
            }
        }
    }
}

impl fmt::Debug for PrinterSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("PrinterSession")
            .field("state", &state.connection)
            .field("device", &state.device)
            .field("epoch", &state.epoch)
            .finish()
    }
}
