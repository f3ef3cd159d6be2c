//! # Session Scenarios
//!
//! End-to-end behavior of `PrinterSession` against the scripted host:
//! connect, reattach, link loss, reconnect, and printing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use blethermal::config::SessionConfig;
use blethermal::print::PrintOptions;
use blethermal::receipt::{ReceiptModel, ShopHeader};
use blethermal::registry::{DeviceRegistry, REGISTRY_FILE};
use blethermal::session::{ConnectionState, PrinterSession, ReconnectPolicy};
use blethermal::transport::mock::{MockDevice, MockHost};
use blethermal::transport::DeviceInfo;
use blethermal::PrinterError;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn printer() -> (MockHost, MockDevice) {
    let device = MockDevice::printer("abc123", "BT-58");
    let host = MockHost::new().with_device(device.clone());
    (host, device)
}

fn session(host: &MockHost) -> PrinterSession {
    PrinterSession::new(Arc::new(host.clone()), SessionConfig::default()).unwrap()
}

fn session_with_registry(host: &MockHost, registry: DeviceRegistry) -> PrinterSession {
    PrinterSession::with_registry(Arc::new(host.clone()), SessionConfig::default(), registry)
        .unwrap()
}

fn coffee() -> ReceiptModel {
    ReceiptModel::builder(ShopHeader::new("Corner Cafe"))
        .line("Coffee", 2, 3.50)
        .tax_rate(0.08)
        .build()
        .unwrap()
}

fn remembered(registry: &DeviceRegistry) {
    registry
        .remember(&DeviceInfo {
            id: "abc123".into(),
            name: "BT-58".into(),
        })
        .unwrap();
}

// ============================================================================
// CONNECT
// ============================================================================

#[tokio::test]
async fn no_ble_rejects_without_chooser() {
    let (host, _device) = printer();
    host.set_available(false);
    host.choose(Some("abc123"));
    let session = session(&host);

    let err = session.connect().await.unwrap_err();

    assert!(matches!(err, PrinterError::NotSupported));
    assert_eq!(host.chooser_calls(), 0);
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connect_is_idempotent_when_connected() {
    let (host, device) = printer();
    host.choose(Some("abc123"));
    let session = session(&host);

    let first = session.connect().await.unwrap();
    let second = session.connect().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(host.chooser_calls(), 1);
    assert_eq!(device.connect_calls(), 1);
}

#[tokio::test]
async fn connect_notifies_observers_in_order() {
    let (host, _device) = printer();
    host.choose(Some("abc123"));
    let session = session(&host);

    let log = Arc::new(Mutex::new(Vec::new()));
    let states = Arc::clone(&log);
    let devices = Arc::clone(&log);
    let _a = session.on_connection_change(move |s| states.lock().unwrap().push(s.to_string()));
    let _b = session.on_device_change(move |d| {
        devices
            .lock()
            .unwrap()
            .push(d.as_ref().map_or("none".to_string(), |d| d.id.clone()))
    });

    session.connect().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["connecting", "connected", "abc123"]
    );
}

// ============================================================================
// REGISTRY
// ============================================================================

#[tokio::test]
async fn remote_disconnect_keeps_stored_device() {
    let (host, device) = printer();
    host.choose(Some("abc123"));
    let session = session(&host);
    session.connect().await.unwrap();

    device.simulate_disconnect();

    let stored = session.stored_device().unwrap();
    assert_eq!(stored.id, "abc123");
    assert_eq!(stored.name, "BT-58");
    assert!(!session.is_connected());
}

#[tokio::test]
async fn connect_to_stored_without_record_is_none() {
    let (host, _device) = printer();
    let session = session(&host);
    assert_eq!(session.connect_to_stored().await.unwrap(), None);
    assert_eq!(host.chooser_calls(), 0);
}

#[tokio::test]
async fn connect_to_stored_reattaches_silently() {
    let (host, device) = printer();
    host.authorize("abc123");
    let registry = DeviceRegistry::in_memory();
    remembered(&registry);
    let session = session_with_registry(&host, registry);

    let device_info = session.connect_to_stored().await.unwrap().unwrap();

    assert_eq!(device_info.id, "abc123");
    assert_eq!(host.chooser_calls(), 0);
    assert!(device.is_link_up());
}

#[tokio::test]
async fn connect_to_stored_falls_back_to_chooser() {
    let (host, _device) = printer();
    host.choose(Some("abc123"));
    let registry = DeviceRegistry::in_memory();
    remembered(&registry);
    let session = session_with_registry(&host, registry);

    session.connect_to_stored().await.unwrap().unwrap();

    assert_eq!(host.chooser_calls(), 1);
    assert!(session.is_connected());
}

#[tokio::test]
async fn connect_to_stored_needs_chooser_after_revocation() {
    let (host, _device) = printer();
    host.authorize("abc123");
    let registry = DeviceRegistry::in_memory();
    remembered(&registry);
    let session = session_with_registry(&host, registry);

    host.revoke("abc123");
    let err = session.connect_to_stored().await.unwrap_err();

    assert!(matches!(err, PrinterError::NotFound(_)));
    assert_eq!(host.chooser_calls(), 1);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.stored_device().unwrap().id, "abc123");
}

#[tokio::test]
async fn connect_to_stored_rejects_other_device() {
    let (host, _device) = printer();
    let other = MockDevice::printer("zzz999", "Other");
    let host = host.with_device(other);
    host.choose(Some("zzz999"));
    let registry = DeviceRegistry::in_memory();
    remembered(&registry);
    let session = session_with_registry(&host, registry);

    let err = session.connect_to_stored().await.unwrap_err();

    match err {
        PrinterError::DeviceMismatch { expected, actual } => {
            assert_eq!(expected, "abc123");
            assert_eq!(actual, "zzz999");
        }
        other => panic!("expected DeviceMismatch, got {other:?}"),
    }
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.stored_device().unwrap().id, "abc123");
}

#[tokio::test]
async fn file_registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(REGISTRY_FILE);
    let (host, _device) = printer();
    host.choose(Some("abc123"));

    let config = SessionConfig {
        registry_path: Some(path.clone()),
        ..SessionConfig::default()
    };
    let first = PrinterSession::new(Arc::new(host.clone()), config.clone()).unwrap();
    first.connect().await.unwrap();
    first.disconnect().await;
    drop(first);

    host.choose(None);
    let second = PrinterSession::new(Arc::new(host.clone()), config).unwrap();
    assert_eq!(second.registry_path(), Some(&path));
    assert_eq!(second.stored_device().unwrap().id, "abc123");
    assert!(second.connect_to_stored().await.unwrap().is_some());

    second.clear_stored_device().unwrap();
    assert!(!path.exists());
}

// ============================================================================
// RECONNECT
// ============================================================================

#[tokio::test(start_paused = true)]
async fn auto_reconnect_restores_link() {
    let (host, device) = printer();
    host.choose(Some("abc123"));
    let session = session(&host);
    session.connect().await.unwrap();
    let reconnect = session.start_auto_reconnect(ReconnectPolicy::default());

    device.simulate_disconnect();
    assert_eq!(session.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(session.is_connected());

    reconnect.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_does_not_race_manual_connect() {
    let (host, _device) = printer();
    host.choose(Some("abc123"));
    host.set_chooser_delay(Some(Duration::from_secs(30)));
    let registry = DeviceRegistry::in_memory();
    remembered(&registry);
    let session = session_with_registry(&host, registry);

    let reconnect = session.start_auto_reconnect(ReconnectPolicy::every(Duration::from_secs(1)));
    let manual = tokio::spawn({
        let session = session.clone();
        async move { session.connect().await }
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(session.state(), ConnectionState::Connecting);

    manual.await.unwrap().unwrap();
    assert!(session.is_connected());
    assert_eq!(host.chooser_calls(), 1);
    reconnect.shutdown().await;
}

// ============================================================================
// PRINT
// ============================================================================

#[tokio::test]
async fn print_after_link_loss_is_not_connected() {
    let (host, device) = printer();
    host.choose(Some("abc123"));
    let session = session(&host);
    session.connect().await.unwrap();
    device.simulate_disconnect();

    let err = session
        .print_receipt(&coffee(), &PrintOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PrinterError::NotConnected));
    assert!(device.writes().is_empty());
}

#[tokio::test]
async fn disconnect_mid_print_stops_writes() {
    let (host, device) = printer();
    host.choose(Some("abc123"));
    let session = session(&host);
    session.connect().await.unwrap();
    device.drop_link_after_writes(4);

    let err = session
        .print_receipt(&coffee(), &PrintOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PrinterError::NotConnected | PrinterError::WriteFailure(_)
    ));
    assert_eq!(device.writes().len(), 4);
    assert!(!session.is_connected());
    assert_eq!(session.stored_device().unwrap().id, "abc123");
}

#[tokio::test]
async fn print_respects_negotiated_mtu() {
    let (host, device) = printer();
    host.choose(Some("abc123"));
    device.set_max_write_len(Some(12));
    let session = session(&host);
    session.connect().await.unwrap();

    let summary = session
        .print_receipt(&coffee(), &PrintOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.chunk_size, 12);
    assert!(device.writes().iter().all(|w| w.len() <= 12));
}
