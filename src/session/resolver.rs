//! # Characteristic Resolver
//!
//! Finds the command channel on a freshly opened GATT session.
//!
//! ```text
//! for service in known services (priority order):
//!     first writable characteristic?  → done
//! for service in all primary services (device order):
//!     first writable characteristic?  → done
//! CharacteristicNotFound
//! ```
//!
//! The walk is deterministic: the same device layout always resolves to
//! the same characteristic.

use uuid::Uuid;

use crate::error::{PrinterError, Result};
use crate::transport::host::{GattCharacteristic, GattSession};

/// First writable characteristic of `service`, if the device has it.
async fn writable_in(gatt: &dyn GattSession, service: Uuid) -> Result<Option<GattCharacteristic>> {
    let characteristics = match gatt.characteristics(service).await {
        Ok(Some(chars)) => chars,
        Ok(None) => return Ok(None),
        Err(PrinterError::NotConnected) => return Err(PrinterError::NotConnected),
        Err(e) => {
            tracing::debug!(%service, error = %e, "Service lookup failed");
            return Ok(None);
        }
    };
    Ok(characteristics.into_iter().find(|c| c.is_writable()))
}

/// Resolve the writable characteristic, trying `preferred` services first.
pub async fn resolve_characteristic(
    gatt: &dyn GattSession,
    preferred: &[Uuid],
) -> Result<GattCharacteristic> {
    for &service in preferred {
        if let Some(found) = writable_in(gatt, service).await? {
            tracing::debug!(%service, characteristic = %found.uuid, "Resolved known service");
            return Ok(found);
        }
    }

    let all = gatt.primary_services().await?;
    tracing::debug!(count = all.len(), "Falling back to full service scan");
    for service in all.into_iter().filter(|s| !preferred.contains(s)) {
        if let Some(found) = writable_in(gatt, service).await? {
            tracing::debug!(%service, characteristic = %found.uuid, "Resolved by scan");
            return Ok(found);
        }
    }

    Err(PrinterError::CharacteristicNotFound)
}
