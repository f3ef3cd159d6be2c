//! # Printer Transport Layer
//!
//! Everything between encoded bytes and the radio.
//!
//! ## Modules
//!
//! - [`host`]: traits the session is written against
//! - [`chunker`]: sequential, size-bounded characteristic writes
//! - [`mock`]: scripted in-memory host for tests and dry runs
//! - `btle`: real adapters through `btleplug` (feature `btleplug`)

#[cfg(feature = "btleplug")]
pub mod btle;
pub mod chunker;
pub mod host;
pub mod mock;

pub use chunker::{CharacteristicHandle, Chunker};
pub use host::{BleDevice, BleHost, DeviceFilter, DeviceInfo, GattSession, UnsupportedHost};
