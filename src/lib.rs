//! # blethermal - BLE Receipt Printing
//!
//! Drives cheap Bluetooth Low Energy receipt printers: finds the printer,
//! keeps a logical connection alive across link drops and restarts, and
//! turns a structured receipt into ESC/POS bytes that fit through a BLE
//! characteristic.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use blethermal::{
//!     config::SessionConfig,
//!     print::PrintOptions,
//!     receipt::{ReceiptModel, ShopHeader},
//!     session::{PrinterSession, ReconnectPolicy},
//!     transport::BleHost,
//! };
//!
//! # async fn demo(host: Arc<dyn BleHost>) -> blethermal::error::Result<()> {
//! let session = PrinterSession::new(host, SessionConfig::with_default_registry())?;
//!
//! // Reattach to last run's printer, or ask for one
//! if session.connect_to_stored().await?.is_none() {
//!     session.connect().await?;
//! }
//! let _reconnect = session.start_auto_reconnect(ReconnectPolicy::default());
//!
//! let receipt = ReceiptModel::builder(ShopHeader::new("Corner Cafe").phone("555-0100"))
//!     .line("Coffee", 2, 3.50)
//!     .tax_rate(0.08)
//!     .footer("Thank you!")
//!     .build()?;
//! session.print_receipt(&receipt, &PrintOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | connection state machine, characteristic resolver, auto-reconnect |
//! | [`print`] | print orchestration and options |
//! | [`receipt`] | receipt model, fixed-width layout, ASCII sanitization |
//! | [`render`] | logo rasterization |
//! | [`protocol`] | ESC/POS command builders |
//! | [`transport`] | BLE host traits, chunked writes, backends |
//! | [`registry`] | remembered printer |
//! | [`events`] | connection and device notifications |
//! | [`config`] | session configuration |
//! | [`error`] | error types |
//!
//! ## Backends
//!
//! The real adapter backend is behind the `btleplug` cargo feature. Without
//! it only [`transport::mock`] and [`transport::UnsupportedHost`] exist.

pub mod config;
pub mod error;
pub mod events;
pub mod print;
pub mod protocol;
pub mod receipt;
pub mod registry;
pub mod render;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use error::PrinterError;
pub use print::{PrintOptions, encode_receipt};
pub use session::{ConnectionState, PrinterSession};
