//! # ESC/POS Protocol Implementation
//!
//! Low-level command builders for the ESC/POS dialect spoken by BLE
//! thermal receipt printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: Initialize, character size, cut
//! - [`raster`]: `GS v 0` raster bit images
//!
//! ## Usage Example
//!
//! ```
//! use blethermal::protocol::{commands, raster};
//!
//! let mut data = Vec::new();
//! data.extend(commands::init());
//! data.extend(raster::raster_image(1, 1, &[0x80]));
//! data.extend(b"HELLO\r\n");
//! data.extend(commands::cut());
//!
//! assert_eq!(&data[..5], &[0x1B, 0x40, 0x1D, 0x21, 0x00]);
//! ```

pub mod commands;
pub mod raster;
