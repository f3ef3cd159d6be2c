//! # Rendering Module
//!
//! Tools for turning pictures into something a thermal head can burn.
//!
//! ## Modules
//!
//! - [`logo`]: Scale + threshold a bitmap into a `GS v 0` raster command
//!
//! ## Usage Example
//!
//! ```
//! use blethermal::render::logo::{self, Logo};
//! use image::{DynamicImage, GrayImage, Luma};
//!
//! let mark = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 4, Luma([0])));
//! let cmd = logo::encode_logo(&Logo::from_image(mark), 35, logo::DEFAULT_THRESHOLD)?;
//!
//! assert_eq!(cmd.len(), 8 + 2 * 4);
//! # Ok::<(), blethermal::PrinterError>(())
//! ```

pub mod logo;
