//! # Raster Bit Image Command
//!
//! `GS v 0` prints a monochrome bitmap of arbitrary height in one command.
//! It is the only graphics command BLE receipt printers reliably implement.
//!
//! ## Bit Packing
//!
//! Each bit is one dot:
//! - Bit 7 (MSB) = leftmost dot
//! - Bit 0 (LSB) = rightmost dot
//! - 1 = black (print), 0 = white (no print)
//!
//! ```text
//! Byte value 0xF0 = 11110000 = ████░░░░
//! Byte value 0x0F = 00001111 = ░░░░████
//! ```

use super::commands::{GS, u16_le};

/// Length of the `GS v 0` header (opcode, mode, width, height).
pub const HEADER_LEN: usize = 8;

/// Normal density, 1x1 scale.
const MODE_NORMAL: u8 = 0x00;

/// # Print Raster Bit Image (GS v 0 m xL xH yL yH d1...dk)
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | GS v 0 m xL xH yL yH d1...dk |
/// | Hex     | 1D 76 30 m xL xH yL yH d1...dk |
///
/// ## Parameters
///
/// - `width_bytes`: Row stride in bytes, `ceil(width_dots / 8)`
/// - `height`: Number of rows
/// - `data`: Row-major packed bitmap, `width_bytes * height` bytes
///
/// ## Example
///
/// ```
/// use blethermal::protocol::raster;
///
/// let data = vec![0xFF; 2 * 3];
/// let cmd = raster::raster_image(2, 3, &data);
///
/// assert_eq!(&cmd[..8], &[0x1D, 0x76, 0x30, 0x00, 2, 0, 3, 0]);
/// assert_eq!(cmd.len(), 8 + 6);
/// ```
pub fn raster_image(width_bytes: u16, height: u16, data: &[u8]) -> Vec<u8> {
    debug_assert!(
        data.len() == width_bytes as usize * height as usize,
        "Raster data length mismatch. Expected {} ({} bytes x {} rows), got {}",
        width_bytes as usize * height as usize,
        width_bytes,
        height,
        data.len()
    );

    let [xl, xh] = u16_le(width_bytes);
    let [yl, yh] = u16_le(height);

    let mut cmd = Vec::with_capacity(HEADER_LEN + data.len());
    cmd.push(GS);
    cmd.push(b'v');
    cmd.push(b'0');
    cmd.push(MODE_NORMAL);
    cmd.push(xl);
    cmd.push(xh);
    cmd.push(yl);
    cmd.push(yh);
    cmd.extend_from_slice(data);
    cmd
}

/// Pack a row of pixels into bytes, MSB first.
///
/// A trailing partial byte is padded with white (0) bits.
///
/// ```
/// use blethermal::protocol::raster::pack_row;
///
/// let row = [true, true, false, false, true, false, true, false, true];
/// assert_eq!(pack_row(&row), vec![0b1100_1010, 0b1000_0000]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; pixels.len().div_ceil(8)];

    for (i, &pixel) in pixels.iter().enumerate() {
        if pixel {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }

    bytes
}

// ============================================================================
// TESTS
// ============================================================================
