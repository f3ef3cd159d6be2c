//! # ESC/POS Protocol Commands
//!
//! Byte builders for the small subset of ESC/POS that BLE receipt printers
//! need: reset, character size and the cutter.
//!
//! ## Escape Sequence Structure
//!
//! Commands follow these patterns:
//! - Two bytes: `ESC @`
//! - Multi-byte with parameters: `GS ! n`, `GS V m n`
//!
//! ## Byte Order
//!
//! Multi-byte integers use **little-endian** encoding:
//! - `u16` value 0x1234 is sent as bytes `[0x34, 0x12]`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
///
/// Used for character size, raster graphics and the cutter.
/// - Hex: 0x1D, Decimal: 29
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print and advance one line
pub const LF: u8 = 0x0A;

/// CR (Carriage Return)
pub const CR: u8 = 0x0D;

// ============================================================================
// INITIALIZATION COMMANDS
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Resets the printer to its power-on default state: clears the print
/// buffer and drops any text styling left over from a previous job.
///
/// | Format  | Bytes |
/// |---------|-------|
/// | ASCII   | ESC @ |
/// | Hex     | 1B 40 |
///
/// ```
/// use blethermal::protocol::commands;
///
/// assert_eq!(commands::reset(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn reset() -> Vec<u8> {
    vec![ESC, b'@']
}

/// # Select Character Size (GS ! n)
///
/// The high nibble of `n` is the width multiplier minus one, the low
/// nibble the height multiplier minus one. `0x00` is 1x1.
///
/// | Format  | Bytes    |
/// |---------|----------|
/// | ASCII   | GS ! n   |
/// | Hex     | 1D 21 n  |
#[inline]
pub fn char_size(width: u8, height: u8) -> Vec<u8> {
    let w = width.clamp(1, 8) - 1;
    let h = height.clamp(1, 8) - 1;
    vec![GS, b'!', (w << 4) | h]
}

/// Normal 1x1 character size (`GS ! 0`)
#[inline]
pub fn normal_size() -> Vec<u8> {
    char_size(1, 1)
}

/// # Job Preamble
///
/// Reset followed by normal character size. Sent once at the start of
/// every receipt so that a half-finished previous job cannot leak state.
///
/// ```
/// use blethermal::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40, 0x1D, 0x21, 0x00]);
/// ```
pub fn init() -> Vec<u8> {
    let mut cmd = reset();
    cmd.extend(normal_size());
    cmd
}

// ============================================================================
// CUTTER CONTROL COMMANDS
// ============================================================================

/// # Feed and Full Cut (GS V 65 n)
///
/// Function B of `GS V`: feeds `n` motion units past the print head, then
/// performs a full cut.
///
/// | Format  | Bytes       |
/// |---------|-------------|
/// | ASCII   | GS V A n    |
/// | Hex     | 1D 56 41 n  |
#[inline]
pub fn cut_full_feed(feed: u8) -> Vec<u8> {
    vec![GS, b'V', 0x41, feed]
}

/// Full cut with the stock 10-unit feed (`1D 56 41 0A`).
///
/// ```
/// use blethermal::protocol::commands;
///
/// assert_eq!(commands::cut(), vec![0x1D, 0x56, 0x41, 0x0A]);
/// ```
#[inline]
pub fn cut() -> Vec<u8> {
    cut_full_feed(10)
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Encode a u16 value as little-endian bytes [low, high]
///
/// ```
/// use blethermal::protocol::commands::u16_le;
///
/// assert_eq!(u16_le(0x1234), [0x34, 0x12]);
/// assert_eq!(u16_le(300), [0x2C, 0x01]);
/// ```
#[inline]
pub const fn u16_le(value: u16) -> [u8; 2] {
    [value as u8, (value >> 8) as u8]
}

// ============================================================================
// TESTS
// ============================================================================
