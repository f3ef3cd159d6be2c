//! # Printer-Safe Text
//!
//! BLE receipt printers ship with a single-byte code page and no reliable
//! way to switch it. Anything outside 7-bit ASCII prints as garbage, so
//! every string is reduced to ASCII before it reaches the wire.
//!
//! ## Steps
//!
//! 1. Replace the rupee glyph with the literal `Rs`
//! 2. Canonical decomposition (NFD): `é` becomes `e` + U+0301
//! 3. Drop every code point above U+007F, which removes the combining marks

use unicode_normalization::UnicodeNormalization;

/// Currency glyph used by the layout.
pub const CURRENCY_GLYPH: char = '\u{20B9}';

/// ASCII stand-in for [`CURRENCY_GLYPH`].
pub const CURRENCY_ASCII: &str = "Rs";

/// Reduce a string to 7-bit ASCII.
///
/// ```
/// use blethermal::receipt::sanitize::sanitize;
///
/// assert_eq!(sanitize("Caf\u{e9} \u{20B9}7.56"), "Cafe Rs7.56");
/// assert_eq!(sanitize("\u{1F355} pizza"), " pizza");
/// ```
pub fn sanitize(text: &str) -> String {
    text.replace(CURRENCY_GLYPH, CURRENCY_ASCII)
        .nfd()
        .filter(char::is_ascii)
        .collect()
}

/// Column count a string occupies once sanitized.
#[inline]
pub fn text_width(text: &str) -> usize {
    sanitize(text).len()
}
