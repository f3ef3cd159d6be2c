//! # Receipt Encoding
//!
//! Turns a validated [`ReceiptModel`] into printer-safe bytes.
//!
//! ```text
//! ReceiptDraft (JSON) ──► ReceiptModel ──► layout ──► sanitize ──► ASCII bytes
//! ```
//!
//! ## Modules
//!
//! - [`model`]: receipt input types and boundary validation
//! - [`money`]: integer-cent amounts
//! - [`layout`]: fixed-width text rendering
//! - [`sanitize`]: 7-bit ASCII reduction

pub mod layout;
pub mod model;
pub mod money;
pub mod sanitize;

pub use layout::{encode_body, render_lines, render_text};
pub use model::{Align, CartLine, ReceiptBuilder, ReceiptDraft, ReceiptModel, ShopHeader, Totals};
pub use money::Money;
pub use sanitize::sanitize;
