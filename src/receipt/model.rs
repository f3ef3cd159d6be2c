//! # Receipt Model
//!
//! The validated input to a print call. A [`ReceiptModel`] can only be
//! built through [`ReceiptBuilder`] or [`ReceiptDraft`], both of which
//! reject malformed carts before anything is encoded.
//!
//! ## JSON Shape
//!
//! ```json
//! {
//!   "shopHeader": { "name": "Corner Cafe", "address": "12 Main St", "phone": "555-0100" },
//!   "lines": [ { "name": "Coffee", "qty": 2, "unitPrice": 3.50 } ],
//!   "taxRate": 0.08,
//!   "footerLines": ["Thank you!"],
//!   "headerAlign": "center",
//!   "footerAlign": "center",
//!   "width": 35,
//!   "logoPath": "logo.png"
//! }
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::layout::{check_item_columns, check_totals};
use super::money::Money;
use crate::error::{PrinterError, Result};
use crate::render::logo::Logo;

/// Default receipt width in characters.
pub const DEFAULT_WIDTH: usize = 35;

/// Narrowest width that fits an item row.
pub const MIN_WIDTH: usize = 35;

/// Widest width accepted (Font B on 80mm paper is 64; leave headroom).
pub const MAX_WIDTH: usize = 80;

/// Horizontal alignment for header and footer lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Shop identity printed at the top of the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopHeader {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ShopHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            phone: None,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// One cart row. Quantity is at least 1, the price is non-negative, and
/// every number fits its receipt column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    name: String,
    qty: u32,
    unit_price: Money,
    line_total: Money,
}

impl CartLine {
    pub fn new(name: impl Into<String>, qty: u32, unit_price: Money) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PrinterError::InvalidReceipt(
                "cart line has an empty name".to_string(),
            ));
        }
        if qty == 0 {
            return Err(PrinterError::InvalidReceipt(format!(
                "cart line '{}' has zero quantity",
                name
            )));
        }
        if unit_price.is_negative() {
            return Err(PrinterError::InvalidReceipt(format!(
                "cart line '{}' has a negative price",
                name
            )));
        }
        let line_total = unit_price.checked_mul(qty).ok_or_else(|| {
            PrinterError::InvalidReceipt(format!("cart line '{}' total overflows", name))
        })?;
        let line = Self {
            name,
            qty,
            unit_price,
            line_total,
        };
        check_item_columns(&line)?;
        Ok(line)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qty(&self) -> u32 {
        self.qty
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn line_total(&self) -> Money {
        self.line_total
    }
}

/// Computed receipt totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

/// Immutable, validated receipt input.
#[derive(Debug, Clone)]
pub struct ReceiptModel {
    header: ShopHeader,
    lines: Vec<CartLine>,
    tax_rate: f64,
    footer_lines: Vec<String>,
    header_align: Align,
    footer_align: Align,
    width: usize,
    issued_at: Option<NaiveDateTime>,
    logo: Option<Logo>,
    totals: Totals,
}

impl ReceiptModel {
    pub fn builder(header: ShopHeader) -> ReceiptBuilder {
        ReceiptBuilder::new(header)
    }

    pub fn header(&self) -> &ShopHeader {
        &self.header
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn tax_rate(&self) -> f64 {
        self.tax_rate
    }

    pub fn footer_lines(&self) -> &[String] {
        &self.footer_lines
    }

    pub fn header_align(&self) -> Align {
        self.header_align
    }

    pub fn footer_align(&self) -> Align {
        self.footer_align
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn issued_at(&self) -> Option<NaiveDateTime> {
        self.issued_at
    }

    pub fn logo(&self) -> Option<&Logo> {
        self.logo.as_ref()
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }
}

/// Check a width against the supported range.
pub fn validate_width(width: usize) -> Result<usize> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return Err(PrinterError::InvalidOptions(format!(
            "width {} is outside {}..={}",
            width, MIN_WIDTH, MAX_WIDTH
        )));
    }
    Ok(width)
}

/// Builder for [`ReceiptModel`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    header: ShopHeader,
    lines: Vec<(String, u32, f64)>,
    tax_rate: f64,
    footer_lines: Vec<String>,
    header_align: Align,
    footer_align: Align,
    width: usize,
    issued_at: Option<NaiveDateTime>,
    logo: Option<Logo>,
}

impl ReceiptBuilder {
    pub fn new(header: ShopHeader) -> Self {
        Self {
            header,
            lines: Vec::new(),
            tax_rate: 0.0,
            footer_lines: Vec::new(),
            header_align: Align::Center,
            footer_align: Align::Center,
            width: DEFAULT_WIDTH,
            issued_at: None,
            logo: None,
        }
    }

    /// Add a cart line with a decimal unit price.
    pub fn line(mut self, name: impl Into<String>, qty: u32, unit_price: f64) -> Self {
        self.lines.push((name.into(), qty, unit_price));
        self
    }

    pub fn tax_rate(mut self, rate: f64) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn footer(mut self, line: impl Into<String>) -> Self {
        self.footer_lines.push(line.into());
        self
    }

    pub fn header_align(mut self, align: Align) -> Self {
        self.header_align = align;
        self
    }

    pub fn footer_align(mut self, align: Align) -> Self {
        self.footer_align = align;
        self
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn issued_at(mut self, at: NaiveDateTime) -> Self {
        self.issued_at = Some(at);
        self
    }

    pub fn logo(mut self, logo: Logo) -> Self {
        self.logo = Some(logo);
        self
    }

    pub fn build(self) -> Result<ReceiptModel> {
        if self.header.name.trim().is_empty() {
            return Err(PrinterError::InvalidReceipt(
                "shop name is empty".to_string(),
            ));
        }
        if self.lines.is_empty() {
            return Err(PrinterError::InvalidReceipt(
                "receipt has no cart lines".to_string(),
            ));
        }
        if !self.tax_rate.is_finite() || !(0.0..=1.0).contains(&self.tax_rate) {
            return Err(PrinterError::InvalidReceipt(format!(
                "tax rate {} is outside 0..=1",
                self.tax_rate
            )));
        }
        let width = validate_width(self.width)
            .map_err(|e| PrinterError::InvalidReceipt(e.to_string()))?;

        let mut lines = Vec::with_capacity(self.lines.len());
        for (name, qty, price) in self.lines {
            let unit_price = Money::from_decimal(price).ok_or_else(|| {
                PrinterError::InvalidReceipt(format!("cart line '{}' has an invalid price", name))
            })?;
            lines.push(CartLine::new(name, qty, unit_price)?);
        }

        let subtotal = lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(line.line_total()))
            .ok_or_else(|| PrinterError::InvalidReceipt("subtotal overflows".to_string()))?;
        let tax = subtotal.apply_rate(self.tax_rate);
        let total = subtotal
            .checked_add(tax)
            .ok_or_else(|| PrinterError::InvalidReceipt("total overflows".to_string()))?;
        let totals = Totals {
            subtotal,
            tax,
            total,
        };
        check_totals(&totals, self.tax_rate, width)?;

        Ok(ReceiptModel {
            header: self.header,
            lines,
            tax_rate: self.tax_rate,
            footer_lines: self.footer_lines,
            header_align: self.header_align,
            footer_align: self.footer_align,
            width,
            issued_at: self.issued_at,
            logo: self.logo,
            totals,
        })
    }
}

// ============================================================================
// JSON DRAFT
// ============================================================================

/// Cart line as it appears in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDraft {
    pub name: String,
    pub qty: u32,
    pub unit_price: f64,
}

/// Unvalidated receipt as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReceiptDraft {
    pub shop_header: ShopHeader,
    pub lines: Vec<LineDraft>,
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default)]
    pub footer_lines: Vec<String>,
    #[serde(default = "default_align")]
    pub header_align: Align,
    #[serde(default = "default_align")]
    pub footer_align: Align,
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<NaiveDateTime>,
    /// Logo image file, resolved relative to the JSON file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<PathBuf>,
}

fn default_align() -> Align {
    Align::Center
}

fn default_width() -> usize {
    DEFAULT_WIDTH
}

impl ReceiptDraft {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PrinterError::InvalidReceipt(e.to_string()))
    }

    /// Read a draft from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Validate into a [`ReceiptModel`].
    ///
    /// A relative `logo_path` is joined onto `base_dir`. The logo bytes are
    /// read here but decoded only at print time.
    pub fn into_model(self, base_dir: Option<&Path>) -> Result<ReceiptModel> {
        let mut builder = ReceiptBuilder::new(self.shop_header)
            .tax_rate(self.tax_rate)
            .header_align(self.header_align)
            .footer_align(self.footer_align)
            .width(self.width);

        for line in self.lines {
            builder = builder.line(line.name, line.qty, line.unit_price);
        }
        for footer in self.footer_lines {
            builder = builder.footer(footer);
        }
        if let Some(at) = self.issued_at {
            builder = builder.issued_at(at);
        }
        if let Some(path) = self.logo_path {
            let path = match base_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            };
            builder = builder.logo(Logo::from_path(&path)?);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coffee() -> ReceiptBuilder {
        ReceiptModel::builder(ShopHeader::new("Corner Cafe"))
            .line("Coffee", 2, 3.50)
            .tax_rate(0.08)
    }

    #[test]
    fn test_totals() {
        let model = coffee().build().unwrap();
        let totals = model.totals();
        assert_eq!(totals.subtotal, Money::from_cents(700));
        assert_eq!(totals.tax, Money::from_cents(56));
        assert_eq!(totals.total, Money::from_cents(756));
    }

    #[test]
    fn test_defaults() {
        let model = coffee().build().unwrap();
        assert_eq!(model.width(), DEFAULT_WIDTH);
        assert_eq!(model.header_align(), Align::Center);
        assert!(model.logo().is_none());
        assert!(model.issued_at().is_none());
    }

    #[test]
    fn test_rejects_empty_shop_name() {
        let err = ReceiptModel::builder(ShopHeader::new("  "))
            .line("Tea", 1, 1.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PrinterError::InvalidReceipt(_)));
    }

    #[test]
    fn test_rejects_empty_cart() {
        let err = ReceiptModel::builder(ShopHeader::new("Shop"))
            .build()
            .unwrap_err();
        assert!(matches!(err, PrinterError::InvalidReceipt(_)));
    }

    #[test]
    fn test_rejects_bad_lines() {
        assert!(coffee().line("Zero", 0, 1.0).build().is_err());
        assert!(coffee().line("Negative", 1, -1.0).build().is_err());
        assert!(coffee().line("Nan", 1, f64::NAN).build().is_err());
        assert!(coffee().line("", 1, 1.0).build().is_err());
    }

    #[test]
    fn test_rejects_values_wider_than_columns() {
        // 3 x 4000.33 = 12000.99, eight characters in a seven-column field
        let err = coffee().line("Laptop", 3, 4000.33).build().unwrap_err();
        assert!(matches!(err, PrinterError::InvalidReceipt(ref m) if m.contains("line total")));

        let err = coffee().line("Bolt", 1000, 0.01).build().unwrap_err();
        assert!(matches!(err, PrinterError::InvalidReceipt(ref m) if m.contains("quantity")));

        let err = coffee().line("Server", 1, 10_000.00).build().unwrap_err();
        assert!(matches!(err, PrinterError::InvalidReceipt(ref m) if m.contains("unit price")));

        let err = CartLine::new("Bolt", 1000, Money::from_cents(1000)).unwrap_err();
        assert!(matches!(err, PrinterError::InvalidReceipt(_)));
    }

    #[test]
    fn test_accepts_values_at_column_limits() {
        let model = ReceiptModel::builder(ShopHeader::new("Shop"))
            .line("Widest", 1, 9999.99)
            .line("Most", 999, 0.01)
            .build()
            .unwrap();
        assert_eq!(model.lines()[0].line_total(), Money::from_cents(999_999));
        assert_eq!(model.lines()[1].line_total(), Money::from_cents(999));
    }

    #[test]
    fn test_rejects_bad_tax_rate() {
        assert!(coffee().tax_rate(-0.01).build().is_err());
        assert!(coffee().tax_rate(1.5).build().is_err());
        assert!(coffee().tax_rate(f64::NAN).build().is_err());
    }

    #[test]
    fn test_rejects_width_out_of_range() {
        assert!(coffee().width(MIN_WIDTH - 1).build().is_err());
        assert!(coffee().width(MAX_WIDTH + 1).build().is_err());
        assert!(coffee().width(48).build().is_ok());
    }

    #[test]
    fn test_draft_from_json() {
        let json = r#"{
            "shopHeader": { "name": "Corner Cafe", "phone": "555-0100" },
            "lines": [
                { "name": "Coffee", "qty": 2, "unitPrice": 3.50 },
                { "name": "Bagel", "qty": 1, "unitPrice": 2.25 }
            ],
            "taxRate": 0.08,
            "footerLines": ["Thank you!"],
            "headerAlign": "right"
        }"#;
        let model = ReceiptDraft::from_json(json)
            .unwrap()
            .into_model(None)
            .unwrap();
        assert_eq!(model.lines().len(), 2);
        assert_eq!(model.header().phone.as_deref(), Some("555-0100"));
        assert_eq!(model.header_align(), Align::Right);
        assert_eq!(model.footer_align(), Align::Center);
        assert_eq!(model.totals().subtotal, Money::from_cents(925));
    }

    #[test]
    fn test_draft_rejects_negative_qty() {
        let json = r#"{
            "shopHeader": { "name": "Shop" },
            "lines": [{ "name": "Tea", "qty": -1, "unitPrice": 1.0 }]
        }"#;
        assert!(matches!(
            ReceiptDraft::from_json(json),
            Err(PrinterError::InvalidReceipt(_))
        ));
    }

    #[test]
    fn test_draft_rejects_unknown_fields() {
        let json = r#"{
            "shopHeader": { "name": "Shop" },
            "lines": [],
            "colour": "blue"
        }"#;
        assert!(ReceiptDraft::from_json(json).is_err());
    }

    #[test]
    fn test_draft_missing_logo_is_io_error() {
        let json = r#"{
            "shopHeader": { "name": "Shop" },
            "lines": [{ "name": "Tea", "qty": 1, "unitPrice": 1.0 }],
            "logoPath": "does-not-exist.png"
        }"#;
        let err = ReceiptDraft::from_json(json)
            .unwrap()
            .into_model(Some(Path::new("/nonexistent")))
            .unwrap_err();
        assert!(matches!(err, PrinterError::Io(_)));
    }
}
