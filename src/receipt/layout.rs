//! # Receipt Layout
//!
//! Renders a [`ReceiptModel`] into fixed-width text and then into the
//! bytes sent after the job preamble.
//!
//! ## Layout (width 35)
//!
//! ```text
//!             Corner Cafe
//!             12 Main St
//! -----------------------------------
//! Item            Qty   Price   Total
//! -----------------------------------
//! Coffee            2    3.50    7.00
//! -----------------------------------
//! Subtotal                     Rs7.00
//! Tax (8%)                     Rs0.56
//! -----------------------------------
//! TOTAL                        Rs7.56
//! -----------------------------------
//!             Thank you!
//! ```
//!
//! Every emitted line is sanitized to ASCII and never longer than the
//! receipt width. Values that would not fit their column are rejected when
//! the model is built ([`check_item_columns`], [`check_totals`]), so nothing
//! is cut off here.

use super::model::{Align, CartLine, ReceiptModel, Totals};
use super::money::Money;
use super::sanitize::{CURRENCY_GLYPH, sanitize, text_width};
use crate::error::{PrinterError, Result};
use crate::protocol::commands::{CR, LF};

/// Item name column width.
pub const NAME_COLS: usize = 16;

/// Quantity column width.
pub const QTY_COLS: usize = 3;

/// Unit price column width.
pub const PRICE_COLS: usize = 7;

/// Line total column width.
pub const TOTAL_COLS: usize = 7;

/// Total characters used by one item row (two separating spaces included).
pub const ITEM_ROW_COLS: usize = NAME_COLS + QTY_COLS + 1 + PRICE_COLS + 1 + TOTAL_COLS;

/// Value column width for the subtotal and tax rows.
const AMOUNT_COLS: usize = 10;

/// Value column width for the grand total row.
const GRAND_TOTAL_COLS: usize = 8;

/// Blank lines appended so the last row clears the cutter.
pub const FEED_LINES: usize = 3;

const CRLF: [u8; 2] = [CR, LF];

/// Pad a line for the given alignment.
///
/// `Center` puts `floor((width - len) / 2)` spaces on the left, `Right`
/// puts `width - len`. Nothing is added on the right and nothing is
/// truncated; lengths are measured after sanitization.
///
/// ```
/// use blethermal::receipt::layout::pad;
/// use blethermal::receipt::model::Align;
///
/// assert_eq!(pad("abc", Align::Center, 8), "  abc");
/// assert_eq!(pad("abc", Align::Right, 8), "     abc");
/// assert_eq!(pad("abc", Align::Left, 8), "abc");
/// ```
pub fn pad(text: &str, align: Align, width: usize) -> String {
    let len = text_width(text);
    let left = match align {
        Align::Left => 0,
        Align::Center => width.saturating_sub(len) / 2,
        Align::Right => width.saturating_sub(len),
    };
    format!("{}{}", " ".repeat(left), text)
}

/// Greedy word wrap of sanitized text; words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let (head, tail) = word.split_at(width);
            lines.push(head.to_string());
            word = tail;
        }
        if word.is_empty() {
            continue;
        }
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Sanitize, wrap and align a free-text block.
fn aligned_block(text: &str, align: Align, width: usize, out: &mut Vec<String>) {
    for line in wrap(&sanitize(text), width) {
        out.push(pad(&line, align, width));
    }
}

fn divider(width: usize) -> String {
    "-".repeat(width)
}

fn item_row(name: &str, qty: &str, price: &str, total: &str) -> String {
    let name = sanitize(name);
    format!(
        "{:<name_w$.name_w$}{:>qty_w$} {:>price_w$} {:>total_w$}",
        name,
        qty,
        price,
        total,
        name_w = NAME_COLS,
        qty_w = QTY_COLS,
        price_w = PRICE_COLS,
        total_w = TOTAL_COLS,
    )
}

/// Reject a cart line whose quantity, unit price or line total is wider
/// than its column.
pub fn check_item_columns(line: &CartLine) -> Result<()> {
    let columns = [
        ("quantity", line.qty().to_string(), QTY_COLS),
        ("unit price", line.unit_price().to_string(), PRICE_COLS),
        ("line total", line.line_total().to_string(), TOTAL_COLS),
    ];
    for (field, text, cols) in columns {
        if text.len() > cols {
            return Err(PrinterError::InvalidReceipt(format!(
                "cart line '{}' {} {} does not fit {} columns",
                line.name(),
                field,
                text,
                cols
            )));
        }
    }
    Ok(())
}

/// Reject totals whose row would not fit `width` with at least one space
/// between label and amount.
pub fn check_totals(totals: &Totals, tax_rate: f64, width: usize) -> Result<()> {
    let rows = [
        ("Subtotal".to_string(), totals.subtotal, AMOUNT_COLS),
        (tax_label(tax_rate), totals.tax, AMOUNT_COLS),
        ("TOTAL".to_string(), totals.total, GRAND_TOTAL_COLS),
    ];
    for (label, amount, value_cols) in rows {
        let value_len = text_width(&currency(amount)).max(value_cols);
        if text_width(&label) + 1 + value_len > width {
            return Err(PrinterError::InvalidReceipt(format!(
                "{} {} does not fit a {}-column receipt",
                label, amount, width
            )));
        }
    }
    Ok(())
}

fn currency(amount: Money) -> String {
    format!("{}{}", CURRENCY_GLYPH, amount)
}

fn tax_label(rate: f64) -> String {
    format!("Tax ({})", percent(rate))
}

/// Label on the left, currency amount right-aligned to the receipt edge.
fn amount_row(label: &str, amount: Money, value_cols: usize, width: usize) -> String {
    let value = currency(amount);
    let value_len = text_width(&value).max(value_cols);
    let label_cols = width.saturating_sub(value_len);
    format!(
        "{:<label_cols$}{}{}",
        label,
        " ".repeat(value_len - text_width(&value)),
        value,
        label_cols = label_cols
    )
}

/// Percent label for a tax rate: 0.08 → `8%`, 0.075 → `7.5%`.
fn percent(rate: f64) -> String {
    let pct = (rate * 10_000.0).round() / 100.0;
    format!("{}%", pct)
}

/// Render the receipt body as unsanitized lines (may contain the currency glyph).
pub fn layout_lines(model: &ReceiptModel, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let header = model.header();

    aligned_block(&header.name, model.header_align(), width, &mut out);
    if let Some(address) = &header.address {
        aligned_block(address, model.header_align(), width, &mut out);
    }
    if let Some(phone) = &header.phone {
        aligned_block(phone, model.header_align(), width, &mut out);
    }
    if let Some(at) = model.issued_at() {
        let stamp = at.format("%Y-%m-%d %H:%M").to_string();
        out.push(pad(&stamp, model.header_align(), width));
    }

    out.push(divider(width));
    out.push(item_row("Item", "Qty", "Price", "Total"));
    out.push(divider(width));
    for line in model.lines() {
        out.push(item_row(
            line.name(),
            &line.qty().to_string(),
            &line.unit_price().to_string(),
            &line.line_total().to_string(),
        ));
    }
    out.push(divider(width));

    let totals = model.totals();
    out.push(amount_row("Subtotal", totals.subtotal, AMOUNT_COLS, width));
    out.push(amount_row(
        &tax_label(model.tax_rate()),
        totals.tax,
        AMOUNT_COLS,
        width,
    ));
    out.push(divider(width));
    out.push(amount_row("TOTAL", totals.total, GRAND_TOTAL_COLS, width));
    out.push(divider(width));

    for footer in model.footer_lines() {
        aligned_block(footer, model.footer_align(), width, &mut out);
    }

    out
}

/// Sanitized lines, each at most `width` characters.
pub fn render_lines(model: &ReceiptModel, width: usize) -> Vec<String> {
    layout_lines(model, width)
        .into_iter()
        .map(|line| {
            let line = sanitize(&line);
            debug_assert!(line.len() <= width, "line overflows width {}: {:?}", width, line);
            line
        })
        .collect()
}

/// Receipt body bytes (ASCII): CRLF-terminated lines plus the cutter feed.
pub fn encode_body(model: &ReceiptModel, width: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for line in render_lines(model, width) {
        debug_assert!(line.is_ascii());
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(&CRLF);
    }
    for _ in 0..FEED_LINES {
        bytes.extend_from_slice(&CRLF);
    }
    bytes
}

/// [`encode_body`] as a string.
pub fn render_text(model: &ReceiptModel, width: usize) -> String {
    // Only ASCII is ever pushed
    String::from_utf8_lossy(&encode_body(model, width)).into_owned()
}

// ============================================================================
// TESTS
// ============================================================================
